//! Per-channel handler interface driven by the reactor.

use mio::Interest;
use mio::event::{Event, Source};

/// What kind of channel a communicator wraps.
///
/// Determines the interest set registered with the poller and which
/// callbacks a readiness event maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Listening socket; readability means a connection can be accepted.
    Listener,
    /// Connected stream.
    Stream,
    /// Stream with a non-blocking connect in flight. The first writable or
    /// error event is reported as connect readiness, after which the channel
    /// behaves like [`ChannelKind::Stream`].
    Connecting,
}

impl ChannelKind {
    /// Every interest that is valid for this kind of channel.
    pub fn interest(self) -> Interest {
        match self {
            ChannelKind::Listener => Interest::READABLE,
            ChannelKind::Stream | ChannelKind::Connecting => Interest::READABLE | Interest::WRITABLE,
        }
    }
}

/// Handler for one registered channel.
///
/// Each callback returns `false` when the reactor should stop dispatching
/// further readiness to this channel for the current tick, e.g. because the
/// handler just closed it. Readiness is edge-triggered: a handler must read
/// or write until `WouldBlock` or it will not be told again.
pub trait Communicator: Send {
    /// The socket this communicator owns.
    fn source(&mut self) -> &mut dyn Source;

    fn kind(&self) -> ChannelKind;

    /// False once the channel is closed; closed channels are skipped and
    /// dropped from the reactor at the end of the tick.
    fn is_open(&self) -> bool {
        true
    }

    fn on_connectable(&mut self) -> bool {
        true
    }

    fn on_readable(&mut self) -> bool {
        true
    }

    fn on_writable(&mut self) -> bool {
        true
    }

    fn on_acceptable(&mut self) -> bool {
        true
    }
}

/// Readiness categories present for one channel in one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Readiness {
    pub connect: bool,
    pub read: bool,
    pub write: bool,
    pub accept: bool,
}

impl Readiness {
    /// Maps a poll event onto the four categories for a channel of `kind`.
    ///
    /// `connect_pending` is cleared once connect readiness has been reported.
    pub(crate) fn from_event(event: &Event, kind: ChannelKind, connect_pending: &mut bool) -> Self {
        let failed = event.is_error() || event.is_read_closed() || event.is_write_closed();

        match kind {
            ChannelKind::Listener => Self {
                accept: event.is_readable(),
                ..Self::default()
            },
            ChannelKind::Stream | ChannelKind::Connecting => {
                let connect = *connect_pending && (event.is_writable() || failed);
                if connect {
                    *connect_pending = false;
                }
                Self {
                    connect,
                    read: event.is_readable() || failed,
                    write: event.is_writable(),
                    accept: false,
                }
            }
        }
    }

    /// Invokes the callbacks in connect, read, write, accept order, stopping
    /// at the first one that returns `false`.
    pub(crate) fn dispatch(self, communicator: &mut dyn Communicator) {
        if self.connect && !communicator.on_connectable() {
            return;
        }
        if self.read && !communicator.on_readable() {
            return;
        }
        if self.write && !communicator.on_writable() {
            return;
        }
        if self.accept {
            communicator.on_acceptable();
        }
    }
}
