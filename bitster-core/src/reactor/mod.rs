//! Readiness multiplexer for peer sockets.
//!
//! A [`Reactor`] owns a single poller and every socket registered with it.
//! Each call to [`Reactor::communicate`] waits for readiness once and hands
//! it to the owning [`Communicator`]. The reactor is not shared: it lives on
//! one dedicated thread and is driven by calling `communicate` in a loop.

pub mod communicator;

use std::collections::HashMap;
use std::io;
use std::time::Duration;

use mio::{Events, Poll, Token};

use communicator::Readiness;
pub use communicator::{ChannelKind, Communicator};

const EVENT_CAPACITY: usize = 1024;

struct Registration {
    communicator: Box<dyn Communicator>,
    kind: ChannelKind,
    connect_pending: bool,
}

/// Poll-based dispatcher of socket readiness.
pub struct Reactor {
    poll: Poll,
    events: Events,
    registrations: HashMap<Token, Registration>,
    next_token: usize,
}

impl Reactor {
    /// Opens a new poller.
    ///
    /// # Errors
    ///
    /// - `io::Error` - If the OS poller cannot be created
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(EVENT_CAPACITY),
            registrations: HashMap::new(),
            next_token: 0,
        })
    }

    /// Registers a communicator's socket for every interest valid for its
    /// channel kind.
    ///
    /// Returns `None` if the socket could not be registered, typically
    /// because it is already closing. The communicator is dropped in that
    /// case.
    pub fn register(&mut self, mut communicator: Box<dyn Communicator>) -> Option<Token> {
        let token = Token(self.next_token);
        let kind = communicator.kind();

        if let Err(e) = self
            .poll
            .registry()
            .register(communicator.source(), token, kind.interest())
        {
            tracing::debug!("Failed to register {kind:?} channel: {e}");
            return None;
        }

        self.next_token += 1;
        self.registrations.insert(
            token,
            Registration {
                communicator,
                kind,
                connect_pending: kind == ChannelKind::Connecting,
            },
        );
        Some(token)
    }

    /// Removes a channel from the poller and returns its communicator.
    pub fn deregister(&mut self, token: Token) -> Option<Box<dyn Communicator>> {
        let mut registration = self.registrations.remove(&token)?;
        if let Err(e) = self
            .poll
            .registry()
            .deregister(registration.communicator.source())
        {
            tracing::debug!("Failed to deregister channel {}: {e}", token.0);
        }
        Some(registration.communicator)
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Waits up to `timeout` for readiness and dispatches it.
    ///
    /// `None` blocks until at least one channel is ready. Returns the number
    /// of channels whose communicator was invoked; poll failures are logged
    /// and count as an empty tick. Channels that report themselves closed
    /// are skipped and dropped once dispatch finishes.
    pub fn communicate(&mut self, timeout: Option<Duration>) -> usize {
        if let Err(e) = self.poll.poll(&mut self.events, timeout) {
            if e.kind() == io::ErrorKind::Interrupted {
                tracing::trace!("Poll interrupted");
            } else {
                tracing::warn!("Poll failed: {e}");
            }
            return 0;
        }

        let mut dispatched = 0;
        for event in self.events.iter() {
            let token = event.token();
            let Some(registration) = self.registrations.get_mut(&token) else {
                tracing::debug!("Skipping readiness for unknown channel {}", token.0);
                continue;
            };
            if !registration.communicator.is_open() {
                tracing::debug!("Skipping readiness for closed channel {}", token.0);
                continue;
            }

            let readiness =
                Readiness::from_event(event, registration.kind, &mut registration.connect_pending);
            if registration.kind == ChannelKind::Connecting && !registration.connect_pending {
                registration.kind = ChannelKind::Stream;
            }

            readiness.dispatch(registration.communicator.as_mut());
            dispatched += 1;
        }

        self.reap_closed();
        dispatched
    }

    fn reap_closed(&mut self) {
        let closed: Vec<Token> = self
            .registrations
            .iter()
            .filter(|(_, registration)| !registration.communicator.is_open())
            .map(|(token, _)| *token)
            .collect();

        for token in closed {
            tracing::trace!("Dropping closed channel {}", token.0);
            self.deregister(token);
        }
    }
}
