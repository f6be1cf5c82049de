//! Actor task, run loop and deferred timers.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{Notify, mpsc, watch};
use tokio::task::JoinHandle;

use super::{Actor, ActorHandle};
use crate::config::ActorConfig;

/// State shared between an actor's loop and its handles.
pub(crate) struct Shared {
    running: AtomicBool,
    wake: Notify,
    exited: watch::Sender<bool>,
}

impl Shared {
    fn new() -> Self {
        let (exited, _) = watch::channel(false);
        Self {
            running: AtomicBool::new(true),
            wake: Notify::new(),
            exited,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn request_shutdown(&self) {
        self.running.store(false, Ordering::Release);
        self.wake.notify_one();
    }

    pub(crate) fn wake(&self) {
        self.wake.notify_one();
    }

    pub(crate) async fn exited(&self) {
        let mut receiver = self.exited.subscribe();
        let _ = receiver.wait_for(|exited| *exited).await;
    }
}

/// Marks the actor stopped when its task ends, even by panic.
struct ExitGuard(Arc<Shared>);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::Release);
        self.0.exited.send_replace(true);
    }
}

/// What an actor can do to itself from inside a handler.
pub struct Context<M> {
    sender: mpsc::WeakUnboundedSender<M>,
    shared: Arc<Shared>,
    idle_interval: Duration,
}

impl<M: Send + 'static> Context<M> {
    /// A handle to this actor, unless every outside handle has been dropped.
    pub fn handle(&self) -> Option<ActorHandle<M>> {
        self.sender
            .upgrade()
            .map(|sender| ActorHandle::new(sender, Arc::clone(&self.shared)))
    }

    /// Stops the loop once the current handler returns.
    pub fn shutdown(&self) {
        self.shared.request_shutdown();
    }

    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    pub fn idle_interval(&self) -> Duration {
        self.idle_interval
    }

    /// Sleeps until a memo is posted or `timeout` elapses, whichever is first.
    pub async fn wait_for_memo(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.shared.wake.notified()).await;
    }

    /// Delivers `memo` to this actor after `delay`.
    ///
    /// A pending timer does not keep the actor alive: if every outside handle
    /// is dropped before it fires, the memo is discarded. Returns `None` when
    /// the actor can no longer receive memos.
    pub fn schedule(&self, delay: Duration, memo: M) -> Option<TimerHandle> {
        if !self.is_running() || self.sender.upgrade().is_none() {
            return None;
        }
        let sender = self.sender.clone();
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(sender) = sender.upgrade() else {
                tracing::trace!("Timer fired after every handle was dropped");
                return;
            };
            if ActorHandle::new(sender, shared).post(memo).is_err() {
                tracing::trace!("Timer fired after actor stopped");
            }
        });
        Some(TimerHandle { task })
    }
}

/// A pending deferred memo.
#[derive(Debug)]
pub struct TimerHandle {
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Prevents the memo from being delivered if it has not fired yet.
    pub fn cancel(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Spawns `actor` on its own task and returns a handle to its queue.
///
/// The actor starts immediately. It runs until shutdown is requested,
/// every handle is dropped, or a handler panics.
pub fn spawn<A: Actor>(actor: A, config: &ActorConfig) -> ActorHandle<A::Memo> {
    let (sender, receiver) = mpsc::unbounded_channel();
    let shared = Arc::new(Shared::new());
    let handle = ActorHandle::new(sender, Arc::clone(&shared));

    let ctx = Context {
        sender: handle.downgrade(),
        shared,
        idle_interval: config.idle_interval,
    };

    tokio::spawn(async move {
        run_actor_loop(actor, receiver, ctx).await;
    });

    handle
}

/// Runs the actor's message processing loop.
///
/// Each iteration handles at most one memo, then idles if the queue is
/// empty. Shutdown is checked at the top of every iteration.
async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut receiver: mpsc::UnboundedReceiver<A::Memo>,
    ctx: Context<A::Memo>,
) {
    let _guard = ExitGuard(Arc::clone(&ctx.shared));
    let name = actor.name();
    tracing::debug!("{name} actor started");

    while ctx.is_running() {
        match receiver.try_recv() {
            Ok(memo) => actor.receive(memo, &ctx).await,
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => {
                tracing::debug!("{name} actor has no handles left");
                break;
            }
        }

        if receiver.is_empty() && ctx.is_running() {
            actor.idle(&ctx).await;
        }
    }

    receiver.close();
    let mut discarded = 0usize;
    while receiver.try_recv().is_ok() {
        discarded += 1;
    }
    if discarded > 0 {
        tracing::debug!("{name} actor discarded {discarded} queued memos");
    }

    tracing::debug!("{name} actor stopped");
}
