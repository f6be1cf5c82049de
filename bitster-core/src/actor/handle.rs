//! Handle for communicating with a running actor.

use std::sync::Arc;

use tokio::sync::mpsc;

use super::ActorError;
use super::runtime::Shared;

/// Cloneable sending side of an actor's queue.
///
/// Any number of handles may post concurrently; memos from one handle are
/// processed in the order they were posted.
pub struct ActorHandle<M> {
    sender: mpsc::UnboundedSender<M>,
    shared: Arc<Shared>,
}

impl<M> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<M: Send + 'static> ActorHandle<M> {
    pub(super) fn new(sender: mpsc::UnboundedSender<M>, shared: Arc<Shared>) -> Self {
        Self { sender, shared }
    }

    /// Enqueues a memo without waiting for it to be handled.
    ///
    /// # Errors
    ///
    /// - `ActorError::Stopped` - If shutdown was requested or the actor exited
    pub fn post(&self, memo: M) -> Result<(), ActorError> {
        if !self.shared.is_running() {
            return Err(ActorError::Stopped);
        }
        self.sender.send(memo).map_err(|_| ActorError::Stopped)?;
        self.shared.wake();
        Ok(())
    }

    /// Asks the actor to stop after the memo it is currently handling.
    ///
    /// Memos still queued when the loop notices are discarded.
    pub fn shutdown(&self) {
        self.shared.request_shutdown();
    }

    /// True until shutdown is requested or the actor's task ends.
    pub fn is_running(&self) -> bool {
        self.shared.is_running()
    }

    /// Waits until the actor's loop has exited, including by panic.
    pub async fn stopped(&self) {
        self.shared.exited().await;
    }

    pub(super) fn downgrade(&self) -> mpsc::WeakUnboundedSender<M> {
        self.sender.downgrade()
    }

    #[cfg(test)]
    pub(super) fn shared_for_test(&self) -> &Arc<Shared> {
        &self.shared
    }
}
