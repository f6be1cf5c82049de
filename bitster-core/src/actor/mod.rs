//! Message-driven actors.
//!
//! Every long-lived protocol participant runs as an [`Actor`]: a task that
//! owns its state, drains an unbounded FIFO of memos one at a time and falls
//! back to [`Actor::idle`] whenever the queue is empty. Other components talk
//! to it only through an [`ActorHandle`].

pub mod handle;
pub mod runtime;

use async_trait::async_trait;

pub use handle::ActorHandle;
pub use runtime::{Context, TimerHandle, spawn};

/// Behaviour of a queue-driven worker.
///
/// Handlers run to completion before the next memo is considered, so an
/// actor never needs to lock its own state.
#[async_trait]
pub trait Actor: Send + 'static {
    /// Messages this actor accepts.
    type Memo: Send + 'static;

    /// Handles one memo taken from the queue.
    async fn receive(&mut self, memo: Self::Memo, ctx: &Context<Self::Memo>);

    /// Called whenever the queue is empty after a receive attempt.
    ///
    /// The default waits up to the configured idle interval for the next post.
    async fn idle(&mut self, ctx: &Context<Self::Memo>) {
        ctx.wait_for_memo(ctx.idle_interval()).await;
    }

    /// Name used in lifecycle logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Errors returned when talking to an actor.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActorError {
    #[error("Actor has stopped")]
    Stopped,
}
