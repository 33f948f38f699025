//! Timeout middleware for time-limited dispatch.

use courier_core::{Context, DispatchError, Envelope, Middleware, Next, Reply};
use std::time::Duration;
use tokio::time::timeout;

/// Fails the dispatch with [`DispatchError::TimedOut`] when the rest of the
/// chain does not finish within the duration.
///
/// The inner future is dropped on expiry, so an open transaction inside the
/// handler rolls back.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    /// Create a new timeout middleware.
    pub const fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// The configured limit.
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

impl Middleware for TimeoutMiddleware {
    async fn process(
        &self,
        envelope: Envelope,
        ctx: &Context,
        next: Next<'_>,
    ) -> Result<Reply, DispatchError> {
        let message_type = envelope.type_name();
        match timeout(self.duration, next.run(envelope, ctx)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(message_type, timeout = ?self.duration, "dispatch timed out");
                Err(DispatchError::TimedOut(self.duration))
            }
        }
    }
}
