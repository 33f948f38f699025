//! Tracing middleware for dispatch observation.

use courier_core::{Context, DispatchError, Envelope, Middleware, Next, Reply};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Opens an `info` span around the rest of the chain.
///
/// The span records the message type, its kind and the context's
/// correlation id, plus the trace and parent span ids when the caller
/// propagated them. Completion is logged at `debug`, failure at `warn`.
#[derive(Debug, Clone, Copy)]
pub struct TracingMiddleware {
    name: &'static str,
}

impl TracingMiddleware {
    /// A middleware whose span is tagged `bus = "dispatch"`.
    pub const fn new() -> Self {
        Self::named("dispatch")
    }

    /// A middleware whose span is tagged with `name`, e.g. the bus it wraps.
    pub const fn named(name: &'static str) -> Self {
        Self { name }
    }
}

impl Default for TracingMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for TracingMiddleware {
    async fn process(
        &self,
        envelope: Envelope,
        ctx: &Context,
        next: Next<'_>,
    ) -> Result<Reply, DispatchError> {
        let span = if let Some(trace_id) = ctx.trace_id() {
            tracing::info_span!(
                "dispatch",
                bus = %self.name,
                message_type = envelope.type_name(),
                kind = %envelope.kind(),
                correlation_id = %ctx.correlation_id(),
                trace_id = %trace_id,
                span_id = %ctx.span_id().unwrap_or(""),
            )
        } else {
            tracing::info_span!(
                "dispatch",
                bus = %self.name,
                message_type = envelope.type_name(),
                kind = %envelope.kind(),
                correlation_id = %ctx.correlation_id(),
            )
        };

        async move {
            let started = Instant::now();
            let result = next.run(envelope, ctx).await;
            let elapsed_ms = millis(started.elapsed());
            match &result {
                Ok(_) => tracing::debug!(elapsed_ms, "dispatch completed"),
                Err(err) => tracing::warn!(elapsed_ms, error = %err, "dispatch failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

/// Whole milliseconds, saturating at `u64::MAX`.
fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}
