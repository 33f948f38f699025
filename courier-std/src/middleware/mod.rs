//! Standard middlewares.
//!
//! - [`TracingMiddleware`]: a `tracing` span and outcome log per dispatch
//! - [`TimeoutMiddleware`]: bounds the rest of the chain in time
//! - [`ValidationMiddleware`]: per-type rules checked before the handler
//! - [`TranslateErrors`]: explicit error translation at a boundary

mod timeout;
mod tracing;
mod translate;
mod validation;

pub use self::timeout::TimeoutMiddleware;
pub use self::tracing::TracingMiddleware;
pub use self::translate::TranslateErrors;
pub use self::validation::ValidationMiddleware;
