//! # Handlers
//!
//! The terminal endpoints of a dispatch: business logic bound to exactly one
//! message type.
//!
//! - [`Handler`] answers one [`Request`] (command or query) with a response.
//! - [`EventHandler`] reacts to one [`Event`]; any number may subscribe.
//!
//! Handler errors are opaque to the framework. They reach the caller inside
//! [`DispatchError::Handler`](crate::DispatchError::Handler) unchanged and
//! can be recovered with
//! [`DispatchError::handler_error`](crate::DispatchError::handler_error).

use crate::context::Context;
use crate::message::{Event, Request};
use std::future::Future;

/// The one handler for a command or query type.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Default)]
/// struct CreateWidgetHandler;
///
/// impl Handler<CreateWidget> for CreateWidgetHandler {
///     type Error = WidgetError;
///
///     async fn handle(&self, cmd: CreateWidget, ctx: &Context) -> Result<WidgetId, WidgetError> {
///         ...
///     }
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot handle requests of type `{R}`",
    label = "missing `Handler<{R}>` implementation",
    note = "Handlers must implement `handle` for the request type `{R}`."
)]
pub trait Handler<R: Request>: Send + Sync + 'static {
    /// The handler's own error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Execute the request.
    fn handle(
        &self,
        request: R,
        ctx: &Context,
    ) -> impl Future<Output = Result<R::Response, Self::Error>> + Send;
}

// Blanket impl for closures that do not need the context.
impl<F, R, Fut, Err> Handler<R> for F
where
    R: Request,
    F: Fn(R) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R::Response, Err>> + Send,
    Err: std::error::Error + Send + Sync + 'static,
{
    type Error = Err;

    fn handle(
        &self,
        request: R,
        _ctx: &Context,
    ) -> impl Future<Output = Result<R::Response, Self::Error>> + Send {
        (self)(request)
    }
}

/// One subscriber of an event type.
///
/// Event handlers borrow the event: every subscriber of a dispatch sees the
/// same value.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot handle events of type `{E}`",
    label = "missing `EventHandler<{E}>` implementation",
    note = "Event handlers must implement `handle` for the event type `{E}`."
)]
pub trait EventHandler<E: Event>: Send + Sync + 'static {
    /// The handler's own error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// React to the event.
    fn handle(&self, event: &E, ctx: &Context) -> impl Future<Output = Result<(), Self::Error>> + Send;
}
