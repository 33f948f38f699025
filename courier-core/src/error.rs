//! Error types for Courier.
//!
//! - [`DispatchError`] - everything a dispatch call can fail with
//! - [`ResourceError`] - lifecycle and pool failures of async resource components
//! - [`HandlerFailure`] - one failed handler in a best-effort event delivery

use crate::component::ComponentState;
use std::time::Duration;
use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by dispatchers and middlewares.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// A command or query was dispatched with no registered handler.
    #[error("no handler registered for `{message_type}`")]
    NoHandlerRegistered {
        /// Concrete type name of the request.
        message_type: &'static str,
    },

    /// A second handler was registered for a command or query type.
    #[error(
        "duplicate handler for `{message_type}`: `{existing}` is registered, `{rejected}` was rejected"
    )]
    DuplicateHandler {
        /// Concrete type name of the request.
        message_type: &'static str,
        /// Handler that was registered first.
        existing: &'static str,
        /// Handler that was refused.
        rejected: &'static str,
    },

    /// A registration arrived after the registry was sealed.
    #[error("registry is sealed; cannot register a handler for `{message_type}`")]
    RegistryFrozen {
        /// Concrete type name of the message.
        message_type: &'static str,
    },

    /// Startup validation found required message types without a handler.
    #[error("missing handlers for: {}", .0.join(", "))]
    MissingHandlers(Vec<&'static str>),

    /// A handler returned an error. The source is the handler's own error.
    #[error("handler `{handler}` failed: {source}")]
    Handler {
        /// Type name of the failing handler.
        handler: &'static str,
        /// The handler's error, unchanged.
        #[source]
        source: BoxError,
    },

    /// Best-effort event delivery completed with failures.
    #[error("{} of the handlers for `{event_type}` failed", .failures.len())]
    PartialDelivery {
        /// Concrete type name of the event.
        event_type: &'static str,
        /// Every handler failure, in delivery order.
        failures: Vec<HandlerFailure>,
    },

    /// A validation middleware rejected the message.
    #[error("invalid `{message_type}`: {reason}")]
    Validation {
        /// Concrete type name of the message.
        message_type: &'static str,
        /// Why the message was rejected.
        reason: String,
    },

    /// A middleware replaced the payload with a value of another type.
    #[error("payload mismatch: expected `{expected}`, envelope carries `{found}`")]
    PayloadMismatch {
        /// Type the terminal handler expects.
        expected: &'static str,
        /// Type recorded on the envelope.
        found: &'static str,
    },

    /// A short-circuiting middleware replied with a value of the wrong type.
    #[error("response mismatch: `{message_type}` expects `{expected}`")]
    ResponseMismatch {
        /// Concrete type name of the request.
        message_type: &'static str,
        /// Expected response type.
        expected: &'static str,
    },

    /// The caller cancelled the dispatch.
    #[error("dispatch was cancelled")]
    Cancelled,

    /// The dispatch did not complete in time.
    #[error("dispatch timed out after {0:?}")]
    TimedOut(Duration),

    /// A resource component failed.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl DispatchError {
    /// Wrap a handler's error.
    pub fn handler(handler: &'static str, source: impl Into<BoxError>) -> Self {
        DispatchError::Handler {
            handler,
            source: source.into(),
        }
    }

    /// The handler's own error, if this is a [`DispatchError::Handler`] of type `T`.
    pub fn handler_error<T: std::error::Error + 'static>(&self) -> Option<&T> {
        match self {
            DispatchError::Handler { source, .. } => source.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// Whether the caller may retry the same dispatch.
    ///
    /// Pool timeouts and dispatch timeouts are transient; configuration
    /// and lifecycle errors are not. Handler errors are opaque and never
    /// classified as retryable here.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::TimedOut(_) | DispatchError::Resource(ResourceError::ConnectionTimeout(_))
        )
    }
}

/// One handler that failed during best-effort event delivery.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Type name of the failing handler.
    pub handler: &'static str,
    /// The handler's error, unchanged.
    pub error: BoxError,
}

impl std::fmt::Display for HandlerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.handler, self.error)
    }
}

/// Errors raised by async resource components.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// No pooled connection became available in time.
    #[error("timed out after {0:?} waiting for a pooled connection")]
    ConnectionTimeout(Duration),

    /// The component is not in the `Initialized` state.
    #[error("component `{component}` is not available (state: {state})")]
    ComponentNotAvailable {
        /// Component name.
        component: &'static str,
        /// State at the time of the call.
        state: ComponentState,
    },

    /// `initialize` was called before `configure`.
    #[error("component `{0}` has not been configured")]
    NotConfigured(&'static str),

    /// A lifecycle call is not valid in the current state.
    #[error("component `{component}` cannot {operation} while {state}")]
    InvalidTransition {
        /// Component name.
        component: &'static str,
        /// The refused operation.
        operation: &'static str,
        /// State at the time of the call.
        state: ComponentState,
    },

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// The underlying driver reported an error.
    #[error("driver error: {0}")]
    Driver(#[source] BoxError),
}

impl ResourceError {
    /// Wrap a driver error.
    pub fn driver(err: impl Into<BoxError>) -> Self {
        ResourceError::Driver(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Error, PartialEq)]
    #[error("widget name taken")]
    struct NameTaken;

    #[test]
    fn handler_error_is_downcastable() {
        let err = DispatchError::handler("app::H1", NameTaken);
        assert_eq!(err.handler_error::<NameTaken>(), Some(&NameTaken));
        assert_eq!(err.to_string(), "handler `app::H1` failed: widget name taken");
        assert!(!err.is_retryable());
    }

    #[test]
    fn pool_timeout_is_retryable() {
        let err: DispatchError = ResourceError::ConnectionTimeout(Duration::from_millis(5)).into();
        assert!(err.is_retryable());
        assert!(err.handler_error::<NameTaken>().is_none());
    }

    #[test]
    fn missing_handlers_lists_every_type() {
        let err = DispatchError::MissingHandlers(vec!["a::CreateWidget", "a::DeleteWidget"]);
        assert_eq!(
            err.to_string(),
            "missing handlers for: a::CreateWidget, a::DeleteWidget"
        );
    }
}
