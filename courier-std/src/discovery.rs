//! # Handler Discovery using Inventory Collection
//!
//! Handlers register themselves at link time instead of being wired by hand.
//! The `#[handler]` attribute (or a manual `inventory::submit!`) submits a
//! const registration record; a dispatcher builder's `discover()` walks the
//! collection once during startup and copies the matching records into its
//! own registry.
//!
//! ```rust,ignore
//! #[derive(Default)]
//! struct CreateWidgetHandler;
//!
//! impl Handler<CreateWidget> for CreateWidgetHandler { ... }
//!
//! inventory::submit! {
//!     RequestRegistration::of::<CreateWidget, CreateWidgetHandler>()
//! }
//! ```
//!
//! Records carry function pointers rather than handler instances, so a
//! discovered handler is built with `Default` each time a dispatcher is
//! assembled and no global state is shared between dispatchers.

use crate::dispatch::erased::{ErasedEventHandler, ErasedRequestHandler, erase_event, erase_request};
use courier_core::{Event, EventHandler, Handler, HandlerKey, Intent, Request, RequestKind};
use std::any::type_name;
use std::sync::Arc;

/// A self-registered command or query handler.
pub struct RequestRegistration {
    intent: Intent,
    key: fn() -> HandlerKey,
    handler_name: fn() -> &'static str,
    factory: fn() -> Arc<dyn ErasedRequestHandler>,
}

impl RequestRegistration {
    /// The registration record for handler `H` of request `R`.
    pub const fn of<R, H>() -> Self
    where
        R: Request,
        H: Handler<R> + Default,
    {
        Self {
            intent: <R::Kind as RequestKind>::INTENT,
            key: HandlerKey::of::<R>,
            handler_name: type_name::<H>,
            factory: default_request_handler::<R, H>,
        }
    }

    /// Command or query.
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// The request type served.
    pub fn key(&self) -> HandlerKey {
        (self.key)()
    }

    /// The handler's type name.
    pub fn handler_name(&self) -> &'static str {
        (self.handler_name)()
    }

    /// Build a fresh handler instance.
    pub fn instantiate(&self) -> Arc<dyn ErasedRequestHandler> {
        (self.factory)()
    }
}

fn default_request_handler<R, H>() -> Arc<dyn ErasedRequestHandler>
where
    R: Request,
    H: Handler<R> + Default,
{
    erase_request::<R, H>(H::default())
}

inventory::collect!(RequestRegistration);

/// A self-registered event handler.
pub struct EventRegistration {
    key: fn() -> HandlerKey,
    handler_name: fn() -> &'static str,
    factory: fn() -> Arc<dyn ErasedEventHandler>,
}

impl EventRegistration {
    /// The registration record for handler `H` of event `E`.
    pub const fn of<E, H>() -> Self
    where
        E: Event,
        H: EventHandler<E> + Default,
    {
        Self {
            key: HandlerKey::of::<E>,
            handler_name: type_name::<H>,
            factory: default_event_handler::<E, H>,
        }
    }

    /// The event type served.
    pub fn key(&self) -> HandlerKey {
        (self.key)()
    }

    /// The handler's type name.
    pub fn handler_name(&self) -> &'static str {
        (self.handler_name)()
    }

    /// Build a fresh handler instance.
    pub fn instantiate(&self) -> Arc<dyn ErasedEventHandler> {
        (self.factory)()
    }
}

fn default_event_handler<E, H>() -> Arc<dyn ErasedEventHandler>
where
    E: Event,
    H: EventHandler<E> + Default,
{
    erase_event::<E, H>(H::default())
}

inventory::collect!(EventRegistration);

/// A command or query type that must have a handler at startup.
///
/// Submitted by `#[derive(Command)]` and `#[derive(Query)]`; checked by the
/// dispatchers' `validate()`.
pub struct DeclaredRequest {
    intent: Intent,
    key: fn() -> HandlerKey,
}

impl DeclaredRequest {
    /// The declaration record for request `R`.
    pub const fn of<R: Request>() -> Self {
        Self {
            intent: <R::Kind as RequestKind>::INTENT,
            key: HandlerKey::of::<R>,
        }
    }

    /// Command or query.
    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// The declared request type.
    pub fn key(&self) -> HandlerKey {
        (self.key)()
    }
}

inventory::collect!(DeclaredRequest);

/// Every self-registered handler of the given intent.
pub fn request_handlers(intent: Intent) -> impl Iterator<Item = &'static RequestRegistration> {
    inventory::iter::<RequestRegistration>
        .into_iter()
        .filter(move |reg| reg.intent == intent)
}

/// Every self-registered event handler.
pub fn event_handlers() -> impl Iterator<Item = &'static EventRegistration> {
    inventory::iter::<EventRegistration>.into_iter()
}

/// Every declared request type of the given intent.
pub fn declared_requests(intent: Intent) -> impl Iterator<Item = HandlerKey> {
    inventory::iter::<DeclaredRequest>
        .into_iter()
        .filter(move |decl| decl.intent == intent)
        .map(DeclaredRequest::key)
}
