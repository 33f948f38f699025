//! Type-erased handler adapters.
//!
//! Registries store handlers for many message types side by side, so each
//! typed [`Handler`] / [`EventHandler`] is wrapped in an adapter that
//! downcasts the payload back to its concrete type before calling it.

use courier_core::{
    Context, DispatchError, Envelope, Event, EventHandler, Handler, Reply, Request,
};
use futures::future::BoxFuture;
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

/// Object-safe form of [`Handler`], keyed by the request type at runtime.
pub trait ErasedRequestHandler: Send + Sync {
    /// Downcast the envelope and run the handler.
    ///
    /// The handler's error is wrapped in [`DispatchError::Handler`] without
    /// modification.
    fn call_erased<'a>(
        &'a self,
        envelope: Envelope,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, DispatchError>>;
}

/// Adapter implementing [`ErasedRequestHandler`] for a typed handler.
pub struct RequestHandlerWrapper<R, H> {
    handler: H,
    _request: PhantomData<fn(R)>,
}

impl<R, H> RequestHandlerWrapper<R, H> {
    /// Wrap a typed handler.
    pub const fn new(handler: H) -> Self {
        Self {
            handler,
            _request: PhantomData,
        }
    }
}

impl<R, H> ErasedRequestHandler for RequestHandlerWrapper<R, H>
where
    R: Request,
    H: Handler<R>,
{
    fn call_erased<'a>(
        &'a self,
        envelope: Envelope,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
        Box::pin(async move {
            let found = envelope.type_name();
            let request = envelope
                .into_inner::<R>()
                .map_err(|_| DispatchError::PayloadMismatch {
                    expected: type_name::<R>(),
                    found,
                })?;
            let response = self
                .handler
                .handle(request, ctx)
                .await
                .map_err(|err| DispatchError::handler(type_name::<H>(), err))?;
            Ok(Reply::new(response))
        })
    }
}

/// Erase a typed request handler.
pub fn erase_request<R: Request, H: Handler<R>>(handler: H) -> Arc<dyn ErasedRequestHandler> {
    Arc::new(RequestHandlerWrapper::<R, H>::new(handler))
}

/// Object-safe form of [`EventHandler`].
pub trait ErasedEventHandler: Send + Sync {
    /// Borrow the event out of the envelope and run the handler.
    fn call_erased<'a>(
        &'a self,
        envelope: &'a Envelope,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<(), DispatchError>>;
}

/// Adapter implementing [`ErasedEventHandler`] for a typed handler.
pub struct EventHandlerWrapper<E, H> {
    handler: H,
    _event: PhantomData<fn(E)>,
}

impl<E, H> EventHandlerWrapper<E, H> {
    /// Wrap a typed handler.
    pub const fn new(handler: H) -> Self {
        Self {
            handler,
            _event: PhantomData,
        }
    }
}

impl<E, H> ErasedEventHandler for EventHandlerWrapper<E, H>
where
    E: Event,
    H: EventHandler<E>,
{
    fn call_erased<'a>(
        &'a self,
        envelope: &'a Envelope,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<(), DispatchError>> {
        Box::pin(async move {
            let Some(event) = envelope.downcast_ref::<E>() else {
                return Err(DispatchError::PayloadMismatch {
                    expected: type_name::<E>(),
                    found: envelope.type_name(),
                });
            };
            self.handler
                .handle(event, ctx)
                .await
                .map_err(|err| DispatchError::handler(type_name::<H>(), err))
        })
    }
}

/// Erase a typed event handler.
pub fn erase_event<E: Event, H: EventHandler<E>>(handler: H) -> Arc<dyn ErasedEventHandler> {
    Arc::new(EventHandlerWrapper::<E, H>::new(handler))
}
