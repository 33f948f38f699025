//! # Middleware
//!
//! A middleware wraps dispatch: it receives the type-erased [`Envelope`], the
//! call's [`Context`] and a [`Next`] value standing for the rest of the
//! chain. It may
//!
//! - inspect or transform the request before calling `next`,
//! - inspect or translate the result after calling `next`,
//! - short-circuit by replying without calling `next` at all.
//!
//! Middlewares never own each other. A chain is an ordered slice of
//! middlewares plus a [`Terminal`] owned by the dispatcher; [`Next`] is a
//! cursor into that slice, so every link can be exercised in isolation.
//!
//! # Example
//!
//! ```rust,ignore
//! struct Audit;
//!
//! impl Middleware for Audit {
//!     async fn process(&self, envelope: Envelope, ctx: &Context, next: Next<'_>) -> Result<Reply, DispatchError> {
//!         let name = envelope.type_name();
//!         let result = next.run(envelope, ctx).await;
//!         audit_log(name, result.is_ok());
//!         result
//!     }
//! }
//! ```

use crate::context::Context;
use crate::error::DispatchError;
use crate::message::{HandlerKey, Message, MessageKind};
use futures::future::BoxFuture;
use std::any::Any;
use std::fmt;
use std::future::Future;

/// A type-erased message travelling through a middleware chain.
pub struct Envelope {
    key: HandlerKey,
    kind: MessageKind,
    payload: Box<dyn Any + Send + Sync>,
}

impl Envelope {
    /// Seal a message of the given kind.
    pub fn new<M: Message>(message: M, kind: MessageKind) -> Self {
        Self {
            key: HandlerKey::of::<M>(),
            kind,
            payload: Box::new(message),
        }
    }

    /// The registry key of the carried message.
    pub fn key(&self) -> HandlerKey {
        self.key
    }

    /// The concrete type name of the carried message.
    pub fn type_name(&self) -> &'static str {
        self.key.type_name()
    }

    /// Command, query or event.
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Whether the envelope carries an `M`.
    pub fn is<M: Message>(&self) -> bool {
        self.payload.is::<M>()
    }

    /// Borrow the message as an `M`.
    pub fn downcast_ref<M: Message>(&self) -> Option<&M> {
        self.payload.downcast_ref::<M>()
    }

    /// Mutably borrow the message as an `M`, for in-place transformation.
    pub fn downcast_mut<M: Message>(&mut self) -> Option<&mut M> {
        self.payload.downcast_mut::<M>()
    }

    /// Borrow the payload without knowing its type.
    pub fn payload(&self) -> &(dyn Any + Send + Sync) {
        &*self.payload
    }

    /// Swap the carried message for one of another type, keeping the kind.
    ///
    /// The terminal handler still expects the original type; a replaced
    /// payload that reaches it fails with
    /// [`DispatchError::PayloadMismatch`](crate::DispatchError::PayloadMismatch).
    pub fn replace<M: Message>(self, message: M) -> Self {
        Envelope::new(message, self.kind)
    }

    /// Take the message out as an `M`.
    ///
    /// # Errors
    ///
    /// Returns the envelope unchanged when it carries another type.
    pub fn into_inner<M: Message>(self) -> Result<M, Self> {
        let Envelope { key, kind, payload } = self;
        match payload.downcast::<M>() {
            Ok(message) => Ok(*message),
            Err(payload) => Err(Envelope { key, kind, payload }),
        }
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("type", &self.key.type_name())
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// A type-erased response travelling back up a middleware chain.
///
/// Event dispatch replies with [`Reply::empty`].
pub struct Reply {
    value: Box<dyn Any + Send>,
}

impl Reply {
    /// Wrap a response value.
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self {
            value: Box::new(value),
        }
    }

    /// The reply of a dispatch that produces no value.
    pub fn empty() -> Self {
        Self::new(())
    }

    /// Whether the reply holds a `T`.
    pub fn is<T: Send + 'static>(&self) -> bool {
        self.value.is::<T>()
    }

    /// Borrow the reply as a `T`.
    pub fn downcast_ref<T: Send + 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Mutably borrow the reply as a `T`.
    pub fn downcast_mut<T: Send + 'static>(&mut self) -> Option<&mut T> {
        self.value.downcast_mut::<T>()
    }

    /// Take the reply out as a `T`.
    ///
    /// # Errors
    ///
    /// Returns the reply unchanged when it holds another type.
    pub fn into_inner<T: Send + 'static>(self) -> Result<T, Self> {
        self.value
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|value| Reply { value })
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply").finish_non_exhaustive()
    }
}

/// A cross-cutting behaviour wrapped around dispatch.
///
/// This trait uses native `async fn` for static dispatch. Chains store
/// middlewares as [`DynMiddleware`] trait objects; the blanket
/// implementation bridges the two.
#[diagnostic::on_unimplemented(
    message = "`{Self}` does not implement `Middleware`",
    label = "missing `Middleware` implementation",
    note = "Middlewares must implement `process` and call `next.run` to continue the chain."
)]
pub trait Middleware: Send + Sync + 'static {
    /// Handle one dispatch, delegating to `next` to continue the chain.
    ///
    /// An error from `next` must be returned, possibly translated into
    /// another error. It must never be turned into a success.
    fn process(
        &self,
        envelope: Envelope,
        ctx: &Context,
        next: Next<'_>,
    ) -> impl Future<Output = Result<Reply, DispatchError>> + Send;
}

/// Dynamic object-safe version of [`Middleware`].
pub trait DynMiddleware: Send + Sync + 'static {
    /// Handle one dispatch (dynamic dispatch version).
    fn process_dyn<'a>(
        &'a self,
        envelope: Envelope,
        ctx: &'a Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Reply, DispatchError>>;
}

// Blanket implementation: any Middleware is a DynMiddleware.
impl<T: Middleware> DynMiddleware for T {
    fn process_dyn<'a>(
        &'a self,
        envelope: Envelope,
        ctx: &'a Context,
        next: Next<'a>,
    ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
        Box::pin(self.process(envelope, ctx, next))
    }
}

/// The innermost step of a chain: the dispatcher's own lookup and invoke.
pub trait Terminal: Send + Sync {
    /// Deliver the envelope to its handler(s).
    fn invoke<'a>(
        &'a self,
        envelope: Envelope,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, DispatchError>>;
}

/// The remainder of a middleware chain.
///
/// `Next` is a cheap copyable cursor: the middlewares still to run and the
/// terminal at the end.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    middlewares: &'a [std::sync::Arc<dyn DynMiddleware>],
    terminal: &'a dyn Terminal,
}

impl<'a> Next<'a> {
    /// A cursor positioned before `middlewares`, ending at `terminal`.
    pub fn new(middlewares: &'a [std::sync::Arc<dyn DynMiddleware>], terminal: &'a dyn Terminal) -> Self {
        Self {
            middlewares,
            terminal,
        }
    }

    /// Number of middlewares left before the terminal.
    pub fn remaining(&self) -> usize {
        self.middlewares.len()
    }

    /// Run the rest of the chain.
    pub fn run(self, envelope: Envelope, ctx: &'a Context) -> BoxFuture<'a, Result<Reply, DispatchError>> {
        match self.middlewares.split_first() {
            Some((head, rest)) => head.process_dyn(envelope, ctx, Next::new(rest, self.terminal)),
            None => self.terminal.invoke(envelope, ctx),
        }
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next")
            .field("remaining", &self.remaining())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, PartialEq)]
    struct Greet(String);

    struct Echo;

    impl Terminal for Echo {
        fn invoke<'a>(
            &'a self,
            envelope: Envelope,
            _ctx: &'a Context,
        ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
            Box::pin(async move {
                let greet = envelope.downcast_ref::<Greet>().map(|g| g.0.clone());
                Ok(Reply::new(greet.unwrap_or_default()))
            })
        }
    }

    struct Upper;

    impl Middleware for Upper {
        async fn process(
            &self,
            mut envelope: Envelope,
            ctx: &Context,
            next: Next<'_>,
        ) -> Result<Reply, DispatchError> {
            if let Some(greet) = envelope.downcast_mut::<Greet>() {
                greet.0 = greet.0.to_uppercase();
            }
            next.run(envelope, ctx).await
        }
    }

    struct Log(Arc<Mutex<Vec<usize>>>);

    impl Middleware for Log {
        async fn process(
            &self,
            envelope: Envelope,
            ctx: &Context,
            next: Next<'_>,
        ) -> Result<Reply, DispatchError> {
            self.0.lock().unwrap().push(next.remaining());
            next.run(envelope, ctx).await
        }
    }

    #[tokio::test]
    async fn empty_chain_reaches_terminal() {
        let ctx = Context::new();
        let reply = Next::new(&[], &Echo)
            .run(Envelope::new(Greet("hi".into()), MessageKind::Query), &ctx)
            .await
            .unwrap();
        assert_eq!(reply.into_inner::<String>().unwrap(), "hi");
    }

    #[tokio::test]
    async fn middleware_transforms_payload() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let chain: Vec<Arc<dyn DynMiddleware>> = vec![Arc::new(Log(seen.clone())), Arc::new(Upper)];
        let ctx = Context::new();

        let reply = Next::new(&chain, &Echo)
            .run(Envelope::new(Greet("hi".into()), MessageKind::Query), &ctx)
            .await
            .unwrap();

        assert_eq!(reply.into_inner::<String>().unwrap(), "HI");
        assert_eq!(*seen.lock().unwrap(), vec![1]);
    }

    #[test]
    fn envelope_into_inner_keeps_envelope_on_mismatch() {
        let envelope = Envelope::new(Greet("x".into()), MessageKind::Command);
        let envelope = envelope.into_inner::<String>().unwrap_err();
        assert!(envelope.is::<Greet>());
        assert_eq!(envelope.into_inner::<Greet>().unwrap(), Greet("x".into()));
    }
}
