//! Exactly-once dispatch for commands and queries.
//!
//! [`RequestDispatcher`] is generic over the request kind so a command can
//! never be sent to the query dispatcher, or the other way round; the two
//! concrete dispatchers are the [`CommandDispatcher`] and
//! [`QueryDispatcher`] aliases.
//!
//! # Example
//!
//! ```rust,ignore
//! let commands = CommandDispatcher::builder()
//!     .middleware(TracingMiddleware::new())
//!     .handler::<CreateWidget, _>(CreateWidgetHandler::default())?
//!     .build();
//!
//! commands.validate()?;
//! let id = commands.dispatch(CreateWidget { name: "a".into() }, &Context::new()).await?;
//! ```

use super::chain::Chain;
use super::erased::{ErasedRequestHandler, erase_request};
use crate::discovery;
use crate::registry::{HandlerRegistry, Multiplicity};
use courier_core::{
    Context, DispatchError, Envelope, Handler, HandlerKey, Intent, Middleware, Reply, Request,
    RequestKind, Terminal, kind,
};
use futures::future::{self, BoxFuture};
use std::any::type_name;
use std::marker::PhantomData;
use std::sync::Arc;

type RequestRegistry = HandlerRegistry<Arc<dyn ErasedRequestHandler>>;

/// Dispatcher for commands.
pub type CommandDispatcher = RequestDispatcher<kind::Command>;

/// Dispatcher for queries.
pub type QueryDispatcher = RequestDispatcher<kind::Query>;

/// Routes each request of kind `K` to its one registered handler through a
/// middleware chain.
///
/// The handler lookup is the terminal step of the chain. The registry is
/// sealed on the first dispatch or on [`validate`](Self::validate); after
/// that, lookups are lock-free and registration fails.
pub struct RequestDispatcher<K: RequestKind> {
    registry: RequestRegistry,
    chain: Chain,
    required: Vec<HandlerKey>,
    check_declared: bool,
    _kind: PhantomData<fn(K)>,
}

impl<K: RequestKind> RequestDispatcher<K> {
    /// A dispatcher with no middleware and no handler.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a dispatcher.
    pub fn builder() -> RequestDispatcherBuilder<K> {
        RequestDispatcherBuilder::new()
    }

    /// Command or query.
    pub fn intent(&self) -> Intent {
        K::INTENT
    }

    /// Register `handler` as the one handler for `R`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::DuplicateHandler`] when `R` already has a handler,
    /// [`DispatchError::RegistryFrozen`] once the dispatcher is sealed.
    pub fn register_handler<R, H>(&self, handler: H) -> Result<(), DispatchError>
    where
        R: Request<Kind = K>,
        H: Handler<R>,
    {
        register::<R, H>(&self.registry, handler)
    }

    /// Whether `R` has a handler. Never mutates the dispatcher.
    pub fn has_handler_for<R: Request<Kind = K>>(&self) -> bool {
        self.registry.contains(HandlerKey::of::<R>().type_id())
    }

    /// Run `request` through the middleware chain to its handler.
    ///
    /// Seals the registry on first use.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::NoHandlerRegistered`] naming the concrete type.
    /// - [`DispatchError::Handler`] carrying the handler's own error.
    /// - [`DispatchError::Cancelled`] when the context's token fires first.
    /// - Any error raised or translated by a middleware.
    pub async fn dispatch<R>(&self, request: R, ctx: &Context) -> Result<R::Response, DispatchError>
    where
        R: Request<Kind = K>,
    {
        if ctx.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        self.registry.seal();

        let key = HandlerKey::of::<R>();
        let terminal = Lookup {
            registry: &self.registry,
            key,
        };
        let envelope = Envelope::new(request, K::INTENT.into());

        let reply = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => return Err(DispatchError::Cancelled),
            reply = self.chain.run(envelope, ctx, &terminal) => reply?,
        };

        reply
            .into_inner::<R::Response>()
            .map_err(|_| DispatchError::ResponseMismatch {
                message_type: key.type_name(),
                expected: type_name::<R::Response>(),
            })
    }

    /// Seal the registry and check that every required request type has a
    /// handler.
    ///
    /// Required types are those named with
    /// [`RequestDispatcherBuilder::require`] plus, when the dispatcher was
    /// built with [`discover`](RequestDispatcherBuilder::discover), every
    /// type declared through `#[derive(Command)]` / `#[derive(Query)]`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::MissingHandlers`] listing every type without a handler.
    pub fn validate(&self) -> Result<(), DispatchError> {
        self.registry.seal();

        let mut required = self.required.clone();
        if self.check_declared {
            for key in discovery::declared_requests(K::INTENT) {
                if !required.contains(&key) {
                    required.push(key);
                }
            }
        }

        let missing: Vec<&'static str> = required
            .iter()
            .filter(|key| !self.registry.contains(key.type_id()))
            .map(HandlerKey::type_name)
            .collect();

        if missing.is_empty() {
            tracing::debug!(intent = %K::INTENT, types = self.registry.len(), "dispatcher validated");
            Ok(())
        } else {
            Err(DispatchError::MissingHandlers(missing))
        }
    }

    /// Every request type with a handler, in registration order.
    pub fn list_types(&self) -> impl Iterator<Item = HandlerKey> + Clone + '_ {
        self.registry.list_types()
    }

    /// Whether the registry is sealed.
    pub fn is_sealed(&self) -> bool {
        self.registry.is_sealed()
    }
}

impl<K: RequestKind> Default for RequestDispatcher<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: RequestKind> std::fmt::Debug for RequestDispatcher<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestDispatcher")
            .field("intent", &K::INTENT)
            .field("registry", &self.registry)
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

fn register<R, H>(registry: &RequestRegistry, handler: H) -> Result<(), DispatchError>
where
    R: Request,
    H: Handler<R>,
{
    registry.register(HandlerKey::of::<R>(), type_name::<H>(), erase_request::<R, H>(handler))
}

/// The innermost step of a request chain: resolve and invoke.
struct Lookup<'r> {
    registry: &'r RequestRegistry,
    key: HandlerKey,
}

impl Terminal for Lookup<'_> {
    fn invoke<'a>(
        &'a self,
        envelope: Envelope,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
        let handler = self.registry.resolve(&self.key).and_then(|resolved| {
            resolved
                .first()
                .map(|registration| registration.handler().clone())
                .ok_or(DispatchError::NoHandlerRegistered {
                    message_type: self.key.type_name(),
                })
        });

        match handler {
            Ok(handler) => Box::pin(async move { handler.call_erased(envelope, ctx).await }),
            Err(err) => Box::pin(future::ready(Err(err))),
        }
    }
}

/// Builder for [`RequestDispatcher`].
pub struct RequestDispatcherBuilder<K: RequestKind> {
    registry: RequestRegistry,
    chain: Chain,
    required: Vec<HandlerKey>,
    check_declared: bool,
    _kind: PhantomData<fn(K)>,
}

impl<K: RequestKind> RequestDispatcherBuilder<K> {
    /// An empty builder.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(Multiplicity::ExactlyOnce),
            chain: Chain::new(),
            required: Vec::new(),
            check_declared: false,
            _kind: PhantomData,
        }
    }

    /// Append a middleware. Middlewares run in the order they are added.
    pub fn middleware<M: Middleware>(mut self, middleware: M) -> Self {
        self.chain.push(middleware);
        self
    }

    /// Use a prepared chain, replacing any middleware added so far.
    pub fn chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    /// Register `handler` as the one handler for `R`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::DuplicateHandler`] when `R` already has a handler.
    pub fn handler<R, H>(self, handler: H) -> Result<Self, DispatchError>
    where
        R: Request<Kind = K>,
        H: Handler<R>,
    {
        register::<R, H>(&self.registry, handler)?;
        Ok(self)
    }

    /// Register every `#[handler]` of this kind found in the binary, and
    /// check derive-declared request types in `validate()`.
    ///
    /// # Errors
    ///
    /// [`DispatchError::DuplicateHandler`] when a discovered handler collides
    /// with another registration.
    pub fn discover(mut self) -> Result<Self, DispatchError> {
        for registration in discovery::request_handlers(K::INTENT) {
            self.registry.register(
                registration.key(),
                registration.handler_name(),
                registration.instantiate(),
            )?;
        }
        self.check_declared = true;
        Ok(self)
    }

    /// Require `R` to have a handler when the dispatcher is validated.
    pub fn require<R: Request<Kind = K>>(mut self) -> Self {
        let key = HandlerKey::of::<R>();
        if !self.required.contains(&key) {
            self.required.push(key);
        }
        self
    }

    /// Finish building.
    pub fn build(self) -> RequestDispatcher<K> {
        RequestDispatcher {
            registry: self.registry,
            chain: self.chain,
            required: self.required,
            check_declared: self.check_declared,
            _kind: PhantomData,
        }
    }
}

impl<K: RequestKind> Default for RequestDispatcherBuilder<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{CancellationToken, Next};
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct CreateWidget {
        name: String,
    }

    impl Request for CreateWidget {
        type Response = u64;
        type Kind = kind::Command;
    }

    struct RenameWidget;

    impl Request for RenameWidget {
        type Response = ();
        type Kind = kind::Command;
    }

    #[derive(Debug, thiserror::Error, PartialEq)]
    #[error("name `{0}` is taken")]
    struct NameTaken(String);

    #[derive(Default)]
    struct H1 {
        seen: Arc<Mutex<Vec<CreateWidget>>>,
    }

    impl Handler<CreateWidget> for H1 {
        type Error = NameTaken;

        async fn handle(&self, cmd: CreateWidget, _ctx: &Context) -> Result<u64, NameTaken> {
            self.seen.lock().unwrap().push(cmd.clone());
            if cmd.name == "taken" {
                Err(NameTaken(cmd.name))
            } else {
                Ok(1)
            }
        }
    }

    #[derive(Default)]
    struct H2;

    impl Handler<CreateWidget> for H2 {
        type Error = NameTaken;

        async fn handle(&self, _cmd: CreateWidget, _ctx: &Context) -> Result<u64, NameTaken> {
            Ok(2)
        }
    }

    fn widget(name: &str) -> CreateWidget {
        CreateWidget { name: name.into() }
    }

    #[tokio::test]
    async fn dispatch_invokes_the_handler_once() {
        let handler = H1::default();
        let seen = handler.seen.clone();
        let commands = CommandDispatcher::builder()
            .handler::<CreateWidget, _>(handler)
            .unwrap()
            .build();

        let id = commands.dispatch(widget("a"), &Context::new()).await.unwrap();

        assert_eq!(id, 1);
        assert_eq!(*seen.lock().unwrap(), vec![widget("a")]);
    }

    #[tokio::test]
    async fn missing_handler_names_the_type() {
        let commands = CommandDispatcher::new();
        let err = commands.dispatch(widget("a"), &Context::new()).await.unwrap_err();

        assert!(matches!(err, DispatchError::NoHandlerRegistered { .. }));
        assert!(err.to_string().contains("CreateWidget"));
    }

    #[test]
    fn second_handler_is_rejected() {
        let commands = CommandDispatcher::new();
        commands.register_handler::<CreateWidget, _>(H1::default()).unwrap();

        let err = commands.register_handler::<CreateWidget, _>(H2).unwrap_err();
        assert!(matches!(err, DispatchError::DuplicateHandler { .. }));
    }

    #[tokio::test]
    async fn handler_error_is_propagated_unchanged() {
        let commands = CommandDispatcher::new();
        commands.register_handler::<CreateWidget, _>(H1::default()).unwrap();

        let err = commands.dispatch(widget("taken"), &Context::new()).await.unwrap_err();
        assert_eq!(err.handler_error::<NameTaken>(), Some(&NameTaken("taken".into())));
    }

    #[tokio::test]
    async fn closures_are_handlers() {
        let commands = CommandDispatcher::new();
        commands
            .register_handler::<RenameWidget, _>(|_cmd: RenameWidget| async {
                Ok::<_, NameTaken>(())
            })
            .unwrap();

        commands.dispatch(RenameWidget, &Context::new()).await.unwrap();
    }

    #[tokio::test]
    async fn has_handler_for_does_not_seal() {
        let commands = CommandDispatcher::new();
        assert!(!commands.has_handler_for::<CreateWidget>());
        commands.register_handler::<CreateWidget, _>(H1::default()).unwrap();
        assert!(commands.has_handler_for::<CreateWidget>());
        assert!(!commands.is_sealed());

        commands.dispatch(widget("a"), &Context::new()).await.unwrap();
        assert!(commands.is_sealed());
        assert!(matches!(
            commands.register_handler::<RenameWidget, _>(|_cmd: RenameWidget| async {
                Ok::<_, NameTaken>(())
            }),
            Err(DispatchError::RegistryFrozen { .. })
        ));
    }

    #[test]
    fn validate_reports_every_missing_type() {
        let commands = CommandDispatcher::builder()
            .require::<CreateWidget>()
            .require::<RenameWidget>()
            .build();

        match commands.validate() {
            Err(DispatchError::MissingHandlers(missing)) => {
                assert_eq!(missing.len(), 2);
                assert!(missing[0].ends_with("CreateWidget"));
                assert!(missing[1].ends_with("RenameWidget"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn validate_passes_when_complete() {
        let commands = CommandDispatcher::builder()
            .require::<CreateWidget>()
            .handler::<CreateWidget, _>(H2)
            .unwrap()
            .build();

        commands.validate().unwrap();
        assert!(commands.is_sealed());
        assert_eq!(commands.list_types().count(), 1);
    }

    #[tokio::test]
    async fn cancelled_context_fails_fast() {
        let handler = H1::default();
        let seen = handler.seen.clone();
        let commands = CommandDispatcher::builder()
            .handler::<CreateWidget, _>(handler)
            .unwrap()
            .build();

        let token = CancellationToken::new();
        token.cancel();
        let ctx = Context::new().with_cancellation(token);

        let err = commands.dispatch(widget("a"), &ctx).await.unwrap_err();
        assert!(matches!(err, DispatchError::Cancelled));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancellation_interrupts_a_running_handler() {
        let commands = CommandDispatcher::new();
        commands
            .register_handler::<RenameWidget, _>(|_cmd: RenameWidget| async {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok::<_, NameTaken>(())
            })
            .unwrap();

        let token = CancellationToken::new();
        let ctx = Context::new().with_cancellation(token.clone());
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            token.cancel();
        });

        let result = tokio::time::timeout(Duration::from_secs(5), commands.dispatch(RenameWidget, &ctx))
            .await
            .expect("dispatch should stop on cancellation");
        assert!(matches!(result, Err(DispatchError::Cancelled)));
    }

    struct WrongReply;

    impl Middleware for WrongReply {
        async fn process(
            &self,
            _envelope: Envelope,
            _ctx: &Context,
            _next: Next<'_>,
        ) -> Result<Reply, DispatchError> {
            Ok(Reply::new("not a u64"))
        }
    }

    struct SwapPayload;

    impl Middleware for SwapPayload {
        async fn process(
            &self,
            envelope: Envelope,
            ctx: &Context,
            next: Next<'_>,
        ) -> Result<Reply, DispatchError> {
            next.run(envelope.replace(RenameWidget), ctx).await
        }
    }

    #[tokio::test]
    async fn mistyped_reply_is_reported() {
        let commands = CommandDispatcher::builder()
            .middleware(WrongReply)
            .handler::<CreateWidget, _>(H2)
            .unwrap()
            .build();

        let err = commands.dispatch(widget("a"), &Context::new()).await.unwrap_err();
        assert!(matches!(err, DispatchError::ResponseMismatch { .. }));
    }

    #[tokio::test]
    async fn replaced_payload_is_reported() {
        let commands = CommandDispatcher::builder()
            .middleware(SwapPayload)
            .handler::<CreateWidget, _>(H2)
            .unwrap()
            .build();

        let err = commands.dispatch(widget("a"), &Context::new()).await.unwrap_err();
        match err {
            DispatchError::PayloadMismatch { expected, found } => {
                assert!(expected.ends_with("CreateWidget"));
                assert!(found.ends_with("RenameWidget"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
