//! Fan-out dispatch for events.
//!
//! Every handler registered for an event type is invoked once, one after
//! another, in registration order. Zero handlers is a successful no-op.

use super::chain::Chain;
use super::erased::{ErasedEventHandler, erase_event};
use crate::discovery;
use crate::registry::{HandlerRegistry, Multiplicity, Resolved};
use courier_core::{
    BoxError, Context, DispatchError, Envelope, Event, EventHandler, HandlerFailure, HandlerKey,
    Middleware, MessageKind, Reply, Terminal,
};
use futures::future::BoxFuture;
use std::any::type_name;
use std::sync::Arc;

type EventRegistry = HandlerRegistry<Arc<dyn ErasedEventHandler>>;

/// What happens when one of several event handlers fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Stop at the first failure and return it; later handlers do not run.
    #[default]
    FailFast,
    /// Run every handler, then report all failures together as
    /// [`DispatchError::PartialDelivery`].
    BestEffort,
}

/// Delivers each event to all of its subscribers.
pub struct EventDispatcher {
    registry: EventRegistry,
    chain: Chain,
    policy: DeliveryPolicy,
}

impl EventDispatcher {
    /// A fail-fast dispatcher with no middleware and no handler.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a dispatcher.
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::new()
    }

    /// The delivery policy.
    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    /// Subscribe `handler` to `E`. Repeated subscriptions are kept.
    ///
    /// # Errors
    ///
    /// [`DispatchError::RegistryFrozen`] once the dispatcher is sealed.
    pub fn register_handler<E, H>(&self, handler: H) -> Result<(), DispatchError>
    where
        E: Event,
        H: EventHandler<E>,
    {
        register::<E, H>(&self.registry, handler)
    }

    /// Whether `E` has at least one subscriber. Never mutates the dispatcher.
    pub fn has_handlers_for<E: Event>(&self) -> bool {
        self.registry.contains(HandlerKey::of::<E>().type_id())
    }

    /// Number of subscribers of `E`.
    pub fn handler_count<E: Event>(&self) -> usize {
        self.registry
            .resolve(&HandlerKey::of::<E>())
            .map_or(0, |resolved| resolved.len())
    }

    /// Deliver `event` through the middleware chain to every subscriber.
    ///
    /// Seals the registry on first use.
    ///
    /// # Errors
    ///
    /// Under [`DeliveryPolicy::FailFast`], the first handler error as
    /// [`DispatchError::Handler`]. Under [`DeliveryPolicy::BestEffort`],
    /// [`DispatchError::PartialDelivery`] once every handler has run.
    /// [`DispatchError::Cancelled`] when the context's token fires first.
    pub async fn dispatch<E: Event>(&self, event: E, ctx: &Context) -> Result<(), DispatchError> {
        if ctx.is_cancelled() {
            return Err(DispatchError::Cancelled);
        }
        self.registry.seal();

        let terminal = Deliver {
            registry: &self.registry,
            key: HandlerKey::of::<E>(),
            policy: self.policy,
        };
        let envelope = Envelope::new(event, MessageKind::Event);

        tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => Err(DispatchError::Cancelled),
            reply = self.chain.run(envelope, ctx, &terminal) => reply.map(drop),
        }
    }

    /// Seal the registry. Later subscriptions fail.
    pub fn seal(&self) {
        self.registry.seal();
    }

    /// Whether the registry is sealed.
    pub fn is_sealed(&self) -> bool {
        self.registry.is_sealed()
    }

    /// Every event type with a subscriber, in registration order.
    pub fn list_types(&self) -> impl Iterator<Item = HandlerKey> + Clone + '_ {
        self.registry.list_types()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("registry", &self.registry)
            .field("chain", &self.chain)
            .field("policy", &self.policy)
            .finish()
    }
}

fn register<E, H>(registry: &EventRegistry, handler: H) -> Result<(), DispatchError>
where
    E: Event,
    H: EventHandler<E>,
{
    registry.register(HandlerKey::of::<E>(), type_name::<H>(), erase_event::<E, H>(handler))
}

/// The innermost step of an event chain: resolve and fan out.
struct Deliver<'r> {
    registry: &'r EventRegistry,
    key: HandlerKey,
    policy: DeliveryPolicy,
}

impl Deliver<'_> {
    async fn deliver(
        &self,
        handlers: Resolved<Arc<dyn ErasedEventHandler>>,
        envelope: Envelope,
        ctx: &Context,
    ) -> Result<Reply, DispatchError> {
        let mut failures = Vec::new();

        for registration in handlers.iter() {
            let Err(err) = registration.handler().call_erased(&envelope, ctx).await else {
                continue;
            };
            match self.policy {
                DeliveryPolicy::FailFast => return Err(err),
                DeliveryPolicy::BestEffort => {
                    tracing::warn!(
                        event_type = self.key.type_name(),
                        handler = registration.handler_name(),
                        error = %err,
                        "event handler failed"
                    );
                    let error: BoxError = match err {
                        DispatchError::Handler { source, .. } => source,
                        other => Box::new(other),
                    };
                    failures.push(HandlerFailure {
                        handler: registration.handler_name(),
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(Reply::empty())
        } else {
            Err(DispatchError::PartialDelivery {
                event_type: self.key.type_name(),
                failures,
            })
        }
    }
}

impl Terminal for Deliver<'_> {
    fn invoke<'a>(
        &'a self,
        envelope: Envelope,
        ctx: &'a Context,
    ) -> BoxFuture<'a, Result<Reply, DispatchError>> {
        Box::pin(async move {
            let handlers = self.registry.resolve(&self.key)?;
            if handlers.is_empty() {
                tracing::trace!(event_type = self.key.type_name(), "no subscribers");
                return Ok(Reply::empty());
            }
            self.deliver(handlers, envelope, ctx).await
        })
    }
}

/// Builder for [`EventDispatcher`].
pub struct EventDispatcherBuilder {
    registry: EventRegistry,
    chain: Chain,
    policy: DeliveryPolicy,
}

impl EventDispatcherBuilder {
    /// An empty fail-fast builder.
    pub fn new() -> Self {
        Self {
            registry: HandlerRegistry::new(Multiplicity::FanOut),
            chain: Chain::new(),
            policy: DeliveryPolicy::default(),
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

    /// Set the delivery policy.
    pub fn policy(mut self, policy: DeliveryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Subscribe `handler` to `E`.
    ///
    /// # Errors
    ///
    /// Never fails before the dispatcher is built; the `Result` keeps the
    /// signature in line with the request builder.
    pub fn handler<E, H>(self, handler: H) -> Result<Self, DispatchError>
    where
        E: Event,
        H: EventHandler<E>,
    {
        register::<E, H>(&self.registry, handler)?;
        Ok(self)
    }

    /// Subscribe every `#[handler]` event handler found in the binary.
    ///
    /// # Errors
    ///
    /// Propagates registry errors.
    pub fn discover(self) -> Result<Self, DispatchError> {
        for registration in discovery::event_handlers() {
            self.registry.register(
                registration.key(),
                registration.handler_name(),
                registration.instantiate(),
            )?;
        }
        Ok(self)
    }

    /// Finish building.
    pub fn build(self) -> EventDispatcher {
        EventDispatcher {
            registry: self.registry,
            chain: self.chain,
            policy: self.policy,
        }
    }
}

impl Default for EventDispatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    struct WidgetCreated {
        id: u64,
    }

    impl Event for WidgetCreated {}

    #[derive(Debug, thiserror::Error)]
    #[error("projection offline")]
    struct Offline;

    struct Subscriber {
        name: &'static str,
        fail: bool,
        log: Arc<Mutex<Vec<(&'static str, u64)>>>,
    }

    impl EventHandler<WidgetCreated> for Subscriber {
        type Error = Offline;

        async fn handle(&self, event: &WidgetCreated, _ctx: &Context) -> Result<(), Offline> {
            self.log.lock().unwrap().push((self.name, event.id));
            if self.fail { Err(Offline) } else { Ok(()) }
        }
    }

    fn subscriber(name: &'static str, fail: bool, log: &Arc<Mutex<Vec<(&'static str, u64)>>>) -> Subscriber {
        Subscriber {
            name,
            fail,
            log: log.clone(),
        }
    }

    #[tokio::test]
    async fn zero_handlers_is_a_no_op() {
        let events = EventDispatcher::new();
        events.dispatch(WidgetCreated { id: 1 }, &Context::new()).await.unwrap();
        assert_eq!(events.handler_count::<WidgetCreated>(), 0);
    }

    #[tokio::test]
    async fn handlers_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let events = EventDispatcher::builder()
            .handler::<WidgetCreated, _>(subscriber("E1", false, &log))
            .unwrap()
            .handler::<WidgetCreated, _>(subscriber("E2", false, &log))
            .unwrap()
            .handler::<WidgetCreated, _>(subscriber("E3", false, &log))
            .unwrap()
            .build();

        events.dispatch(WidgetCreated { id: 7 }, &Context::new()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec![("E1", 7), ("E2", 7), ("E3", 7)]);
    }

    #[tokio::test]
    async fn fail_fast_stops_at_first_failure() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let events = EventDispatcher::new();
        events
            .register_handler::<WidgetCreated, _>(subscriber("E1", true, &log))
            .unwrap();
        events
            .register_handler::<WidgetCreated, _>(subscriber("E2", false, &log))
            .unwrap();

        let err = events
            .dispatch(WidgetCreated { id: 1 }, &Context::new())
            .await
            .unwrap_err();

        assert!(err.handler_error::<Offline>().is_some());
        assert_eq!(*log.lock().unwrap(), vec![("E1", 1)]);
    }

    #[tokio::test]
    async fn best_effort_runs_everyone_and_collects_failures() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let events = EventDispatcher::builder()
            .policy(DeliveryPolicy::BestEffort)
            .handler::<WidgetCreated, _>(subscriber("E1", true, &log))
            .unwrap()
            .handler::<WidgetCreated, _>(subscriber("E2", false, &log))
            .unwrap()
            .handler::<WidgetCreated, _>(subscriber("E3", true, &log))
            .unwrap()
            .build();

        let err = events
            .dispatch(WidgetCreated { id: 2 }, &Context::new())
            .await
            .unwrap_err();

        assert_eq!(log.lock().unwrap().len(), 3);
        match err {
            DispatchError::PartialDelivery { event_type, failures } => {
                assert!(event_type.ends_with("WidgetCreated"));
                assert_eq!(failures.len(), 2);
                assert!(failures[0].error.downcast_ref::<Offline>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn subscribing_after_dispatch_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let events = EventDispatcher::new();
        events.dispatch(WidgetCreated { id: 1 }, &Context::new()).await.unwrap();

        assert!(matches!(
            events.register_handler::<WidgetCreated, _>(subscriber("late", false, &log)),
            Err(DispatchError::RegistryFrozen { .. })
        ));
    }
}
