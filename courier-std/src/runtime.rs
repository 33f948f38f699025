//! # Runtime
//!
//! The runtime assembles the bus: one [`CommandDispatcher`], one
//! [`QueryDispatcher`], one [`EventDispatcher`], the components they depend
//! on and the shared resources handlers reach through
//! [`Context::resource`].
//!
//! ```rust,ignore
//! let db = Database::new(PgManager::default());
//! db.configure(settings)?;
//!
//! let runtime = Runtime::builder()
//!     .commands(CommandDispatcher::builder().discover()?.build())
//!     .component(db.clone())
//!     .resource(db)
//!     .build();
//!
//! runtime.start().await?;
//! let id = runtime.send(CreateWidget { name: "a".into() }, Context::new()).await?;
//! runtime.shutdown().await?;
//! ```

use crate::dispatch::{CommandDispatcher, EventDispatcher, QueryDispatcher};
use courier_core::{
    Component, ComponentState, Context, DispatchError, DynComponent, Event, Extensions, Request,
    ResourceError, kind,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const RUNTIME: &str = "runtime";

/// The assembled bus and the lifecycle of its components.
///
/// Dispatching is only possible between [`start`](Self::start) and
/// [`shutdown`](Self::shutdown); outside that window every call fails with
/// [`ResourceError::ComponentNotAvailable`].
pub struct Runtime {
    commands: CommandDispatcher,
    queries: QueryDispatcher,
    events: EventDispatcher,
    components: Vec<Arc<dyn DynComponent>>,
    resources: Arc<Extensions>,
    state: AtomicU8,
    lifecycle: tokio::sync::Mutex<()>,
}

impl Runtime {
    /// Start assembling a runtime.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// `Configured` once built, `Initialized` once started, then `ShutDown`.
    pub fn state(&self) -> ComponentState {
        ComponentState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The command dispatcher.
    pub fn commands(&self) -> &CommandDispatcher {
        &self.commands
    }

    /// The query dispatcher.
    pub fn queries(&self) -> &QueryDispatcher {
        &self.queries
    }

    /// The event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// A fresh context with the shared resources attached.
    pub fn context(&self) -> Context {
        let mut ctx = Context::new();
        ctx.attach_resources(Arc::clone(&self.resources));
        ctx
    }

    /// Validate every registry, then initialize components in order.
    ///
    /// Nothing is initialized when validation fails, so `start` may be
    /// called again after fixing the registries. When a component fails to
    /// initialize, the ones before it are shut down again in reverse order
    /// and the runtime moves to [`ComponentState::ShutDown`]: shut-down
    /// components cannot be restarted. Calling `start` on a started runtime
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// - [`DispatchError::MissingHandlers`] from validation.
    /// - [`DispatchError::Resource`] from a component, or when the runtime
    ///   was already shut down.
    pub async fn start(&self) -> Result<(), DispatchError> {
        let _lifecycle = self.lifecycle.lock().await;
        match self.state() {
            ComponentState::Initialized => return Ok(()),
            state @ ComponentState::ShutDown => {
                return Err(ResourceError::ComponentNotAvailable {
                    component: RUNTIME,
                    state,
                }
                .into());
            }
            ComponentState::Unconfigured | ComponentState::Configured => {}
        }

        self.commands.validate()?;
        self.queries.validate()?;
        self.events.seal();

        for (started, component) in self.components.iter().enumerate() {
            if let Err(err) = component.initialize_dyn().await {
                tracing::warn!(component = component.name_dyn(), error = %err, "component failed to start");
                for earlier in self.components[..started].iter().rev() {
                    if let Err(cleanup) = earlier.shutdown_dyn().await {
                        tracing::warn!(component = earlier.name_dyn(), error = %cleanup, "cleanup shutdown failed");
                    }
                }
                self.state.store(ComponentState::ShutDown as u8, Ordering::Release);
                return Err(err.into());
            }
        }

        self.state.store(ComponentState::Initialized as u8, Ordering::Release);
        tracing::info!(components = self.components.len(), "runtime started");
        Ok(())
    }

    /// Stop accepting dispatches and shut components down in reverse order.
    ///
    /// Every component is shut down even when an earlier one fails; the
    /// first failure is returned. Calling `shutdown` again is a no-op.
    ///
    /// # Errors
    ///
    /// The first [`ResourceError`] reported by a component.
    pub async fn shutdown(&self) -> Result<(), DispatchError> {
        let _lifecycle = self.lifecycle.lock().await;
        let previous = self.state();
        if previous == ComponentState::ShutDown {
            return Ok(());
        }
        self.state.store(ComponentState::ShutDown as u8, Ordering::Release);

        let mut first_error = None;
        if previous == ComponentState::Initialized {
            for component in self.components.iter().rev() {
                if let Err(err) = component.shutdown_dyn().await {
                    tracing::warn!(component = component.name_dyn(), error = %err, "component failed to shut down");
                    first_error.get_or_insert(err);
                }
            }
        }

        tracing::info!("runtime shut down");
        first_error.map_or(Ok(()), |err| Err(err.into()))
    }

    fn ensure_started(&self) -> Result<(), DispatchError> {
        match self.state() {
            ComponentState::Initialized => Ok(()),
            state => Err(ResourceError::ComponentNotAvailable {
                component: RUNTIME,
                state,
            }
            .into()),
        }
    }

    /// Dispatch a command with the shared resources attached to `ctx`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::ComponentNotAvailable`] outside the started window,
    /// otherwise as [`CommandDispatcher::dispatch`].
    pub async fn send<R>(&self, command: R, mut ctx: Context) -> Result<R::Response, DispatchError>
    where
        R: Request<Kind = kind::Command>,
    {
        self.ensure_started()?;
        ctx.attach_resources(Arc::clone(&self.resources));
        self.commands.dispatch(command, &ctx).await
    }

    /// Dispatch a query with the shared resources attached to `ctx`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::ComponentNotAvailable`] outside the started window,
    /// otherwise as [`QueryDispatcher::dispatch`].
    pub async fn ask<R>(&self, query: R, mut ctx: Context) -> Result<R::Response, DispatchError>
    where
        R: Request<Kind = kind::Query>,
    {
        self.ensure_started()?;
        ctx.attach_resources(Arc::clone(&self.resources));
        self.queries.dispatch(query, &ctx).await
    }

    /// Publish an event with the shared resources attached to `ctx`.
    ///
    /// # Errors
    ///
    /// [`ResourceError::ComponentNotAvailable`] outside the started window,
    /// otherwise as [`EventDispatcher::dispatch`].
    pub async fn publish<E: Event>(&self, event: E, mut ctx: Context) -> Result<(), DispatchError> {
        self.ensure_started()?;
        ctx.attach_resources(Arc::clone(&self.resources));
        self.events.dispatch(event, &ctx).await
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("state", &self.state())
            .field("commands", &self.commands)
            .field("queries", &self.queries)
            .field("events", &self.events)
            .field("components", &self.components.len())
            .field("resources", &self.resources)
            .finish()
    }
}

/// Builder for [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    commands: Option<CommandDispatcher>,
    queries: Option<QueryDispatcher>,
    events: Option<EventDispatcher>,
    components: Vec<Arc<dyn DynComponent>>,
    resources: Extensions,
}

impl RuntimeBuilder {
    /// Use `commands` as the command dispatcher. Defaults to an empty one.
    pub fn commands(mut self, commands: CommandDispatcher) -> Self {
        self.commands = Some(commands);
        self
    }

    /// Use `queries` as the query dispatcher. Defaults to an empty one.
    pub fn queries(mut self, queries: QueryDispatcher) -> Self {
        self.queries = Some(queries);
        self
    }

    /// Use `events` as the event dispatcher. Defaults to an empty one.
    pub fn events(mut self, events: EventDispatcher) -> Self {
        self.events = Some(events);
        self
    }

    /// Add a component. Components start in the order added and shut down
    /// in reverse.
    pub fn component<C: Component>(mut self, component: C) -> Self {
        self.components.push(Arc::new(component));
        self
    }

    /// Share `resource` with every handler through [`Context::resource`].
    /// One value per type; a later value replaces an earlier one.
    pub fn resource<T: Send + Sync + 'static>(mut self, resource: T) -> Self {
        self.resources.insert(resource);
        self
    }

    /// Finish building.
    pub fn build(self) -> Runtime {
        Runtime {
            commands: self.commands.unwrap_or_default(),
            queries: self.queries.unwrap_or_default(),
            events: self.events.unwrap_or_default(),
            components: self.components,
            resources: Arc::new(self.resources),
            state: AtomicU8::new(ComponentState::Configured as u8),
            lifecycle: tokio::sync::Mutex::new(()),
        }
    }
}
