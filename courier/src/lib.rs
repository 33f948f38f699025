//! # courier - Command, Query and Event Dispatch
//!
//! `courier` routes each message to its handler through a configurable
//! middleware chain. Commands and queries have exactly one handler and
//! return its response; events fan out to every registered handler in
//! order.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! #[derive(Command)]
//! #[command(response = u64)]
//! struct CreateWidget {
//!     name: String,
//! }
//!
//! #[derive(Default)]
//! struct CreateWidgetHandler;
//!
//! #[handler]
//! impl Handler<CreateWidget> for CreateWidgetHandler {
//!     type Error = std::convert::Infallible;
//!
//!     async fn handle(&self, cmd: CreateWidget, _ctx: &Context) -> Result<u64, Self::Error> {
//!         Ok(cmd.name.len() as u64)
//!     }
//! }
//!
//! let commands = CommandDispatcher::builder()
//!     .middleware(TracingMiddleware::named("commands"))
//!     .discover()?
//!     .build();
//! commands.validate()?;
//!
//! let id = commands.dispatch(CreateWidget { name: "a".into() }, &Context::new()).await?;
//! ```

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

pub use courier_core::{
    // Errors
    BoxError,
    // Context
    CancellationToken,
    // Components
    Component,
    ComponentState,
    Configurable,
    Context,
    DispatchError,
    DynComponent,
    // Middleware
    DynMiddleware,
    Envelope,
    // Messages
    Event,
    // Handlers
    EventHandler,
    Extensions,
    Handler,
    HandlerFailure,
    HandlerKey,
    Intent,
    Message,
    MessageKind,
    Middleware,
    Next,
    Reply,
    Request,
    RequestKind,
    ResourceError,
    Terminal,
    kind,
};

pub use courier_std::{
    Chain, CommandDispatcher, DeliveryPolicy, EventDispatcher, HandlerRegistry, Multiplicity,
    QueryDispatcher, RequestDispatcher, Runtime, RuntimeBuilder,
};

pub use courier_std::inventory;

/// Dispatchers and their builders.
pub mod dispatch {
    pub use courier_std::dispatch::{
        Chain, CommandDispatcher, DeliveryPolicy, EventDispatcher, EventDispatcherBuilder,
        QueryDispatcher, RequestDispatcher, RequestDispatcherBuilder,
    };
}

/// Link-time handler registration records.
pub mod discovery {
    pub use courier_std::discovery::{
        DeclaredRequest, EventRegistration, RequestRegistration, declared_requests,
        event_handlers, request_handlers,
    };
}

/// Standard middleware implementations.
pub mod middleware {
    pub use courier_std::middleware::{
        TimeoutMiddleware, TracingMiddleware, TranslateErrors, ValidationMiddleware,
    };
}

/// Connection pooling and transactions.
pub mod resource {
    pub use courier_std::resource::{
        ConnectionManager, Database, PoolSettings, PoolStatus, PooledConnection, Transaction,
    };
}

/// Testing utilities.
pub mod testing {
    #![allow(clippy::wildcard_imports)]
    pub use courier_std::testing::*;
}

/// Prelude module - common imports for Courier.
///
/// # Usage
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        CommandDispatcher,
        // Components
        Component,
        Configurable,
        // Context
        Context,
        // Errors
        DispatchError,
        // Core traits
        Event,
        EventDispatcher,
        EventHandler,
        Handler,
        Middleware,
        Next,
        QueryDispatcher,
        Request,
        ResourceError,
        Runtime,
    };
    pub use crate::middleware::{TimeoutMiddleware, TracingMiddleware, ValidationMiddleware};

    #[cfg(feature = "macros")]
    pub use crate::{Command, Query, handler};
}

#[cfg(feature = "macros")]
pub use courier_macros::{Command, Event, Query, handler};
