//! # courier-std
//!
//! Standard implementations for the Courier dispatch framework.
//!
//! This crate provides:
//! - **Registries**: [`HandlerRegistry`], sealed on first dispatch
//! - **Dispatchers**: [`CommandDispatcher`], [`QueryDispatcher`], [`EventDispatcher`]
//! - **Standard middleware**: Tracing, Timeout, Validation, Error translation
//! - **Discovery**: link-time handler registration through [`inventory`]
//! - **Resources**: the [`Database`] connection pool and scoped [`Transaction`]s
//! - **Runtime**: the [`Runtime`] bus tying dispatchers and components together

#![deny(clippy::wildcard_imports)]
#![warn(missing_docs)]

// Re-export core traits
pub use courier_core;
pub use inventory;

// Modules
pub mod discovery;
pub mod dispatch;
pub mod middleware;
pub mod registry;
pub mod resource;
pub mod runtime;
pub mod testing;

pub use dispatch::{
    Chain, CommandDispatcher, DeliveryPolicy, EventDispatcher, QueryDispatcher, RequestDispatcher,
};
pub use registry::{HandlerRegistry, Multiplicity};
pub use resource::{ConnectionManager, Database, PoolSettings, Transaction};
pub use runtime::{Runtime, RuntimeBuilder};
