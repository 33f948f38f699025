//! Async resource components.
//!
//! [`Database`] is the pooled connection component handlers run their
//! transactions on. Drivers plug in through [`ConnectionManager`].

mod manager;
mod pool;
mod settings;
mod transaction;

pub use manager::ConnectionManager;
pub use pool::{Database, PoolStatus, PooledConnection};
pub use settings::PoolSettings;
pub use transaction::Transaction;
