//! Scoped transactions.

use super::manager::ConnectionManager;
use super::pool::PooledConnection;
use courier_core::ResourceError;
use std::fmt;
use std::ops::{Deref, DerefMut};

/// An open transaction owning its pooled connection.
///
/// Ownership makes the connection unreachable by anyone else while the
/// transaction is open, and the transaction cannot outlive it. Finish with
/// [`commit`](Self::commit) or [`rollback`](Self::rollback); a transaction
/// dropped without either is rolled back before the connection is reused.
pub struct Transaction<M: ConnectionManager> {
    conn: PooledConnection<M>,
}

impl<M: ConnectionManager> Transaction<M> {
    pub(super) async fn begin(mut conn: PooledConnection<M>) -> Result<Self, ResourceError> {
        let (manager, raw) = conn.split();
        manager.begin(raw).await.map_err(ResourceError::driver)?;
        conn.in_transaction = true;
        Ok(Self { conn })
    }

    /// Commit and return the connection to the pool.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Driver`] when the commit fails; the transaction is
    /// then rolled back before the connection is released.
    pub async fn commit(mut self) -> Result<(), ResourceError> {
        let result = {
            let (manager, raw) = self.conn.split();
            manager.commit(raw).await
        };
        match result {
            Ok(()) => {
                self.conn.in_transaction = false;
                Ok(())
            }
            Err(err) => {
                tracing::warn!(component = self.conn.component(), error = %err, "commit failed");
                // A failed rollback only marks the connection broken.
                let _ = self.roll_back().await;
                Err(ResourceError::driver(err))
            }
        }
    }

    /// Roll back and return the connection to the pool.
    ///
    /// # Errors
    ///
    /// [`ResourceError::Driver`] when the rollback fails; the connection is
    /// then closed instead of reused.
    pub async fn rollback(mut self) -> Result<(), ResourceError> {
        self.roll_back().await
    }

    async fn roll_back(&mut self) -> Result<(), ResourceError> {
        let result = {
            let (manager, raw) = self.conn.split();
            manager.rollback(raw).await
        };
        self.conn.in_transaction = false;
        result.map_err(|err| {
            self.conn.broken = true;
            ResourceError::driver(err)
        })
    }
}

impl<M: ConnectionManager> Deref for Transaction<M> {
    type Target = M::Connection;

    fn deref(&self) -> &M::Connection {
        &self.conn
    }
}

impl<M: ConnectionManager> DerefMut for Transaction<M> {
    fn deref_mut(&mut self) -> &mut M::Connection {
        &mut self.conn
    }
}

impl<M: ConnectionManager> fmt::Debug for Transaction<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.conn)
            .finish()
    }
}
