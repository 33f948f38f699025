//! Driver seam for the connection pool.

use std::future::Future;

/// Opens connections and drives their transactions.
///
/// This is the only piece a database driver has to provide; pooling,
/// limits, lifecycle and transaction scoping live in
/// [`Database`](super::Database).
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a ConnectionManager",
    label = "missing `ConnectionManager` implementation",
    note = "Implement `connect`, `begin`, `commit` and `rollback` for your driver."
)]
pub trait ConnectionManager: Send + Sync + 'static {
    /// A live connection.
    type Connection: Send + 'static;

    /// The driver's error type.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new connection.
    fn connect(&self, url: &str) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send;

    /// Start a transaction on `conn`.
    fn begin(&self, conn: &mut Self::Connection) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Commit the open transaction on `conn`.
    fn commit(&self, conn: &mut Self::Connection) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Roll back the open transaction on `conn`.
    fn rollback(&self, conn: &mut Self::Connection) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Whether `conn` may be handed out again.
    fn is_valid(&self, _conn: &Self::Connection) -> bool {
        true
    }

    /// Close `conn`. The default drops it.
    fn close(&self, conn: Self::Connection) -> impl Future<Output = ()> + Send {
        async move { drop(conn) }
    }
}
