//! Persistent-store collaborator traits.
//!
//! Handlers that declare the reserved `db` input receive a fresh
//! [`StoreSession`] for the duration of one call. The engine opens it from
//! the configured [`StoreProvider`] and closes it on every exit path.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StoreResult;

/// One exclusive session against the persistent store.
#[async_trait]
pub trait StoreSession: Any + Send + Sync {
    /// Releases the session. Called exactly once by the engine.
    async fn close(&self) -> StoreResult<()>;

    /// Returns self as `Any` so handlers can reach the concrete session type.
    fn as_any(&self) -> &dyn Any;
}

/// A shared store session trait object.
pub type BoxedStoreSession = Arc<dyn StoreSession>;

/// Factory for store sessions.
#[async_trait]
pub trait StoreProvider: Send + Sync {
    /// Opens a new, unshared session.
    async fn open(&self) -> StoreResult<BoxedStoreSession>;
}

/// A shared store provider trait object.
pub type BoxedStoreProvider = Arc<dyn StoreProvider>;

/// Attempts to view a session as a concrete type.
///
/// # Example
///
/// ```rust,ignore
/// let session: BoxedStoreSession = provider.open().await?;
/// if let Some(sqlite) = downcast_session::<SqliteSession>(&session) {
///     sqlite.execute("SELECT 1")?;
/// }
/// ```
pub fn downcast_session<T: StoreSession>(session: &BoxedStoreSession) -> Option<&T> {
    session.as_any().downcast_ref::<T>()
}
