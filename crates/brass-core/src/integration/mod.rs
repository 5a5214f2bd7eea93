//! Integration layer - collaborator interfaces.
//!
//! - The protocol connection events arrive on ([`Connection`])
//! - The persistent store handed to handlers ([`StoreProvider`], [`StoreSession`])

pub mod connection;
pub mod store;

pub use connection::{BoxedConnection, Connection, ConnectionConfig};
pub use store::{
    BoxedStoreProvider, BoxedStoreSession, StoreProvider, StoreSession, downcast_session,
};
