// Session module
// Exposes the session store, persisted token storage, and shared types

pub mod persist;
pub mod store;
pub mod types;

pub use store::SessionStore;
pub use types::{SessionSnapshot, StoredSession, TokenData, User};
