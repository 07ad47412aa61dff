// Storefront client - library root

pub mod client;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;

pub use client::ApiClient;
pub use config::Config;
pub use error::ApiError;
pub use session::SessionStore;
