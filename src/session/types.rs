// Session types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimal identity attached to a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

/// Immutable point-in-time copy of the session state
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub authenticated: bool,
    pub user: Option<User>,
    pub error: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Token data extracted from an identity server response
#[derive(Debug, Clone)]
pub struct TokenData {
    pub access_token: String,
    /// Present only when the server rotates the refresh token
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Persisted session shape loaded from disk at startup
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub username: Option<String>,
}
