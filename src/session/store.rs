// Session store
// Single source of truth for authentication state, mutated only through
// login/refresh/logout transitions and read by the API client before every
// request.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use tokio::sync::RwLock;

use super::persist::SessionFile;
use super::types::{SessionSnapshot, User};

#[derive(Debug, Default, Clone)]
struct SessionState {
    access_token: Option<String>,
    refresh_token: Option<String>,
    authenticated: bool,
    user: Option<User>,
    error: Option<String>,
    expires_at: Option<DateTime<Utc>>,
}

/// Process-wide authentication state.
///
/// Invariant: `authenticated` is true only while an access token is present.
/// Every transition mutates the state inside a single write-lock critical
/// section; persistence happens after the lock is released, with the
/// in-memory state staying authoritative when a write fails.
pub struct SessionStore {
    state: RwLock<SessionState>,
    persist: Option<SessionFile>,
}

impl SessionStore {
    /// Create an empty, memory-only store
    pub fn new() -> Self {
        Self {
            state: RwLock::new(SessionState::default()),
            persist: None,
        }
    }

    /// Open a file-backed store, rehydrating the session when persisted
    /// tokens exist
    pub fn open(path: PathBuf) -> Result<Self> {
        let persist = SessionFile::new(path);

        let state = match persist.load()? {
            Some(stored) => {
                tracing::info!(
                    path = %persist.path().display(),
                    "Rehydrated session from persisted storage"
                );
                SessionState {
                    access_token: Some(stored.access_token),
                    refresh_token: stored.refresh_token,
                    authenticated: true,
                    user: stored.username.map(|username| User { username }),
                    error: None,
                    expires_at: None,
                }
            }
            None => SessionState::default(),
        };

        Ok(Self {
            state: RwLock::new(state),
            persist: Some(persist),
        })
    }

    /// Commit a successful login. No failure mode; pure assignment plus a
    /// best-effort persistence write.
    pub async fn login(
        &self,
        user: User,
        access_token: String,
        refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        {
            let mut state = self.state.write().await;
            state.access_token = Some(access_token.clone());
            state.refresh_token = refresh_token.clone();
            state.authenticated = true;
            state.user = Some(user.clone());
            state.error = None;
            state.expires_at = expires_at;
        }

        tracing::info!(username = %user.username, "Session established");
        self.persist_tokens(&access_token, refresh_token.as_deref(), Some(&user.username));
    }

    /// Replace the access token (and the refresh token when the server
    /// rotated it) after a successful refresh. The user and the authenticated
    /// flag are left untouched. Called only by the API client.
    pub async fn refresh(
        &self,
        new_access_token: String,
        new_refresh_token: Option<String>,
        expires_at: Option<DateTime<Utc>>,
    ) {
        {
            let mut state = self.state.write().await;
            state.access_token = Some(new_access_token.clone());
            if new_refresh_token.is_some() {
                state.refresh_token = new_refresh_token.clone();
            }
            state.error = None;
            state.expires_at = expires_at;
        }

        tracing::debug!("Session tokens refreshed");
        self.persist_tokens(&new_access_token, new_refresh_token.as_deref(), None);
    }

    /// Clear the session and purge persisted tokens. Idempotent.
    pub async fn logout(&self) {
        let was_authenticated = {
            let mut state = self.state.write().await;
            let was = state.authenticated;
            state.access_token = None;
            state.refresh_token = None;
            state.authenticated = false;
            state.user = None;
            state.expires_at = None;
            was
        };

        if was_authenticated {
            tracing::info!("Session cleared");
        }

        if let Some(ref persist) = self.persist {
            if let Err(e) = persist.clear() {
                tracing::warn!("Failed to purge persisted session: {:#}", e);
            }
        }
    }

    /// Current access token, or `None` when logged out
    pub async fn get_access_token(&self) -> Option<String> {
        self.state.read().await.access_token.clone()
    }

    /// Current refresh token, or `None` when absent
    pub async fn get_refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh_token.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.authenticated
    }

    pub async fn current_user(&self) -> Option<User> {
        self.state.read().await.user.clone()
    }

    /// Record the last auth-related failure. Cleared by login and refresh.
    pub async fn record_error(&self, message: &str) {
        let mut state = self.state.write().await;
        state.error = Some(message.to_string());
    }

    /// Point-in-time copy of the full session state
    pub async fn snapshot(&self) -> SessionSnapshot {
        let state = self.state.read().await;
        SessionSnapshot {
            access_token: state.access_token.clone(),
            refresh_token: state.refresh_token.clone(),
            authenticated: state.authenticated,
            user: state.user.clone(),
            error: state.error.clone(),
            expires_at: state.expires_at,
        }
    }

    fn persist_tokens(&self, access: &str, refresh: Option<&str>, username: Option<&str>) {
        if let Some(ref persist) = self.persist {
            if let Err(e) = persist.store(access, refresh, username) {
                tracing::warn!("Failed to persist session tokens: {:#}", e);
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_user() -> User {
        User {
            username: "alice".to_string(),
        }
    }

    #[tokio::test]
    async fn test_login_transition() {
        let store = SessionStore::new();
        assert!(!store.is_authenticated().await);
        assert!(store.get_access_token().await.is_none());

        store
            .login(test_user(), "A1".to_string(), Some("R1".to_string()), None)
            .await;

        assert!(store.is_authenticated().await);
        assert_eq!(store.get_access_token().await.as_deref(), Some("A1"));
        assert_eq!(store.get_refresh_token().await.as_deref(), Some("R1"));
        assert_eq!(store.current_user().await, Some(test_user()));
    }

    #[tokio::test]
    async fn test_refresh_keeps_user_and_authenticated() {
        let store = SessionStore::new();
        store
            .login(test_user(), "A1".to_string(), Some("R1".to_string()), None)
            .await;

        store.refresh("A2".to_string(), None, None).await;

        assert!(store.is_authenticated().await);
        assert_eq!(store.get_access_token().await.as_deref(), Some("A2"));
        // Refresh token kept when the server does not rotate it
        assert_eq!(store.get_refresh_token().await.as_deref(), Some("R1"));
        assert_eq!(store.current_user().await, Some(test_user()));
    }

    #[tokio::test]
    async fn test_refresh_rotates_refresh_token() {
        let store = SessionStore::new();
        store
            .login(test_user(), "A1".to_string(), Some("R1".to_string()), None)
            .await;

        store
            .refresh("A2".to_string(), Some("R2".to_string()), None)
            .await;

        assert_eq!(store.get_refresh_token().await.as_deref(), Some("R2"));
    }

    #[tokio::test]
    async fn test_logout_clears_everything() {
        let store = SessionStore::new();
        store
            .login(test_user(), "A1".to_string(), Some("R1".to_string()), None)
            .await;

        store.logout().await;

        assert!(!store.is_authenticated().await);
        assert!(store.get_access_token().await.is_none());
        assert!(store.get_refresh_token().await.is_none());
        assert!(store.current_user().await.is_none());

        // Idempotent: logging out again changes nothing observable
        store.logout().await;
        assert!(!store.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_error_cleared_on_refresh() {
        let store = SessionStore::new();
        store
            .login(test_user(), "A1".to_string(), Some("R1".to_string()), None)
            .await;

        store.record_error("refresh rejected").await;
        assert!(store.snapshot().await.error.is_some());

        store.refresh("A2".to_string(), None, None).await;
        assert!(store.snapshot().await.error.is_none());
    }

    #[tokio::test]
    async fn test_file_backed_rehydration_and_purge() {
        let path = std::env::temp_dir().join(format!("store-{}.db", uuid::Uuid::new_v4()));

        {
            let store = SessionStore::open(path.clone()).unwrap();
            assert!(!store.is_authenticated().await);
            store
                .login(test_user(), "A1".to_string(), Some("R1".to_string()), None)
                .await;
        }

        // Simulated process restart
        {
            let store = SessionStore::open(path.clone()).unwrap();
            assert!(store.is_authenticated().await);
            assert_eq!(store.get_access_token().await.as_deref(), Some("A1"));
            assert_eq!(store.current_user().await, Some(test_user()));

            store.logout().await;
        }

        // After logout nothing survives a restart
        {
            let store = SessionStore::open(path.clone()).unwrap();
            assert!(!store.is_authenticated().await);
            assert!(store.get_access_token().await.is_none());
        }

        let _ = std::fs::remove_file(path);
    }
}
