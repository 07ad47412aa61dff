// Resilient API client
// Attaches the bearer credential to every outbound request and recovers from
// a single 401 per logical call via a coalesced token refresh.

use anyhow::{Context, Result as AnyResult};
use reqwest::header::HeaderMap;
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::Config;
use crate::error::ApiError;
use crate::identity::IdentityClient;
use crate::session::{SessionStore, User};

/// HTTP client for the storefront API.
///
/// Every call goes through [`request`](ApiClient::request), so the
/// 401-refresh contract applies uniformly. This is the only component that
/// calls [`SessionStore::refresh`].
pub struct ApiClient {
    /// Shared HTTP client with connection pooling
    client: Client,

    /// Base URL for business API resources
    base_url: String,

    /// Authentication state, injected by the caller
    session: Arc<SessionStore>,

    /// Identity server client for login/refresh/logout
    identity: IdentityClient,

    /// Single-flight gate: at most one refresh call is in flight at a time.
    /// Callers that arrive while a refresh is pending wait here and then
    /// adopt the already-refreshed token instead of starting their own.
    refresh_gate: Mutex<()>,
}

impl ApiClient {
    pub fn new(config: &Config, session: Arc<SessionStore>) -> AnyResult<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(config.max_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout))
            .timeout(Duration::from_secs(config.request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let identity = IdentityClient::new(client.clone(), config.identity_url.clone());

        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session,
            identity,
            refresh_gate: Mutex::new(()),
        })
    }

    /// Perform a request against the storefront API.
    ///
    /// Behavior per logical call:
    /// - the current access token is attached as `Authorization: Bearer`;
    /// - a first 401 triggers exactly one refresh and one retry with the new
    ///   token;
    /// - a 401 on the retried attempt fails with `Unauthenticated` without a
    ///   second refresh;
    /// - transport failures surface as `Network` and are never retried here;
    /// - every other status passes through as `Ok(response)` untouched.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        headers: Option<&HeaderMap>,
    ) -> Result<Response, ApiError> {
        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let request_id = Uuid::new_v4();
        let mut token = self.session.get_access_token().await;
        let mut attempt: u8 = 0;

        loop {
            tracing::debug!(
                request_id = %request_id,
                method = %method,
                url = %url,
                attempt = attempt + 1,
                authenticated = token.is_some(),
                "Sending API request"
            );

            let response = self
                .dispatch(&method, &url, body, headers, token.as_deref())
                .await?;

            let status = response.status();
            if status != StatusCode::UNAUTHORIZED {
                tracing::debug!(
                    request_id = %request_id,
                    status = status.as_u16(),
                    "Received API response"
                );
                return Ok(response);
            }

            if attempt > 0 {
                // The freshly minted token was rejected too; a second refresh
                // would loop forever
                tracing::warn!(
                    request_id = %request_id,
                    "Retried request was rejected again, giving up"
                );
                return Err(ApiError::Unauthenticated(
                    "access token rejected after refresh".to_string(),
                ));
            }

            tracing::debug!(
                request_id = %request_id,
                "Received 401, attempting token refresh"
            );
            attempt += 1;
            token = Some(self.refresh_session(token.as_deref()).await?);
        }
    }

    /// GET a JSON resource, classifying non-success statuses
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let response = self.request(Method::GET, path, None, None).await?;
        read_json(response).await
    }

    /// POST a JSON body and decode the JSON response
    pub async fn post_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, ApiError> {
        let response = self.request(Method::POST, path, Some(body), None).await?;
        read_json(response).await
    }

    /// PUT a JSON body and decode the JSON response
    pub async fn put_json<T: DeserializeOwned>(
        &self,
        path: &str,
        body: &Value,
    ) -> Result<T, ApiError> {
        let response = self.request(Method::PUT, path, Some(body), None).await?;
        read_json(response).await
    }

    /// DELETE a resource, discarding the response body
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        let response = self.request(Method::DELETE, path, None, None).await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status.as_u16(), body))
        }
    }

    /// Log in against the identity server and commit the session
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        let (resolved_username, tokens) = self.identity.login(username, password).await?;
        let user = User {
            username: resolved_username,
        };

        self.session
            .login(
                user.clone(),
                tokens.access_token,
                tokens.refresh_token,
                tokens.expires_at,
            )
            .await;

        Ok(user)
    }

    /// Log out: best-effort server-side invalidation, then clear the store
    pub async fn logout(&self) {
        if let Some(token) = self.session.get_access_token().await {
            self.identity.logout(&token).await;
        }
        self.session.logout().await;
    }

    /// The session store this client coordinates with
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    /// Build and send one attempt. The request is rebuilt from its parts for
    /// every attempt, so no shared request object is ever mutated.
    async fn dispatch(
        &self,
        method: &Method,
        url: &str,
        body: Option<&Value>,
        headers: Option<&HeaderMap>,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut builder = self.client.request(method.clone(), url);

        if let Some(headers) = headers {
            builder = builder.headers(headers.clone());
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        builder.send().await.map_err(ApiError::from_transport)
    }

    /// Handle a 401: coalesce concurrent refreshes and return the token the
    /// retried attempt should use.
    ///
    /// `stale_token` is the token the failed attempt carried. Holding the
    /// gate, the current store token is compared against it: a difference
    /// means another caller already refreshed while this one waited, so the
    /// current token is adopted without a second refresh call.
    async fn refresh_session(&self, stale_token: Option<&str>) -> Result<String, ApiError> {
        let _flight = self.refresh_gate.lock().await;

        if let Some(current) = self.session.get_access_token().await {
            if stale_token != Some(current.as_str()) {
                tracing::debug!("Adopting token refreshed by a concurrent caller");
                return Ok(current);
            }
        }

        let refresh_token = match self.session.get_refresh_token().await {
            Some(token) => token,
            None => {
                let message = "no refresh token available; please log in again";
                self.session.record_error(message).await;
                self.session.logout().await;
                return Err(ApiError::Unauthenticated(message.to_string()));
            }
        };

        match self.identity.refresh(&refresh_token).await {
            Ok(tokens) => {
                let access_token = tokens.access_token.clone();
                self.session
                    .refresh(tokens.access_token, tokens.refresh_token, tokens.expires_at)
                    .await;
                Ok(access_token)
            }
            Err(err) if err.is_auth_failure() => {
                self.session.record_error(&err.to_string()).await;
                self.session.logout().await;
                Err(err)
            }
            // Transport failure while refreshing: the refresh token was not
            // rejected, so the session is left untouched
            Err(err) => Err(err),
        }
    }
}

async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ApiError::from_status(status.as_u16(), body));
    }

    response
        .json()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to decode response body: {}", e)))
}
