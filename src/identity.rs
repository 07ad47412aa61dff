// Identity server client
// Wire calls for login, token refresh, and best-effort logout

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::session::TokenData;

/// Token request for username/password login
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// Refresh request carrying the long-lived credential
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Token response returned by both `/token` and `/token/refresh`
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_token: String,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
    username: Option<String>,
}

/// Client for the identity server endpoints.
///
/// Only the storefront `ApiClient` drives the refresh path; login and logout
/// are orchestrated through it as well so session mutations stay in one
/// place.
pub struct IdentityClient {
    client: Client,
    base_url: String,
}

impl IdentityClient {
    pub fn new(client: Client, base_url: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Exchange username/password for a token pair.
    ///
    /// A 401 from the identity server means the credentials were rejected;
    /// other error statuses are classified through the usual taxonomy.
    pub async fn login(
        &self,
        username: &str,
        password: &str,
    ) -> Result<(String, TokenData), ApiError> {
        tracing::debug!(username = %username, "Requesting token pair from identity server");

        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .json(&TokenRequest { username, password })
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Unauthenticated(format!(
                "invalid credentials: {}",
                body
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status(status.as_u16(), body));
        }

        let (tokens, reported_username) = parse_token_response(response).await?;
        let resolved = reported_username.unwrap_or_else(|| username.to_string());
        Ok((resolved, tokens))
    }

    /// Mint a new access token from a refresh token.
    ///
    /// Any error status is a rejection of the refresh token and surfaces as
    /// `RefreshFailed`; the caller forces a logout on that path. Transport
    /// failures stay `Network` errors and leave the session alone.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenData, ApiError> {
        tracing::debug!("Requesting access token refresh from identity server");

        let response = self
            .client
            .post(format!("{}/token/refresh", self.base_url))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(ApiError::from_transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "Token refresh rejected");
            return Err(ApiError::RefreshFailed(format!("{} - {}", status, body)));
        }

        let (tokens, _) = parse_token_response(response).await?;
        tracing::info!(
            expires_at = ?tokens.expires_at,
            "Access token refreshed"
        );
        Ok(tokens)
    }

    /// Invalidate the session server-side. Best effort: failures are logged
    /// and swallowed, the local logout proceeds regardless.
    pub async fn logout(&self, access_token: &str) {
        let result = self
            .client
            .post(format!("{}/logout", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await;

        match result {
            Ok(response) if !response.status().is_success() => {
                tracing::debug!(
                    status = response.status().as_u16(),
                    "Server-side logout returned an error status"
                );
            }
            Err(e) => {
                tracing::debug!("Server-side logout failed: {}", e);
            }
            _ => {}
        }
    }
}

async fn parse_token_response(
    response: reqwest::Response,
) -> Result<(TokenData, Option<String>), ApiError> {
    let data: TokenResponse = response
        .json()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("Failed to parse token response: {}", e)))?;

    if data.access_token.is_empty() {
        return Err(ApiError::Internal(anyhow::anyhow!(
            "Token response does not contain accessToken"
        )));
    }

    // Expiration with a safety buffer so the token is treated as stale
    // slightly before the server does
    let expires_at = data
        .expires_in
        .map(|secs| Utc::now() + Duration::seconds(secs as i64 - 60));

    Ok((
        TokenData {
            access_token: data.access_token,
            refresh_token: data.refresh_token,
            expires_at,
        },
        data.username,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_request_wire_casing() {
        let body = serde_json::to_value(RefreshRequest {
            refresh_token: "R1",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "refreshToken": "R1" }));
    }

    #[test]
    fn test_token_response_parsing() {
        let data: TokenResponse = serde_json::from_value(serde_json::json!({
            "accessToken": "A1",
            "refreshToken": "R1",
            "expiresIn": 900,
            "username": "alice"
        }))
        .unwrap();

        assert_eq!(data.access_token, "A1");
        assert_eq!(data.refresh_token.as_deref(), Some("R1"));
        assert_eq!(data.expires_in, Some(900));
        assert_eq!(data.username.as_deref(), Some("alice"));
    }

    #[test]
    fn test_token_response_minimal() {
        // Refresh responses may omit everything but the access token
        let data: TokenResponse =
            serde_json::from_value(serde_json::json!({ "accessToken": "A2" })).unwrap();

        assert_eq!(data.access_token, "A2");
        assert!(data.refresh_token.is_none());
        assert!(data.expires_in.is_none());
    }
}
