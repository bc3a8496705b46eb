//! OAuth token lifecycle
//!
//! Holds the credentials handed to the adapter and keeps the access token
//! fresh: expiry is checked with a safety buffer before every authenticated
//! call, and an expired (or about-to-expire) token is refreshed through the
//! vendor's token endpoint before the call goes out.

use std::sync::Mutex;

use chrono::{Duration, Utc};
use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use polysync_core::domain::errors::SyncError;
use polysync_core::domain::provider::ProviderCredentials;

/// Tokens expiring within this window are refreshed proactively
const EXPIRY_BUFFER_MINS: i64 = 5;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Lifetime in seconds
    expires_in: Option<i64>,
    /// Vendors may rotate the refresh token
    refresh_token: Option<String>,
}

struct TokenState {
    access_token: String,
    refresh_token: Option<String>,
    expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Manages access-token freshness for one adapter instance
pub struct TokenManager {
    token_url: Url,
    client_id: Option<String>,
    http: reqwest::Client,
    state: Mutex<TokenState>,
}

impl TokenManager {
    /// Builds a manager from validated credentials
    ///
    /// The caller has already checked `missing_fields()`; absent
    /// `access_token` here is a programmer error and surfaces as a
    /// configuration error.
    pub fn new(
        token_url: Url,
        credentials: &ProviderCredentials,
        http: reqwest::Client,
    ) -> Result<Self, SyncError> {
        let access_token = credentials
            .get("access_token")
            .ok_or_else(|| SyncError::Configuration("credentials lack access_token".into()))?
            .to_string();
        Ok(Self {
            token_url,
            client_id: credentials.get("client_id").map(str::to_string),
            http,
            state: Mutex::new(TokenState {
                access_token,
                refresh_token: credentials.get("refresh_token").map(str::to_string),
                expires_at: credentials.expires_at,
            }),
        })
    }

    /// Overrides the OAuth client id sent with refresh requests
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Returns a valid access token, refreshing first when the current one
    /// expires within the safety buffer
    pub async fn access_token(&self) -> Result<String, SyncError> {
        if self.needs_refresh() {
            debug!("Access token within expiry buffer, refreshing");
            self.refresh().await?;
        }
        Ok(self.state.lock().unwrap().access_token.clone())
    }

    /// Forces a refresh regardless of the recorded expiry
    ///
    /// Used after a 401: the vendor considers the token dead even if our
    /// clock says otherwise.
    pub async fn force_refresh(&self) -> Result<String, SyncError> {
        self.refresh().await?;
        Ok(self.state.lock().unwrap().access_token.clone())
    }

    fn needs_refresh(&self) -> bool {
        let state = self.state.lock().unwrap();
        match state.expires_at {
            Some(at) => at - Utc::now() < Duration::minutes(EXPIRY_BUFFER_MINS),
            None => false,
        }
    }

    async fn refresh(&self) -> Result<(), SyncError> {
        let (refresh_token, client_id) = {
            let state = self.state.lock().unwrap();
            (state.refresh_token.clone(), self.client_id.clone())
        };
        let refresh_token = refresh_token.ok_or_else(|| {
            SyncError::Authentication("access token expired and no refresh token held".into())
        })?;

        let mut form = vec![
            ("grant_type", "refresh_token".to_string()),
            ("refresh_token", refresh_token.clone()),
        ];
        if let Some(client_id) = client_id {
            form.push(("client_id", client_id));
        }

        let response = self
            .http
            .post(self.token_url.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() || e.is_timeout() {
                    SyncError::NoInternet
                } else {
                    SyncError::Authentication(format!("token refresh failed: {e}"))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(%status, "Token refresh rejected");
            return Err(SyncError::Authentication(format!(
                "token refresh rejected with {status}: {body}"
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| SyncError::Authentication(format!("malformed token response: {e}")))?;

        let mut state = self.state.lock().unwrap();
        state.access_token = tokens.access_token;
        state.expires_at = tokens
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
        if let Some(rotated) = tokens.refresh_token {
            state.refresh_token = Some(rotated);
        }
        info!("Access token refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polysync_core::domain::provider::CloudProvider;

    fn credentials(expiry_mins: i64) -> ProviderCredentials {
        ProviderCredentials::new(CloudProvider::GoogleDrive)
            .with_field("access_token", "tok-1")
            .with_field("refresh_token", "refresh-1")
            .with_expiry(Utc::now() + Duration::minutes(expiry_mins))
    }

    fn manager(expiry_mins: i64) -> TokenManager {
        TokenManager::new(
            Url::parse("https://auth.example/token").unwrap(),
            &credentials(expiry_mins),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_fresh_token_needs_no_refresh() {
        assert!(!manager(60).needs_refresh());
    }

    #[test]
    fn test_token_inside_buffer_needs_refresh() {
        assert!(manager(3).needs_refresh());
        assert!(manager(-10).needs_refresh());
    }

    #[test]
    fn test_token_without_expiry_never_refreshes_proactively() {
        let credentials = ProviderCredentials::new(CloudProvider::Dropbox)
            .with_field("access_token", "tok-static");
        let manager = TokenManager::new(
            Url::parse("https://auth.example/token").unwrap(),
            &credentials,
            reqwest::Client::new(),
        )
        .unwrap();
        assert!(!manager.needs_refresh());
    }
}
