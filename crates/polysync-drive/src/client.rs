//! Authenticated HTTP client for the Drive REST API
//!
//! Wraps `reqwest::Client` with bearer-token injection, a single automatic
//! retry after a 401 (behind a forced token refresh), and the mapping from
//! HTTP statuses to the [`SyncError`] taxonomy. Expected absences (404) are
//! not errors at this layer; callers turn them into `Ok(None)`/`Ok(false)`.

use std::sync::Arc;

use reqwest::{RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};
use url::Url;

use polysync_core::domain::errors::SyncError;

use crate::auth::TokenManager;

/// HTTP client bound to one API base URL and one token manager
pub struct DriveClient {
    http: reqwest::Client,
    base: Url,
    auth: Arc<TokenManager>,
}

impl DriveClient {
    pub fn new(base: Url, auth: Arc<TokenManager>, http: reqwest::Client) -> Self {
        Self { http, base, auth }
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Builds an endpoint URL under the API base
    pub fn endpoint(&self, path: &str, query: &[(&str, &str)]) -> Result<Url, SyncError> {
        let mut url = self
            .base
            .join(path)
            .map_err(|e| SyncError::Configuration(format!("bad endpoint {path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    /// Sends an authenticated request, retrying once after a 401
    ///
    /// `build` constructs the request from the shared client; it runs a
    /// second time when the first attempt comes back 401 and the token
    /// refresh succeeds.
    pub async fn send<F>(&self, build: F) -> Result<Response, SyncError>
    where
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let token = self.auth.access_token().await?;
        let response = build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(map_transport)?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // The vendor rejected a token our clock considered valid; refresh
        // and retry exactly once
        debug!("Request returned 401, refreshing token and retrying");
        let token = self.auth.force_refresh().await?;
        build(&self.http)
            .bearer_auth(&token)
            .send()
            .await
            .map_err(map_transport)
    }

    /// Consumes an error response into the matching [`SyncError`]
    pub async fn error_from(response: Response) -> SyncError {
        let status = response.status();
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.unwrap_or_default();
        warn!(%status, "API request failed");
        error_for_status(status, &body, retry_after.as_deref())
    }

    /// Passes through success responses, mapping everything else
    pub async fn expect_success(response: Response) -> Result<Response, SyncError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(Self::error_from(response).await)
        }
    }
}

/// Maps an HTTP status to the error taxonomy
pub fn error_for_status(status: StatusCode, body: &str, retry_after: Option<&str>) -> SyncError {
    match status {
        StatusCode::UNAUTHORIZED => {
            SyncError::Authentication("credentials rejected by the provider".to_string())
        }
        StatusCode::FORBIDDEN => {
            let lowered = body.to_lowercase();
            if lowered.contains("quota") || lowered.contains("storage") {
                SyncError::QuotaExceeded(body.to_string())
            } else {
                SyncError::Provider(format!("forbidden: {body}"))
            }
        }
        StatusCode::TOO_MANY_REQUESTS => SyncError::RateLimited(match retry_after {
            Some(after) => format!("retry after {after}s"),
            None => "retry later".to_string(),
        }),
        s if s.is_server_error() => SyncError::Provider(format!("server error {s}: {body}")),
        s => SyncError::Provider(format!("unexpected status {s}: {body}")),
    }
}

/// Maps reqwest transport failures to connectivity or provider errors
pub fn map_transport(e: reqwest::Error) -> SyncError {
    if e.is_connect() || e.is_timeout() {
        SyncError::NoInternet
    } else {
        SyncError::Provider(format!("transport error: {e}"))
    }
}
