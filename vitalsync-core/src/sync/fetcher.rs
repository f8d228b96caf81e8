//! HTTP client for the provider (wearable platform) API.
//!
//! One `fetch` call per endpoint per sync attempt. The executor treats the
//! fetcher as a black box that returns dated records or a classified
//! failure; tests swap in scripted fakes.

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::types::{Endpoint, EndpointError, SyncErrorType};
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use reqwest::StatusCode;
use std::time::Duration;

/// One dated record returned by an endpoint.
#[derive(Debug, Clone)]
pub struct EndpointRecord {
    pub date: NaiveDate,
    pub payload: serde_json::Value,
}

/// Performs one upstream call for one data type.
#[async_trait]
pub trait EndpointFetcher: Send + Sync {
    /// Fetch records for `endpoint` from `since` onward.
    ///
    /// Failures come back pre-classified; the executor records them
    /// per-endpoint and never lets them abort the enclosing sync.
    async fn fetch(
        &self,
        endpoint: Endpoint,
        user_id: &str,
        token: &str,
        since: NaiveDate,
    ) -> std::result::Result<Vec<EndpointRecord>, EndpointError>;
}

/// `reqwest`-backed fetcher against the real provider API.
pub struct ProviderClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl ProviderClient {
    /// Create a new client from configuration.
    ///
    /// Returns an error if the configuration is invalid or missing required fields.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;

        let base_url = config
            .base_url
            .clone()
            .ok_or_else(|| Error::Config("provider.base_url is required".to_string()))?
            .trim_end_matches('/')
            .to_string();

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.endpoint_timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Provider(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn endpoint_url(&self, endpoint: Endpoint, user_id: &str, since: NaiveDate) -> String {
        format!(
            "{}/users/{}/{}?since={}",
            self.base_url,
            urlencoding::encode(user_id),
            endpoint.api_path(),
            since
        )
    }
}

#[async_trait]
impl EndpointFetcher for ProviderClient {
    async fn fetch(
        &self,
        endpoint: Endpoint,
        user_id: &str,
        token: &str,
        since: NaiveDate,
    ) -> std::result::Result<Vec<EndpointRecord>, EndpointError> {
        let url = self.endpoint_url(endpoint, user_id, since);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| classify_transport_error(endpoint, &e))?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(classify_status_error(endpoint, status, retry_after, &body));
        }

        let values: Vec<serde_json::Value> = response.json().await.map_err(|e| EndpointError {
            error_type: SyncErrorType::InvalidResponse,
            message: format!("{}: failed to parse response: {}", endpoint, e),
        })?;

        values
            .into_iter()
            .map(|payload| {
                let date = payload
                    .get("date")
                    .and_then(|d| d.as_str())
                    .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
                    .ok_or_else(|| EndpointError {
                        error_type: SyncErrorType::InvalidResponse,
                        message: format!("{}: record missing a parseable date", endpoint),
                    })?;
                Ok(EndpointRecord { date, payload })
            })
            .collect()
    }
}

/// Classify a transport-level reqwest failure.
fn classify_transport_error(endpoint: Endpoint, error: &reqwest::Error) -> EndpointError {
    if error.is_timeout() {
        EndpointError {
            error_type: SyncErrorType::ApiTimeout,
            message: format!("{}: request timed out", endpoint),
        }
    } else if error.is_connect() {
        EndpointError {
            error_type: SyncErrorType::ApiUnavailable,
            message: format!("{}: failed to connect to provider API: {}", endpoint, error),
        }
    } else {
        EndpointError {
            error_type: SyncErrorType::ApiError,
            message: format!("{}: request failed: {}", endpoint, error),
        }
    }
}

/// Classify an HTTP status failure.
///
/// 401 bodies distinguish expired vs revoked vs malformed tokens; 403 is a
/// per-data-type consent revocation; 429 splits into the short or long
/// window based on Retry-After.
fn classify_status_error(
    endpoint: Endpoint,
    status: StatusCode,
    retry_after: Option<u64>,
    body: &str,
) -> EndpointError {
    let body_lower = body.to_lowercase();
    let (error_type, message) = match status {
        StatusCode::UNAUTHORIZED => {
            if body_lower.contains("expired") {
                (
                    SyncErrorType::TokenExpired,
                    format!("{}: access token has expired, refresh required", endpoint),
                )
            } else if body_lower.contains("revoked") {
                (
                    SyncErrorType::TokenRevoked,
                    format!("{}: access was revoked, re-authentication required", endpoint),
                )
            } else {
                (
                    SyncErrorType::TokenInvalid,
                    format!("{}: access token rejected, re-authentication required", endpoint),
                )
            }
        }
        StatusCode::FORBIDDEN => (
            SyncErrorType::TokenRevoked,
            format!(
                "{}: data sharing consent not granted for this data type",
                endpoint
            ),
        ),
        StatusCode::TOO_MANY_REQUESTS => {
            // Anything longer than one short window means the daily budget.
            if retry_after.unwrap_or(0) > 900 {
                (
                    SyncErrorType::RateLimitedLong,
                    format!("{}: provider 24-hour rate limit hit", endpoint),
                )
            } else {
                (
                    SyncErrorType::RateLimitedShort,
                    format!("{}: provider short-window rate limit hit", endpoint),
                )
            }
        }
        s if s.is_server_error() => (
            SyncErrorType::ApiUnavailable,
            format!("{}: provider API unavailable ({})", endpoint, s),
        ),
        s => (
            SyncErrorType::ApiError,
            format!("{}: provider API error ({})", endpoint, s),
        ),
    };

    EndpointError {
        error_type,
        message,
    }
}
