//! Remote Sync Client
//!
//! Sends merged profile text to the parse endpoint and returns the structured
//! profile.
//!
//! **Retry Strategy:**
//! - Up to 3 attempts per request
//! - 429, 5xx and network failures wait 1s, 2s, … then retry
//! - 401 rotates the device token and retries once immediately; a second 401
//!   is final
//! - Other statuses and undecodable 2xx bodies are final
//! - Cancellation during a request or a backoff wait is final and never retried

use crate::error::{ImportError, ImportResult};
use crate::services::device_token::DeviceTokenProvider;
use crate::utils::{or_cancel, sleep_or_cancel, RetryPolicy};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Path of the parse endpoint, relative to the base URL
pub const PARSE_PATH: &str = "/v1/profile/parse";

/// Accepted length of the submitted text, in characters (after trimming)
pub const MIN_TEXT_CHARS: usize = 10;
pub const MAX_TEXT_CHARS: usize = 10_000;

const USER_AGENT: &str = concat!("pfi-ingest/", env!("CARGO_PKG_VERSION"));

/// Longest raw body kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Outbound parse request
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParseProfileRequest {
    #[serde(rename = "ocrText")]
    ocr_text: String,
}

impl ParseProfileRequest {
    /// Build a request from merged text
    ///
    /// # Errors
    /// `InvalidRequest` when the trimmed text is shorter than
    /// [`MIN_TEXT_CHARS`] or longer than [`MAX_TEXT_CHARS`].
    pub fn new(text: &str) -> ImportResult<Self> {
        let trimmed = text.trim();
        let chars = trimmed.chars().count();

        if chars < MIN_TEXT_CHARS {
            return Err(ImportError::InvalidRequest(format!(
                "text too short ({} chars, minimum {})",
                chars, MIN_TEXT_CHARS
            )));
        }
        if chars > MAX_TEXT_CHARS {
            return Err(ImportError::InvalidRequest(format!(
                "text too long ({} chars, maximum {})",
                chars, MAX_TEXT_CHARS
            )));
        }

        Ok(Self {
            ocr_text: trimmed.to_string(),
        })
    }

    pub fn text(&self) -> &str {
        &self.ocr_text
    }
}

/// One prompt/answer pair from a dating profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilePrompt {
    pub question: Option<String>,
    pub answer: Option<String>,
}

/// Structured profile returned by the parse endpoint
///
/// Every field is optional; absent fields decode to `None` or empty lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParsedProfile {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub location: Option<String>,
    pub occupation: Option<String>,
    pub education: Option<String>,
    pub height: Option<String>,
    pub bio: Option<String>,
    pub interests: Vec<String>,
    pub prompts: Vec<ProfilePrompt>,
    pub languages: Vec<String>,
}

/// Connection settings for [`ProfileParseClient`]
#[derive(Debug, Clone, PartialEq)]
pub struct ParseClientConfig {
    pub base_url: String,
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    pub retry: RetryPolicy,
}

impl ParseClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry: RetryPolicy::default(),
        }
    }

    pub fn endpoint(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), PARSE_PATH)
    }
}

/// Parse endpoint client
pub struct ProfileParseClient {
    http_client: reqwest::Client,
    endpoint: String,
    tokens: Arc<DeviceTokenProvider>,
    retry: RetryPolicy,
}

impl ProfileParseClient {
    /// Create new parse client
    pub fn new(config: ParseClientConfig, tokens: Arc<DeviceTokenProvider>) -> ImportResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| ImportError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: config.endpoint(),
            tokens,
            retry: config.retry,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Validate `text` and submit it
    pub async fn parse_text(
        &self,
        text: &str,
        cancel_token: &CancellationToken,
    ) -> ImportResult<ParsedProfile> {
        let request = ParseProfileRequest::new(text)?;
        self.parse_profile(&request, cancel_token).await
    }

    /// Submit a parse request, retrying per the client's policy
    ///
    /// Produces exactly one outcome: the decoded profile or one typed error.
    /// The immediate retry after a token rotation counts against the attempt
    /// budget like any other attempt, without a backoff wait.
    pub async fn parse_profile(
        &self,
        request: &ParseProfileRequest,
        cancel_token: &CancellationToken,
    ) -> ImportResult<ParsedProfile> {
        let mut token = or_cancel(self.tokens.token(), cancel_token).await?;
        let mut rotated = false;
        let mut attempt: u32 = 0;

        loop {
            if cancel_token.is_cancelled() {
                return Err(ImportError::Cancelled);
            }

            debug!(attempt, endpoint = %self.endpoint, "Sending parse request");

            let error = match or_cancel(self.send_once(request, &token), cancel_token).await {
                Ok(profile) => {
                    info!(attempt, "Profile parsed");
                    return Ok(profile);
                }
                Err(e) => e,
            };

            match error {
                ImportError::Unauthorized => {
                    warn!(attempt, "Parse request unauthorized, rotating device token");
                    token = or_cancel(self.tokens.rotate(&token), cancel_token).await?;
                    if rotated || !self.retry.has_attempts_after(attempt) {
                        return Err(ImportError::Unauthorized);
                    }
                    rotated = true;
                    attempt += 1;
                }
                e if e.is_transient() && self.retry.has_attempts_after(attempt) => {
                    let delay = self.retry.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient parse failure, retrying"
                    );
                    sleep_or_cancel(delay, cancel_token).await?;
                    attempt += 1;
                }
                e => {
                    if !e.is_cancelled() {
                        warn!(attempt, error = %e, "Parse request failed");
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One round trip, classified into the error taxonomy
    async fn send_once(
        &self,
        request: &ParseProfileRequest,
        token: &str,
    ) -> ImportResult<ParsedProfile> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        classify_response(status, body)
    }
}

/// Map a status and body onto a profile or a typed error
fn classify_response(status: StatusCode, body: String) -> ImportResult<ParsedProfile> {
    if status.is_success() {
        return serde_json::from_str(&body).map_err(|e| ImportError::DecodingError {
            cause: e.to_string(),
            raw_body: body,
        });
    }

    match status {
        StatusCode::UNAUTHORIZED => Err(ImportError::Unauthorized),
        s if s.is_server_error() => Err(ImportError::ServerError(
            error_message(&body).unwrap_or_else(|| format!("HTTP {}", s.as_u16())),
        )),
        s => Err(ImportError::HttpError(s.as_u16())),
    }
}

/// Message from `{"error": "..."}`, `{"error": {"message": "..."}}`,
/// `{"message": "..."}` or a short plain-text body
fn error_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(trimmed) {
        let message = value
            .get("error")
            .and_then(|e| e.as_str().or_else(|| e.get("message").and_then(|m| m.as_str())))
            .or_else(|| value.get("message").and_then(|m| m.as_str()));
        return message.map(str::to_string);
    }

    Some(trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect())
}
