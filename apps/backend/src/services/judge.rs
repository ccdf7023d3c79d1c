//! External judgment service boundary.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::AppError;
use crate::errors::ErrorCode;

pub const FALLBACK_COMMENTARY: &str = "The god is silent this round.";

/// Score and commentary for one composed sentence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub score: i32,
    pub commentary: String,
    #[serde(default)]
    pub fallback: bool,
}

impl Verdict {
    /// Neutral result used whenever the judge cannot answer.
    pub fn fallback() -> Self {
        Self {
            score: 0,
            commentary: FALLBACK_COMMENTARY.to_string(),
            fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JudgeRequest {
    pub sentence: String,
    pub personality: String,
    pub prompt: String,
}

#[async_trait]
pub trait JudgeClient: Send + Sync {
    async fn judge(&self, request: &JudgeRequest) -> Result<Verdict, AppError>;
}

/// Call `client` with a deadline. Any failure or timeout yields the
/// fallback verdict.
pub async fn judge_with_fallback(
    client: &dyn JudgeClient,
    request: &JudgeRequest,
    timeout: Duration,
) -> Verdict {
    match tokio::time::timeout(timeout, client.judge(request)).await {
        Ok(Ok(verdict)) => verdict,
        Ok(Err(err)) => {
            warn!(error = %err, "judge call failed, using fallback verdict");
            Verdict::fallback()
        }
        Err(_) => {
            warn!(timeout_ms = timeout.as_millis() as u64, "judge call timed out, using fallback verdict");
            Verdict::fallback()
        }
    }
}

/// Used when no judge endpoint is configured.
pub struct NeutralJudge;

#[async_trait]
impl JudgeClient for NeutralJudge {
    async fn judge(&self, _request: &JudgeRequest) -> Result<Verdict, AppError> {
        Ok(Verdict::fallback())
    }
}

#[derive(Deserialize)]
struct JudgeResponse {
    score: i32,
    commentary: String,
}

/// JSON-over-HTTP judge.
pub struct HttpJudge {
    client: reqwest::Client,
    url: String,
}

impl HttpJudge {
    pub fn new(url: impl Into<String>) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| AppError::config("Failed to build judge HTTP client", err))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl JudgeClient for HttpJudge {
    async fn judge(&self, request: &JudgeRequest) -> Result<Verdict, AppError> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| AppError::internal(ErrorCode::InternalError, "Judge request failed", err))?;
        let body: JudgeResponse = response.json().await.map_err(|err| {
            AppError::internal(ErrorCode::InternalError, "Judge response was not valid JSON", err)
        })?;
        Ok(Verdict {
            score: body.score,
            commentary: body.commentary,
            fallback: false,
        })
    }
}
