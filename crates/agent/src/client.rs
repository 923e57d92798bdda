//! HTTP client for the backend queue surface.
//!
//! A 409 on begin/report is data, not an error: it means the claim of record
//! moved on (lease expired and was swept, or a duplicate report landed
//! first). Transport faults are transient and feed the loop's backoff.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use totem_core::{AttemptOutcome, AttemptToken, JobId, TerminalId};
use totem_queue::ClaimedJob;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Backend unreachable or answered garbage; retry with backoff.
    #[error("transport error: {0}")]
    Transport(String),

    /// Credential rejected; retrying with the same token cannot help.
    #[error("unauthorized")]
    Unauthorized,

    /// The backend answered with something outside the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Queue operations the polling loop needs; implemented over HTTP in
/// production and in-process in tests.
#[async_trait]
pub trait QueueApi: Send + Sync {
    async fn claim_next(&self, lease: Duration) -> Result<Option<ClaimedJob>, ClientError>;

    /// Returns `false` when the backend rejects the token as stale.
    async fn begin(&self, job_id: JobId, token: AttemptToken) -> Result<bool, ClientError>;

    /// Returns `false` when the backend rejects the token as stale.
    async fn report(
        &self,
        job_id: JobId,
        token: AttemptToken,
        outcome: AttemptOutcome,
    ) -> Result<bool, ClientError>;
}

#[async_trait]
impl<T: QueueApi + ?Sized> QueueApi for std::sync::Arc<T> {
    async fn claim_next(&self, lease: Duration) -> Result<Option<ClaimedJob>, ClientError> {
        (**self).claim_next(lease).await
    }

    async fn begin(&self, job_id: JobId, token: AttemptToken) -> Result<bool, ClientError> {
        (**self).begin(job_id, token).await
    }

    async fn report(
        &self,
        job_id: JobId,
        token: AttemptToken,
        outcome: AttemptOutcome,
    ) -> Result<bool, ClientError> {
        (**self).report(job_id, token, outcome).await
    }
}

#[derive(Debug, Serialize)]
struct ClaimBody<'a> {
    terminal_id: &'a TerminalId,
    lease_duration_ms: u64,
}

#[derive(Debug, Serialize)]
struct BeginBody {
    attempt_token: AttemptToken,
}

#[derive(Debug, Serialize)]
struct ReportBody {
    attempt_token: AttemptToken,
    #[serde(flatten)]
    outcome: AttemptOutcome,
}

#[derive(Debug, Clone)]
pub struct HttpQueueClient {
    http: reqwest::Client,
    base_url: String,
    terminal_id: TerminalId,
    bearer: String,
}

impl HttpQueueClient {
    pub fn new(
        base_url: impl Into<String>,
        terminal_id: TerminalId,
        bearer: impl Into<String>,
    ) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            terminal_id,
            bearer: bearer.into(),
        })
    }

    async fn post_ack(&self, url: String, body: impl Serialize) -> Result<bool, ClientError> {
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::OK => Ok(true),
            reqwest::StatusCode::CONFLICT => Ok(false),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(ClientError::Unauthorized)
            }
            status => Err(ClientError::Protocol(format!(
                "unexpected status {status} from {url}"
            ))),
        }
    }
}

#[async_trait]
impl QueueApi for HttpQueueClient {
    async fn claim_next(&self, lease: Duration) -> Result<Option<ClaimedJob>, ClientError> {
        let url = format!("{}/queue/claim", self.base_url);
        let body = ClaimBody {
            terminal_id: &self.terminal_id,
            lease_duration_ms: lease.as_millis() as u64,
        };

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.bearer)
            .json(&body)
            .send()
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        match response.status() {
            reqwest::StatusCode::OK => {
                let job: ClaimedJob = response
                    .json()
                    .await
                    .map_err(|e| ClientError::Protocol(e.to_string()))?;
                Ok(Some(job))
            }
            reqwest::StatusCode::NO_CONTENT => Ok(None),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
                Err(ClientError::Unauthorized)
            }
            status => Err(ClientError::Protocol(format!(
                "unexpected status {status} from {url}"
            ))),
        }
    }

    async fn begin(&self, job_id: JobId, token: AttemptToken) -> Result<bool, ClientError> {
        let url = format!("{}/queue/{}/begin", self.base_url, job_id);
        self.post_ack(url, BeginBody { attempt_token: token }).await
    }

    async fn report(
        &self,
        job_id: JobId,
        token: AttemptToken,
        outcome: AttemptOutcome,
    ) -> Result<bool, ClientError> {
        let url = format!("{}/queue/{}/report", self.base_url, job_id);
        self.post_ack(
            url,
            ReportBody {
                attempt_token: token,
                outcome,
            },
        )
        .await
    }
}
