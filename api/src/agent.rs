use std::time::Duration;

use serde::Serialize;
use uuid::Uuid;

/// How often a failing scoring call is attempted in total.
const MAX_ATTEMPTS: u32 = 3;

/// Request payload sent to the AI scoring service for one ticket.
#[derive(Debug, Serialize)]
pub struct AnalyzeRequest<'a> {
    pub ticket_id: Uuid,
    pub issue_type: &'a str,
    pub description: Option<&'a str>,
    pub category: &'a str,
    pub tags: &'a [String],
    pub user: AnalyzeUser<'a>,
}

#[derive(Debug, Serialize)]
pub struct AnalyzeUser<'a> {
    pub id: Uuid,
    pub name: Option<&'a str>,
    pub department: Option<&'a str>,
}

#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("scoring service returned status {0}")]
    Status(u16),
    #[error("scoring service request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Client for the AI scoring service. Endpoint and credential are fixed at
/// construction time; a rotation requires a restart, never a mid-request
/// re-read.
#[derive(Clone)]
pub struct AgentClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    retry_base: Duration,
}

impl AgentClient {
    pub fn from_env() -> Self {
        let base_url = std::env::var("TRIAGE_AGENT_URL")
            .unwrap_or_else(|_| "https://agent.triage.internal/api/analyze".to_string());
        let api_key = std::env::var("TRIAGE_AGENT_API_KEY")
            .ok()
            .filter(|key| !key.is_empty());
        let timeout = env_seconds("TRIAGE_AGENT_TIMEOUT_SECONDS", 30);
        let retry_base = Duration::from_secs(env_seconds("TRIAGE_AGENT_RETRY_BASE_SECONDS", 2));

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .expect("Failed to build scoring service HTTP client");

        Self {
            client,
            base_url,
            api_key,
            retry_base,
        }
    }

    /// Score one ticket. Non-2xx responses and transport failures (including
    /// timeouts) are retried with exponential backoff; after the final
    /// attempt the last error is returned and the caller leaves the ticket
    /// unprocessed.
    pub async fn analyze(
        &self,
        request: &AnalyzeRequest<'_>,
    ) -> Result<serde_json::Value, AgentError> {
        let mut attempt = 1;
        loop {
            match self.try_analyze(request).await {
                Ok(payload) => return Ok(payload),
                Err(err) if attempt < MAX_ATTEMPTS => {
                    let delay = backoff_delay(self.retry_base, attempt);
                    tracing::warn!(
                        ticket_id = %request.ticket_id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Scoring request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn try_analyze(
        &self,
        request: &AnalyzeRequest<'_>,
    ) -> Result<serde_json::Value, AgentError> {
        let mut builder = self.client.post(&self.base_url).json(request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AgentError::Status(status.as_u16()));
        }

        Ok(response.json().await?)
    }
}

/// Delay before retry `attempt` (1-based): base, 2x base, 4x base, ...
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

fn env_seconds(var: &str, default: u64) -> u64 {
    std::env::var(var)
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let base = Duration::from_secs(2);
        assert_eq!(backoff_delay(base, 1), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, 2), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, 3), Duration::from_secs(8));
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let base = Duration::from_secs(2);
        let delay = backoff_delay(base, u32::MAX);
        assert!(delay >= backoff_delay(base, 3));
    }
}
