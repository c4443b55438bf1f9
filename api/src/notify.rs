use std::time::Duration;

/// Conceptual recipient for the human support queue.
pub const SUPPORT_QUEUE: &str = "support-queue";

/// Fire-and-forget notification channel. Delivery happens on a spawned task;
/// failures are logged at warn and never propagated — a missed message must
/// not fail or roll back the action that produced it.
#[derive(Clone)]
pub struct Notifier {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Notifier {
    pub fn from_env() -> Self {
        let webhook_url = std::env::var("TRIAGE_NOTIFY_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.is_empty());
        if webhook_url.is_none() {
            tracing::info!("TRIAGE_NOTIFY_WEBHOOK_URL not set, notifications are disabled");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to build notification HTTP client");

        Self {
            client,
            webhook_url,
        }
    }

    pub fn notify(&self, recipient: &str, text: &str, thread: Option<&str>) {
        let Some(url) = self.webhook_url.clone() else {
            tracing::debug!(recipient, "Notification channel not configured, dropping message");
            return;
        };

        let payload = serde_json::json!({
            "recipient": recipient,
            "text": text,
            "thread": thread,
        });
        let client = self.client.clone();
        let recipient = recipient.to_string();

        tokio::spawn(async move {
            match client.post(&url).json(&payload).send().await {
                Ok(response) if !response.status().is_success() => {
                    tracing::warn!(
                        recipient,
                        status = %response.status(),
                        "Notification delivery rejected"
                    );
                }
                Err(err) => {
                    tracing::warn!(recipient, error = %err, "Notification delivery failed");
                }
                Ok(_) => {}
            }
        });
    }
}
