//! Webhook publisher for deployment events.
//!
//! Posts the final event of a deployment as JSON to a configured URL, so
//! chat bots or dashboards can announce where a service went live. Every
//! attempt is bounded by a timeout; a stalled endpoint must not hold up a
//! deployment that already finished.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::domain::DeploymentEvent;

const DEFAULT_PUBLISH_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for one webhook endpoint.
pub struct WebhookPublisher {
    /// Endpoint that receives event payloads
    url: String,
    /// HTTP client
    client: reqwest::Client,
    /// Cap on one publish attempt, connect through response
    timeout: Duration,
}

impl WebhookPublisher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            timeout: DEFAULT_PUBLISH_TIMEOUT,
        }
    }

    /// Override the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// POST one event as JSON.
    ///
    /// Callers decide what a failure means; the deployer treats it as
    /// log-and-continue.
    pub async fn publish(&self, event: &DeploymentEvent) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(event)
            .send()
            .await
            .context("Failed to send webhook request")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Webhook returned {}: {}", status, body);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use uuid::Uuid;

    use crate::domain::{DeployPhase, EventKind};

    use super::*;

    #[test]
    fn test_publisher_keeps_url() {
        let publisher = WebhookPublisher::new("https://hooks.example.com/deploys");
        assert_eq!(publisher.url(), "https://hooks.example.com/deploys");
    }

    #[tokio::test]
    async fn test_publish_times_out_against_silent_endpoint() {
        // Bound but never accepted: the connection sits in the backlog and
        // no response ever comes.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());

        let publisher = WebhookPublisher::new(url).with_timeout(Duration::from_millis(200));
        let event = DeploymentEvent::new(
            Uuid::new_v4(),
            "my-svc",
            EventKind::DeployCompleted,
            Some(DeployPhase::Done),
            "Deployment complete",
        );

        let started = Instant::now();
        let result = publisher.publish(&event).await;

        assert!(result.is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
