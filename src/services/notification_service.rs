use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::webhook_log::{WebhookLog, WebhookStatus};

const MAX_ATTEMPTS: u32 = 3;

/// Outbound webhooks with retry. Without a target URL events are dropped.
#[derive(Clone)]
pub struct NotificationService {
    client: Client,
    target_url: Option<String>,
    secret: Option<String>,
    queue: Arc<RwLock<Vec<WebhookLog>>>,
}

impl NotificationService {
    pub fn new(client: Client, target_url: Option<String>, secret: Option<String>) -> Self {
        Self {
            client,
            target_url,
            secret,
            queue: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn enqueue_webhook(&self, event_type: &str, payload: &JsonValue) -> Option<WebhookLog> {
        let Some(target_url) = self.target_url.clone() else {
            tracing::debug!(event_type, "no webhook target configured, event dropped");
            return None;
        };
        let now = Utc::now();
        let log = WebhookLog {
            id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            payload: payload.clone(),
            target_url,
            http_status: None,
            response_body: None,
            attempts: 0,
            max_attempts: MAX_ATTEMPTS,
            next_retry_at: None,
            status: WebhookStatus::Pending,
            created_at: now,
            updated_at: now,
        };
        self.queue.write().await.push(log.clone());
        Some(log)
    }

    pub async fn deliver_once(&self, log_id: Uuid) -> Result<()> {
        let log = self
            .queue
            .read()
            .await
            .iter()
            .find(|l| l.id == log_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("Webhook {} not found", log_id)))?;

        let mut request = self.client.post(&log.target_url).json(&log.payload);
        if let Some(secret) = &self.secret {
            request = request.header("X-Webhook-Secret", secret);
        }
        let outcome = match request.send().await {
            Ok(resp) => {
                let status = resp.status().as_u16();
                let body = resp.text().await.unwrap_or_default();
                (Some(status), body, (200..300).contains(&status))
            }
            Err(err) => (None, err.to_string(), false),
        };

        let now = Utc::now();
        let mut queue = self.queue.write().await;
        if let Some(entry) = queue.iter_mut().find(|l| l.id == log_id) {
            let (http_status, body, ok) = outcome;
            entry.attempts += 1;
            entry.http_status = http_status;
            entry.response_body = Some(body);
            entry.updated_at = now;
            if ok {
                entry.status = WebhookStatus::Success;
                entry.next_retry_at = None;
            } else if entry.attempts < entry.max_attempts {
                entry.next_retry_at = Some(now + Duration::seconds(backoff_seconds(entry.attempts)));
            } else {
                entry.status = WebhookStatus::Failed;
                tracing::error!(
                    webhook_id = %entry.id,
                    event_type = %entry.event_type,
                    "webhook delivery failed permanently"
                );
            }
        }
        Ok(())
    }

    /// Delivers the oldest due webhook. Returns false when nothing was due.
    pub async fn run_once(&self) -> Result<bool> {
        self.run_once_at(Utc::now()).await
    }

    async fn run_once_at(&self, now: DateTime<Utc>) -> Result<bool> {
        let due = self
            .queue
            .read()
            .await
            .iter()
            .filter(|l| l.is_due(now))
            .min_by_key(|l| l.created_at)
            .map(|l| l.id);
        let Some(id) = due else { return Ok(false) };
        self.deliver_once(id).await?;
        Ok(true)
    }

    pub async fn logs(&self) -> Vec<WebhookLog> {
        self.queue.read().await.clone()
    }
}

/// 30s doubling per attempt, capped at an hour.
pub fn backoff_seconds(attempts: u32) -> i64 {
    let exp = attempts.saturating_sub(1).min(16);
    (30i64 * 2i64.pow(exp)).min(3600)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(backoff_seconds(1), 30);
        assert_eq!(backoff_seconds(2), 60);
        assert_eq!(backoff_seconds(3), 120);
        assert_eq!(backoff_seconds(10), 3600);
    }

    #[tokio::test]
    async fn without_target_nothing_is_queued() {
        let svc = NotificationService::new(Client::new(), None, None);
        assert!(svc.enqueue_webhook("test_completed", &json!({})).await.is_none());
        assert!(!svc.run_once().await.unwrap());
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_then_abandoned() {
        let svc = NotificationService::new(
            Client::new(),
            Some("http://127.0.0.1:9/hooks".into()),
            Some("whsec_test".into()),
        );
        let log = svc
            .enqueue_webhook("test_completed", &json!({"score": 2}))
            .await
            .unwrap();

        assert!(svc.run_once().await.unwrap());
        let after_first = svc.logs().await[0].clone();
        assert_eq!(after_first.attempts, 1);
        assert_eq!(after_first.status, WebhookStatus::Pending);
        assert!(after_first.next_retry_at.is_some());

        // not due again until the backoff has passed
        assert!(!svc.run_once().await.unwrap());

        let later = Utc::now() + Duration::hours(2);
        assert!(svc.run_once_at(later).await.unwrap());
        assert!(svc.run_once_at(later).await.unwrap());
        let last = svc.logs().await[0].clone();
        assert_eq!(last.id, log.id);
        assert_eq!(last.attempts, 3);
        assert_eq!(last.status, WebhookStatus::Failed);
        assert!(!svc.run_once_at(later).await.unwrap());
    }
}
