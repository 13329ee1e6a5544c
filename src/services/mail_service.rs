use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::error::{Error, Result};

const RELAY_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvitationEmail {
    pub to: String,
    pub subject: String,
    pub test_name: String,
    pub test_date: String,
    pub link: String,
}

/// Delivery seam for invitation e-mails. Implementations must not block;
/// slow transports queue the message and report success once it is queued.
#[cfg_attr(test, mockall::automock)]
pub trait InvitationMailer: Send + Sync {
    fn send(&self, email: InvitationEmail) -> Result<()>;
}

/// Writes invitations to the log. Used when no relay is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer;

impl InvitationMailer for LogMailer {
    fn send(&self, email: InvitationEmail) -> Result<()> {
        tracing::info!(
            to = %email.to,
            subject = %email.subject,
            link = %email.link,
            "invitation e-mail (no relay configured)"
        );
        Ok(())
    }
}

/// Hands invitations to the external mail relay from a background task.
#[derive(Debug, Clone)]
pub struct RelayMailer {
    tx: mpsc::Sender<InvitationEmail>,
}

impl RelayMailer {
    /// Spawns the delivery task; must be called inside a tokio runtime.
    pub fn spawn(relay_url: String, client: Client) -> Self {
        let (tx, rx) = mpsc::channel::<InvitationEmail>(RELAY_QUEUE_CAPACITY);
        tokio::spawn(Self::run_worker(rx, relay_url, client));
        Self { tx }
    }

    async fn run_worker(mut rx: mpsc::Receiver<InvitationEmail>, relay_url: String, client: Client) {
        while let Some(email) = rx.recv().await {
            if let Err(e) = deliver(&client, &relay_url, &email).await {
                tracing::error!(error = %e, to = %email.to, "mail relay delivery failed");
            } else {
                tracing::info!(to = %email.to, "invitation handed to mail relay");
            }
        }
        tracing::debug!("mail relay queue closed");
    }
}

impl InvitationMailer for RelayMailer {
    fn send(&self, email: InvitationEmail) -> Result<()> {
        self.tx
            .try_send(email)
            .map_err(|e| Error::Internal(format!("mail queue unavailable: {}", e)))
    }
}

async fn deliver(client: &Client, relay_url: &str, email: &InvitationEmail) -> Result<()> {
    let endpoint = format!("{}/send-invitation", relay_url.trim_end_matches('/'));
    client
        .post(&endpoint)
        .json(&json!({
            "candidates": [email.to],
            "testName": email.test_name,
            "testDate": email.test_date,
            "link": email.link,
        }))
        .send()
        .await?
        .error_for_status()?;
    Ok(())
}

pub fn mailer_from_config(config: &Config) -> Arc<dyn InvitationMailer> {
    match &config.mail_relay_url {
        Some(relay) => {
            let client = Client::builder()
                .timeout(Duration::from_secs(15))
                .build()
                .unwrap_or_else(|_| Client::new());
            Arc::new(RelayMailer::spawn(relay.clone(), client))
        }
        None => Arc::new(LogMailer),
    }
}
