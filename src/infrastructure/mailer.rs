use anyhow::{Context, Result};
use async_trait::async_trait;
use mockall::automock;
use tracing::{debug, info};

use crate::config::config_model::MailerConfig;

/// Fire-and-forget email-sequence enrollment. Callers wrap every call in the
/// best-effort helper; a mailer outage never fails a checkout.
#[async_trait]
#[automock]
pub trait MailerClient: Send + Sync {
    async fn enroll_in_sequence(&self, email: &str, sequence: &str) -> Result<()>;
}

pub struct HttpMailer {
    http: reqwest::Client,
    config: MailerConfig,
}

impl HttpMailer {
    pub fn new(config: MailerConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl MailerClient for HttpMailer {
    async fn enroll_in_sequence(&self, email: &str, sequence: &str) -> Result<()> {
        let (Some(api_base), Some(api_key)) = (&self.config.api_base, &self.config.api_key) else {
            debug!(sequence, "mailer: not configured, skipping sequence enrollment");
            return Ok(());
        };

        let url = format!(
            "{}/sequences/{}/subscribers",
            api_base.trim_end_matches('/'),
            sequence
        );
        let resp = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .context("mailer request failed")?;

        if !resp.status().is_success() {
            anyhow::bail!("mailer returned {}", resp.status());
        }

        info!(sequence, "mailer: enrolled in sequence");
        Ok(())
    }
}
