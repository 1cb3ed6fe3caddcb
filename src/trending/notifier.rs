//! Review-notification dispatch.
//!
//! The engine decides *that* a review notification fires; delivery is a
//! collaborator behind [`ReviewNotifier`]. The production implementation
//! posts one webhook per (recipient, subject); the tracker fans out and
//! keeps recipient failures independent of each other.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

use crate::subject::models::{Recipient, SubjectId};
use crate::util::retry::RetryConfig;

/// What is being put in front of reviewers.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewRequest {
    pub kind: &'static str,
    pub subject_id: SubjectId,
    pub name: String,
}

#[async_trait]
pub trait ReviewNotifier: Send + Sync {
    /// Dispatch one message to one recipient. Best effort; the caller
    /// tolerates individual failures.
    async fn notify(&self, recipient: &Recipient, request: &ReviewRequest) -> Result<()>;
}

/// Fallback notifier for deployments without a delivery channel configured.
pub struct LogNotifier;

#[async_trait]
impl ReviewNotifier for LogNotifier {
    async fn notify(&self, recipient: &Recipient, request: &ReviewRequest) -> Result<()> {
        tracing::info!(
            recipient = %recipient.handle,
            kind = request.kind,
            subject_id = request.subject_id,
            subject = %request.name,
            "trend review requested (no delivery channel configured)"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    recipient_account_id: i64,
    recipient_handle: &'a str,
    subject_kind: &'static str,
    subject_id: SubjectId,
    subject_name: &'a str,
}

/// Posts review requests to the notification gateway, one call per
/// (recipient, subject), with full-jitter retries on transient failures.
pub struct WebhookNotifier {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
    retry: RetryConfig,
}

impl WebhookNotifier {
    /// # Errors
    /// Returns an error when the underlying HTTP client cannot be built.
    pub fn new(
        endpoint: String,
        token: Option<String>,
        connect_timeout: Duration,
        total_timeout: Duration,
        retry: RetryConfig,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(total_timeout)
            .build()
            .context("failed to build notification http client")?;
        Ok(Self {
            client,
            endpoint,
            token,
            retry,
        })
    }
}

#[async_trait]
impl ReviewNotifier for WebhookNotifier {
    async fn notify(&self, recipient: &Recipient, request: &ReviewRequest) -> Result<()> {
        let payload = WebhookPayload {
            recipient_account_id: recipient.account_id,
            recipient_handle: &recipient.handle,
            subject_kind: request.kind,
            subject_id: request.subject_id,
            subject_name: &request.name,
        };

        self.retry
            .run(|| async {
                let mut outgoing = self.client.post(&self.endpoint).json(&payload);
                if let Some(token) = &self.token {
                    outgoing = outgoing.bearer_auth(token);
                }
                let response = outgoing
                    .send()
                    .await
                    .context("failed to send review notification")?;
                response
                    .error_for_status()
                    .context("review notification rejected")?;
                Ok(())
            })
            .await
    }
}
