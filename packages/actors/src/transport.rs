//! Notification transport trait and implementations.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use broadcast_core::RecipientId;
use serde::Serialize;

/// One notification addressed to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub recipient: RecipientId,
    pub title: String,
    pub body: String,
    pub target_url: String,
}

/// Why a send failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    /// The transport refused the request; resending will not help.
    #[error("{0}")]
    Rejected(String),

    /// Timeouts, network errors and server errors.
    #[error("{0}")]
    Transient(String),
}

impl SendError {
    /// Classify an HTTP error response. 400, 401 and 403 are permanent.
    pub fn from_status(status: u16, body: &str) -> Self {
        let detail = format!("HTTP {}: {}", status, body);
        match status {
            400 | 401 | 403 => SendError::Rejected(detail),
            _ => SendError::Transient(detail),
        }
    }

    /// An attempt exceeded its timeout.
    pub fn timeout(after: Duration) -> Self {
        SendError::Transient(format!("timeout after {}ms", after.as_millis()))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Transient(_))
    }
}

/// Future returned by [`NotificationTransport::send`].
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + 'a>>;

/// Something that can deliver a notification.
///
/// Implementations perform a single attempt; retries, timeouts and pacing
/// belong to the caller.
pub trait NotificationTransport: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Attempt delivery once.
    fn send<'a>(&'a self, notification: &'a Notification) -> SendFuture<'a>;
}

/// A transport built from a closure.
pub struct FnTransport<F>
where
    F: Fn(&Notification) -> SendFuture<'static> + Send + Sync + 'static,
{
    name: String,
    send: F,
}

impl<F> FnTransport<F>
where
    F: Fn(&Notification) -> SendFuture<'static> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, send: F) -> Self {
        Self {
            name: name.into(),
            send,
        }
    }
}

impl<F> NotificationTransport for FnTransport<F>
where
    F: Fn(&Notification) -> SendFuture<'static> + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> SendFuture<'a> {
        (self.send)(notification)
    }
}

/// Logs every notification instead of sending it.
#[derive(Debug, Default, Clone)]
pub struct DryRunTransport;

impl NotificationTransport for DryRunTransport {
    fn name(&self) -> &str {
        "dry-run"
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> SendFuture<'a> {
        Box::pin(async move {
            tracing::info!(
                recipient = %notification.recipient,
                title = %notification.title,
                target_url = %notification.target_url,
                "Dry run: notification not sent"
            );
            Ok(())
        })
    }
}

/// Neynar client settings.
#[derive(Debug, Clone)]
pub struct NeynarConfig {
    pub api_key: String,
    /// API root, e.g. `https://api.neynar.com/v2`.
    pub base_url: String,
}

impl NeynarConfig {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.neynar.com/v2";

    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: Self::DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn notifications_url(&self) -> String {
        format!(
            "{}/farcaster/frame/notifications",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[derive(Serialize)]
struct NotificationRequest<'a> {
    uuid: String,
    sender_gid: u64,
    recipient_fids: [u64; 1],
    notification: NotificationBody<'a>,
}

#[derive(Serialize)]
struct NotificationBody<'a> {
    title: &'a str,
    body: &'a str,
    target_url: &'a str,
}

/// Sends managed frame notifications through the Neynar API.
#[derive(Debug, Clone)]
pub struct NeynarTransport {
    client: reqwest::Client,
    config: NeynarConfig,
}

impl NeynarTransport {
    pub fn new(config: NeynarConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    async fn post(&self, notification: &Notification) -> Result<(), SendError> {
        let request = NotificationRequest {
            uuid: uuid::Uuid::new_v4().to_string(),
            sender_gid: 0,
            recipient_fids: [notification.recipient.0],
            notification: NotificationBody {
                title: &notification.title,
                body: &notification.body,
                target_url: &notification.target_url,
            },
        };

        let response = self
            .client
            .post(self.config.notifications_url())
            .header("api_key", &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SendError::Transient(format!("timeout: {}", e))
                } else {
                    SendError::Transient(format!("network error: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            tracing::debug!(
                recipient = %notification.recipient,
                uuid = %request.uuid,
                "Notification accepted"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(SendError::from_status(status.as_u16(), &body))
    }
}

impl NotificationTransport for NeynarTransport {
    fn name(&self) -> &str {
        "neynar"
    }

    fn send<'a>(&'a self, notification: &'a Notification) -> SendFuture<'a> {
        Box::pin(self.post(notification))
    }
}
