//! The delivery loop that drains one broadcast.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use broadcast_core::{BroadcastEvent, BroadcastId, BroadcastMessage, BroadcastStats, RecipientId};
use chrono::Utc;
use db::repositories::BroadcastRepository;
use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::messages::WorkerError;
use crate::policy::DeliveryPolicy;
use crate::transport::{Notification, NotificationTransport, SendError};

/// Outcome of one worker run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerReport {
    pub broadcast_id: BroadcastId,
    /// Recipients this run settled.
    pub processed: u64,
    pub sent: u64,
    pub failed: u64,
    /// The pending queue was empty when the run ended.
    pub exhausted: bool,
    /// Counters after the run.
    pub stats: BroadcastStats,
}

/// A send that used up its attempts or was rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFailure {
    pub error: SendError,
    pub attempts: u32,
}

/// Send one notification with the policy's timeout and retry rules.
///
/// Returns the number of attempts used on success.
pub async fn send_with_retry(
    transport: &dyn NotificationTransport,
    policy: &DeliveryPolicy,
    notification: &Notification,
) -> Result<u32, DeliveryFailure> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let attempt_result =
            tokio::time::timeout(policy.attempt_timeout, transport.send(notification)).await;
        let result = match attempt_result {
            Ok(result) => result,
            Err(_) => Err(SendError::timeout(policy.attempt_timeout)),
        };

        match result {
            Ok(()) => return Ok(attempt),
            Err(error) if error.is_retryable() && attempt < policy.max_attempts => {
                let delay = policy.backoff.next(attempt - 1);
                tracing::debug!(
                    recipient = %notification.recipient,
                    attempt,
                    "Send failed, retrying in {:?}: {}",
                    delay,
                    error
                );
                tokio::time::sleep(delay).await;
            }
            Err(error) => {
                return Err(DeliveryFailure {
                    error,
                    attempts: attempt,
                });
            }
        }
    }
}

/// Drains a broadcast's pending queue through a transport.
///
/// One run processes recipients strictly one at a time. Several workers may
/// drain the same broadcast; claims are atomic so no recipient is handled
/// twice, but their pacing is independent.
#[derive(Clone)]
pub struct DeliveryWorker {
    broadcasts: BroadcastRepository,
    transport: Arc<dyn NotificationTransport>,
    policy: DeliveryPolicy,
    events: Option<broadcast::Sender<BroadcastEvent>>,
}

impl DeliveryWorker {
    pub fn new(
        broadcasts: BroadcastRepository,
        transport: Arc<dyn NotificationTransport>,
        policy: DeliveryPolicy,
    ) -> Self {
        Self {
            broadcasts,
            transport,
            policy,
            events: None,
        }
    }

    /// Publish delivery events on `tx`.
    pub fn with_events(mut self, tx: broadcast::Sender<BroadcastEvent>) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn policy(&self) -> &DeliveryPolicy {
        &self.policy
    }

    /// Process the broadcast until its queue is empty, the run budget is
    /// spent or `cancel` fires.
    ///
    /// A recipient that has been claimed is always settled before the run
    /// stops. When the queue is exhausted the broadcast is completed.
    pub async fn drain(
        &self,
        id: BroadcastId,
        cancel: &CancellationToken,
    ) -> Result<WorkerReport, WorkerError> {
        let stats = self
            .broadcasts
            .find_stats(id)
            .await?
            .ok_or(WorkerError::BroadcastNotFound(id))?;

        if !self.broadcasts.is_active(id).await? {
            tracing::info!(broadcast_id = %id, "Broadcast is not active, nothing to do");
            return Ok(WorkerReport {
                broadcast_id: id,
                processed: 0,
                sent: 0,
                failed: 0,
                exhausted: stats.is_complete(),
                stats,
            });
        }

        let message = self.broadcasts.message(id).await?;
        let started = Instant::now();
        let mut report = WorkerReport {
            broadcast_id: id,
            processed: 0,
            sent: 0,
            failed: 0,
            exhausted: false,
            stats,
        };
        let mut consecutive_errors = 0u32;
        let mut claimed_any = false;

        tracing::info!(
            broadcast_id = %id,
            pending = report.stats.pending,
            transport = self.transport.name(),
            "Worker started"
        );

        loop {
            if cancel.is_cancelled() {
                tracing::info!(broadcast_id = %id, "Worker cancelled");
                break;
            }
            if self
                .policy
                .run_budget
                .is_some_and(|budget| started.elapsed() >= budget)
            {
                tracing::info!(broadcast_id = %id, "Run budget spent, stopping");
                break;
            }

            let Some(recipient) = self.broadcasts.claim_next(id, Utc::now()).await? else {
                report.exhausted = true;
                break;
            };
            if !claimed_any {
                self.broadcasts.mark_draining(id).await?;
                claimed_any = true;
            }

            let outcome = self.deliver(id, &message, recipient).await;

            if self.broadcasts.release(id, recipient).await? {
                match outcome {
                    Ok(attempts) => {
                        self.broadcasts.mark_succeeded(id, recipient).await?;
                        report.sent += 1;
                        consecutive_errors = 0;
                        tracing::debug!(
                            broadcast_id = %id,
                            recipient = %recipient,
                            attempts,
                            "Delivered"
                        );
                        self.publish(BroadcastEvent::RecipientDelivered {
                            broadcast_id: id,
                            recipient,
                            attempts,
                            timestamp: Utc::now(),
                        });
                    }
                    Err(error) => {
                        self.broadcasts.mark_failed(id, recipient, &error).await?;
                        report.failed += 1;
                        consecutive_errors = consecutive_errors.saturating_add(1);
                        tracing::debug!(
                            broadcast_id = %id,
                            recipient = %recipient,
                            "Delivery failed: {}",
                            error
                        );
                        self.publish(BroadcastEvent::RecipientFailed {
                            broadcast_id: id,
                            recipient,
                            error,
                            timestamp: Utc::now(),
                        });
                    }
                }

                report.processed += 1;
                if self.policy.progress_every > 0
                    && report.processed % self.policy.progress_every == 0
                {
                    tracing::info!(
                        broadcast_id = %id,
                        processed = report.processed,
                        sent = report.sent,
                        failed = report.failed,
                        "Progress"
                    );
                }
            } else {
                // Another worker owns the recipient now; still pace before the next claim.
                tracing::warn!(
                    broadcast_id = %id,
                    recipient = %recipient,
                    "Processing lease lost, dropping outcome"
                );
            }

            let delay = self.policy.pacing_delay(consecutive_errors);
            if !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        if report.exhausted {
            if let Some(stats) = self.broadcasts.complete(id, Utc::now()).await? {
                self.publish(BroadcastEvent::Completed {
                    broadcast_id: id,
                    stats,
                    timestamp: Utc::now(),
                });
            }
        }

        report.stats = self.broadcasts.stats(id).await?;
        tracing::info!(
            broadcast_id = %id,
            processed = report.processed,
            sent = report.sent,
            failed = report.failed,
            exhausted = report.exhausted,
            "Worker finished"
        );
        Ok(report)
    }

    /// Attempt one recipient. A panic inside the transport becomes a failure.
    async fn deliver(
        &self,
        id: BroadcastId,
        message: &BroadcastMessage,
        recipient: RecipientId,
    ) -> Result<u32, String> {
        let notification = Notification {
            recipient,
            title: message.title.clone(),
            body: message.body.clone(),
            target_url: message.tracking_url(id, recipient),
        };

        let attempt = send_with_retry(self.transport.as_ref(), &self.policy, &notification);
        match AssertUnwindSafe(attempt).catch_unwind().await {
            Ok(Ok(attempts)) => Ok(attempts),
            Ok(Err(failure)) => Err(failure.error.to_string()),
            Err(panic) => {
                let reason = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(
                    broadcast_id = %id,
                    recipient = %recipient,
                    "Delivery panicked: {}",
                    reason
                );
                Err(format!("panic: {}", reason))
            }
        }
    }

    fn publish(&self, event: BroadcastEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
