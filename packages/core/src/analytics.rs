//! Progress, funnel and click analytics derived from recorded broadcast state.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::{BroadcastId, BroadcastState, BroadcastStats, RecipientId, ValidationError};

/// Live status of a broadcast, as polled by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastStatus {
    pub broadcast_id: BroadcastId,
    pub stats: BroadcastStats,
    pub state: BroadcastState,
    /// Percentage of recipients with a terminal outcome, one decimal.
    pub progress: f64,
    /// Estimated seconds remaining.
    pub eta: u64,
    pub is_complete: bool,
}

impl BroadcastStatus {
    /// Enrich raw counters as of `now`.
    pub fn at(broadcast_id: BroadcastId, stats: BroadcastStats, now: DateTime<Utc>) -> Self {
        Self {
            broadcast_id,
            progress: progress(&stats),
            eta: eta_secs(&stats, now),
            is_complete: stats.is_complete(),
            state: stats.state,
            stats,
        }
    }
}

/// `(sent + failed) / total * 100`, rounded to one decimal.
pub fn progress(stats: &BroadcastStats) -> f64 {
    if stats.total == 0 {
        return 0.0;
    }
    let pct = stats.processed() as f64 / stats.total as f64 * 100.0;
    (pct * 10.0).round() / 10.0
}

/// Seconds remaining, extrapolated from the average time per finished recipient.
///
/// Zero unless something has been sent and something is still pending.
pub fn eta_secs(stats: &BroadcastStats, now: DateTime<Utc>) -> u64 {
    if stats.pending == 0 || stats.sent == 0 {
        return 0;
    }
    let elapsed_ms = (now - stats.start_time).num_milliseconds().max(0) as f64;
    let avg_ms = elapsed_ms / stats.processed() as f64;
    (avg_ms * stats.pending as f64 / 1000.0).ceil() as u64
}

/// Delivery and click conversion for one broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementFunnel {
    /// Recipients targeted.
    pub sent: u64,
    pub delivered: u64,
    /// Click events; repeat clicks count each time.
    pub clicked: u64,
    pub delivery_rate: f64,
    pub click_rate: f64,
    pub ctr: f64,
}

impl EngagementFunnel {
    pub fn from_stats(stats: &BroadcastStats) -> Self {
        let delivered = stats.sent;
        Self {
            sent: stats.total,
            delivered,
            clicked: stats.clicks,
            delivery_rate: rate(delivered, stats.total),
            click_rate: rate(stats.clicks, delivered),
            ctr: rate(stats.clicks, stats.total),
        }
    }
}

fn rate(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64 * 100.0
    }
}

/// Coarse classification of recorded delivery errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ErrorCategory {
    #[serde(rename = "Rate Limit")]
    RateLimit,
    #[serde(rename = "Timeout")]
    Timeout,
    #[serde(rename = "Invalid Recipient")]
    InvalidRecipient,
    #[serde(rename = "User Blocked")]
    UserBlocked,
    #[serde(rename = "Server Error")]
    ServerError,
    #[serde(rename = "Other")]
    Other,
}

impl ErrorCategory {
    /// Categorize an error string by keyword; the first matching rule wins.
    pub fn categorize(error: &str) -> Self {
        let has = |needles: &[&str]| needles.iter().any(|n| error.contains(n));

        if has(&["429", "rate limit"]) {
            ErrorCategory::RateLimit
        } else if has(&["timeout", "TIMEOUT"]) {
            ErrorCategory::Timeout
        } else if has(&["400", "invalid"]) {
            ErrorCategory::InvalidRecipient
        } else if has(&["403", "blocked"]) {
            ErrorCategory::UserBlocked
        } else if has(&["500", "502", "503"]) {
            ErrorCategory::ServerError
        } else {
            ErrorCategory::Other
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::RateLimit => "Rate Limit",
            ErrorCategory::Timeout => "Timeout",
            ErrorCategory::InvalidRecipient => "Invalid Recipient",
            ErrorCategory::UserBlocked => "User Blocked",
            ErrorCategory::ServerError => "Server Error",
            ErrorCategory::Other => "Other",
        }
    }
}

/// Count failures per category. Empty categories are absent.
pub fn error_breakdown<'a>(
    errors: impl IntoIterator<Item = &'a str>,
) -> BTreeMap<ErrorCategory, u64> {
    let mut breakdown = BTreeMap::new();
    for error in errors {
        *breakdown.entry(ErrorCategory::categorize(error)).or_insert(0) += 1;
    }
    breakdown
}

/// Distribution of time from broadcast start to click.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickTiming {
    /// Mean time to click in milliseconds.
    pub avg_time_to_click: f64,
    pub under_1_min: u64,
    pub between_1_and_5_min: u64,
    pub between_5_and_30_min: u64,
    pub over_30_min: u64,
}

impl ClickTiming {
    pub fn from_clicks(
        start_time: DateTime<Utc>,
        clicks: impl IntoIterator<Item = DateTime<Utc>>,
    ) -> Self {
        let mut timing = ClickTiming::default();
        let mut total_ms = 0i64;
        let mut count = 0u64;

        for clicked_at in clicks {
            let diff_ms = (clicked_at - start_time).num_milliseconds();
            let minutes = diff_ms as f64 / 60_000.0;
            total_ms += diff_ms;
            count += 1;

            if minutes < 1.0 {
                timing.under_1_min += 1;
            } else if minutes < 5.0 {
                timing.between_1_and_5_min += 1;
            } else if minutes < 30.0 {
                timing.between_5_and_30_min += 1;
            } else {
                timing.over_30_min += 1;
            }
        }

        if count > 0 {
            timing.avg_time_to_click = total_ms as f64 / count as f64;
        }
        timing
    }
}

/// Full analytics view of one broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastAnalytics {
    pub broadcast_id: BroadcastId,
    pub stats: BroadcastStats,
    pub funnel: EngagementFunnel,
    pub error_breakdown: BTreeMap<ErrorCategory, u64>,
    pub click_timing: ClickTiming,
}

/// One recorded click (latest per recipient).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickRecord {
    pub fid: RecipientId,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// ISO-8601 rendering of `timestamp`.
    pub date: String,
}

impl ClickRecord {
    pub fn new(fid: RecipientId, timestamp: DateTime<Utc>) -> Self {
        Self {
            fid,
            timestamp,
            date: iso_millis(timestamp),
        }
    }
}

/// One recorded delivery failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRecipient {
    pub fid: RecipientId,
    pub error: String,
}

/// Which per-recipient record set to export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportKind {
    Success,
    Failed,
    Clicks,
}

impl ExportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::Success => "success",
            ExportKind::Failed => "failed",
            ExportKind::Clicks => "clicks",
        }
    }
}

impl std::str::FromStr for ExportKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(ExportKind::Success),
            "failed" => Ok(ExportKind::Failed),
            "clicks" => Ok(ExportKind::Clicks),
            other => Err(ValidationError::InvalidExportKind(other.to_string())),
        }
    }
}

/// `FID,Status` rows for every delivered recipient.
pub fn success_csv(succeeded: &[RecipientId]) -> String {
    let mut csv = String::from("FID,Status\n");
    for fid in succeeded {
        let _ = writeln!(csv, "{fid},Success");
    }
    csv
}

/// `FID,Error` rows with the error double-quoted.
pub fn failed_csv(failed: &[FailedRecipient]) -> String {
    let mut csv = String::from("FID,Error\n");
    for entry in failed {
        let _ = writeln!(csv, "{},\"{}\"", entry.fid, entry.error.replace('"', "\"\""));
    }
    csv
}

/// `FID,Clicked At,Time to Click (seconds)` rows; seconds are floored.
pub fn clicks_csv(start_time: DateTime<Utc>, clicks: &[ClickRecord]) -> String {
    let mut csv = String::from("FID,Clicked At,Time to Click (seconds)\n");
    for click in clicks {
        let ms = (click.timestamp - start_time).num_milliseconds();
        let _ = writeln!(csv, "{},{},{}", click.fid, click.date, ms.div_euclid(1000));
    }
    csv
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T12:00:00.000Z`.
pub fn iso_millis(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
