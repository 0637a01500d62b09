//! Typed boundary between store hashes and domain records.
//!
//! Stats live in a flat hash so counters can be incremented atomically. Every
//! read goes through [`decode_stats`], which validates the fields and
//! reconciles the stored lifecycle state against the counters.

use std::collections::HashMap;

use broadcast_core::{BroadcastState, BroadcastStats, ClickRecord, FailedRecipient, RecipientId};
use chrono::{DateTime, TimeZone, Utc};

use crate::DbError;
use crate::keys::field;

/// Initial hash fields for a freshly created broadcast.
pub(crate) fn encode_stats(stats: &BroadcastStats) -> Vec<(String, String)> {
    let mut fields = vec![
        (field::TOTAL, stats.total.to_string()),
        (field::SENT, stats.sent.to_string()),
        (field::FAILED, stats.failed.to_string()),
        (field::PENDING, stats.pending.to_string()),
        (field::PROCESSING, stats.processing.to_string()),
        (field::CLICKS, stats.clicks.to_string()),
        (field::START_TIME, stats.start_time.timestamp_millis().to_string()),
        (field::STATE, stats.state.as_str().to_string()),
    ];
    if let Some(end) = stats.end_time {
        fields.push((field::END_TIME, end.timestamp_millis().to_string()));
    }
    if let Some(duration) = stats.duration {
        fields.push((field::DURATION, duration.to_string()));
    }
    fields
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Decode a stats hash. An empty hash means the broadcast does not exist.
pub(crate) fn decode_stats(
    key: &str,
    raw: &HashMap<String, String>,
) -> Result<Option<BroadcastStats>, DbError> {
    if raw.is_empty() {
        return Ok(None);
    }

    let start_time = raw
        .get(field::START_TIME)
        .ok_or_else(|| DbError::corrupt(key, "missing startTime"))
        .and_then(|value| parse_millis(key, value))?;
    let end_time = raw
        .get(field::END_TIME)
        .map(|value| parse_millis(key, value))
        .transpose()?;
    let duration = raw
        .get(field::DURATION)
        .map(|value| counter_value(key, field::DURATION, value))
        .transpose()?;

    let mut stats = BroadcastStats {
        total: counter(key, raw, field::TOTAL)?,
        sent: counter(key, raw, field::SENT)?,
        failed: counter(key, raw, field::FAILED)?,
        pending: counter(key, raw, field::PENDING)?,
        processing: counter(key, raw, field::PROCESSING)?,
        clicks: counter(key, raw, field::CLICKS)?,
        start_time,
        end_time,
        duration,
        state: BroadcastState::Created,
    };

    let stored = raw
        .get(field::STATE)
        .map(|value| value.parse::<BroadcastState>())
        .transpose()
        .map_err(|e| DbError::corrupt(key, e))?;
    stats.state = BroadcastState::reconcile(stored, &stats);

    Ok(Some(stats))
}

/// Missing counters read as zero. Counters may dip below zero for an instant
/// while two atomic increments race, so negatives are clamped.
fn counter(key: &str, raw: &HashMap<String, String>, name: &str) -> Result<u64, DbError> {
    match raw.get(name) {
        Some(value) => counter_value(key, name, value),
        None => Ok(0),
    }
}

fn counter_value(key: &str, name: &str, value: &str) -> Result<u64, DbError> {
    value
        .parse::<i64>()
        .map(|n| n.max(0) as u64)
        .map_err(|_| DbError::NotAnInteger {
            key: key.to_string(),
            field: name.to_string(),
        })
}

fn parse_millis(key: &str, value: &str) -> Result<DateTime<Utc>, DbError> {
    value
        .parse::<i64>()
        .ok()
        .and_then(|ms| Utc.timestamp_millis_opt(ms).single())
        .ok_or_else(|| DbError::corrupt(key, format!("bad timestamp {value:?}")))
}

pub(crate) fn decode_failed(
    key: &str,
    raw: HashMap<String, String>,
) -> Result<Vec<FailedRecipient>, DbError> {
    let mut failed = raw
        .into_iter()
        .map(|(fid, error)| {
            let fid = fid.parse::<RecipientId>().map_err(|e| DbError::corrupt(key, e))?;
            Ok(FailedRecipient { fid, error })
        })
        .collect::<Result<Vec<_>, DbError>>()?;
    failed.sort_by_key(|entry| entry.fid);
    Ok(failed)
}

pub(crate) fn decode_clicks(
    key: &str,
    raw: HashMap<String, String>,
) -> Result<Vec<ClickRecord>, DbError> {
    let mut clicks = raw
        .into_iter()
        .map(|(fid, at)| {
            let fid = fid.parse::<RecipientId>().map_err(|e| DbError::corrupt(key, e))?;
            Ok(ClickRecord::new(fid, parse_millis(key, &at)?))
        })
        .collect::<Result<Vec<_>, DbError>>()?;
    clicks.sort_by_key(|click| (click.timestamp, click.fid));
    Ok(clicks)
}

pub(crate) fn decode_recipients(
    key: &str,
    raw: Vec<String>,
) -> Result<Vec<RecipientId>, DbError> {
    let mut ids = raw
        .iter()
        .map(|value| value.parse::<RecipientId>().map_err(|e| DbError::corrupt(key, e)))
        .collect::<Result<Vec<_>, DbError>>()?;
    ids.sort();
    Ok(ids)
}
