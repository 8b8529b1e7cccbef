//! Availability of a record at a given instant
//!
//! Records move from `Active` to `Expired` or `Exhausted` lazily: the state
//! is computed whenever a record is read or consumed, never scheduled.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::PrivateUrlRecord;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RecordState {
    Active,
    /// `expire` is at or before the evaluation time
    Expired,
    /// `hit_counter` reached a non-zero `hits_limit`
    Exhausted,
}

/// Returns `true` if the record may still be consumed at `now`.
///
/// The expiration boundary is inclusive: a record expiring exactly at `now`
/// is no longer available.
pub fn is_available(record: &PrivateUrlRecord, now: DateTime<Utc>) -> bool {
    state(record, now) == RecordState::Active
}

/// Classifies the record at `now`; expiration is checked before the hit limit.
pub fn state(record: &PrivateUrlRecord, now: DateTime<Utc>) -> RecordState {
    if matches!(record.expire, Some(expire) if expire <= now) {
        return RecordState::Expired;
    }
    if record.hits_limit != 0 && record.hits_limit <= record.hit_counter {
        return RecordState::Exhausted;
    }
    RecordState::Active
}
