//! Creation and consumption of private URLs
//!
//! [`PrivateUrls`] ties the token generator, the record store and the
//! availability rules together. It is cheap to clone and safe to share
//! between request handlers.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::availability::is_available;
use crate::config::Settings;
use crate::database::{RecordStore, StoredHit};
use crate::error::{Error, Result};
use crate::model::{is_valid_action, is_valid_token, JsonCodec, PayloadCodec, PrivateUrlRecord};
use crate::token::{RandomTokens, TokenSize, TokenSource, TokenSpec};

/// Expiration given either as an instant or relative to creation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expire {
    At(DateTime<Utc>),
    In(TimeDelta),
}

impl Expire {
    /// Absolute expiration time, or `None` when `now + delta` is out of the
    /// representable date range
    pub fn resolve(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Expire::At(at) => Some(at),
            Expire::In(delta) => now.checked_add_signed(delta),
        }
    }
}

impl From<DateTime<Utc>> for Expire {
    fn from(at: DateTime<Utc>) -> Self {
        Expire::At(at)
    }
}

impl From<TimeDelta> for Expire {
    fn from(delta: TimeDelta) -> Self {
        Expire::In(delta)
    }
}

/// Options for [`PrivateUrls::create`]
///
/// `token_size` and `dashed_piece_size` fall back to the configured defaults.
#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub owner: Option<String>,
    pub expire: Option<Expire>,

    /// Already encoded payload
    pub payload: Option<String>,

    /// `0` means unlimited
    pub hits_limit: u32,

    pub auto_delete: bool,
    pub token_size: Option<TokenSize>,
    pub dashed_piece_size: Option<i64>,

    /// Delete the owner's existing records for the action first.
    /// Ignored without an owner.
    pub replace: bool,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            owner: None,
            expire: None,
            payload: None,
            hits_limit: 1,
            auto_delete: false,
            token_size: None,
            dashed_piece_size: None,
            replace: false,
        }
    }
}

impl CreateOptions {
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn expire(mut self, expire: impl Into<Expire>) -> Self {
        self.expire = Some(expire.into());
        self
    }

    /// Encodes `data` as the payload with the JSON codec
    pub fn payload<T: Serialize>(mut self, data: &T) -> Result<Self> {
        self.payload = Some(JsonCodec.encode(data)?);
        Ok(self)
    }

    pub fn hits_limit(mut self, hits_limit: u32) -> Self {
        self.hits_limit = hits_limit;
        self
    }

    pub fn auto_delete(mut self, auto_delete: bool) -> Self {
        self.auto_delete = auto_delete;
        self
    }

    pub fn token_size(mut self, size: TokenSize) -> Self {
        self.token_size = Some(size);
        self
    }

    pub fn dashed_piece_size(mut self, piece: i64) -> Self {
        self.dashed_piece_size = Some(piece);
        self
    }

    pub fn replace(mut self, replace: bool) -> Self {
        self.replace = replace;
        self
    }
}

/// What happened to a record on a hit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitOutcome {
    /// The hit was counted and the record kept
    Counted,
    /// The hit was counted and the record, now unavailable, was deleted
    Deleted,
    /// The record was already unavailable; nothing changed
    Refused,
    /// The record no longer exists in the store
    Missing,
}

impl HitOutcome {
    /// Whether the hit consumed the record
    pub fn is_accepted(self) -> bool {
        matches!(self, HitOutcome::Counted | HitOutcome::Deleted)
    }

    pub fn is_deleted(self) -> bool {
        self == HitOutcome::Deleted
    }
}

/// Lifecycle manager for private URL records
#[derive(Clone)]
pub struct PrivateUrls {
    store: RecordStore,
    settings: Arc<Settings>,
    tokens: Arc<dyn TokenSource>,
}

impl PrivateUrls {
    pub fn new(store: RecordStore, settings: Arc<Settings>) -> Self {
        Self {
            store,
            settings,
            tokens: Arc::new(RandomTokens),
        }
    }

    /// Replaces the random token source
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Creates and stores a new record with a fresh token.
    ///
    /// All parameters are validated before anything is written. A token that
    /// collides with an existing `(action, token)` pair is regenerated, up to
    /// `create_max_attempts` tries in total; running out of attempts yields
    /// [`Error::TokenSpaceExhausted`].
    pub fn create(&self, action: &str, options: CreateOptions) -> Result<PrivateUrlRecord> {
        if !is_valid_action(action) {
            return Err(Error::validation(format!(
                "Action must match [-_a-zA-Z0-9]{{1,40}}, got {:?}.",
                action
            )));
        }

        let size = options.token_size.unwrap_or(self.settings.default_token_size);
        let piece = options
            .dashed_piece_size
            .unwrap_or(self.settings.default_dashed_piece_size);
        let spec = TokenSpec::new(size, piece)?;

        let now = Utc::now();
        let expire = match options.expire {
            Some(expire) => Some(
                expire
                    .resolve(now)
                    .ok_or_else(|| Error::validation("Expiration is out of range."))?,
            ),
            None => None,
        };

        if options.replace {
            if let Some(owner) = &options.owner {
                let removed = self.store.delete_where(action, owner)?;
                debug!(action, owner = %owner, removed, "Replaced existing private urls");
            }
        }

        let max_attempts = self.settings.create_max_attempts;

        for attempt in 1..=max_attempts {
            let token = self.tokens.next_token(&spec);
            if !is_valid_token(&token) {
                return Err(Error::validation(format!("Generated token {:?} is not a valid slug.", token)));
            }

            let mut record = PrivateUrlRecord {
                owner: options.owner.clone(),
                action: action.to_string(),
                token,
                expire,
                payload: options.payload.clone().unwrap_or_default(),
                created: now,
                hits_limit: options.hits_limit,
                hit_counter: 0,
                first_hit: None,
                last_hit: None,
                auto_delete: options.auto_delete,
                persisted: false,
            };

            match self.store.insert(&mut record) {
                Ok(()) => {
                    debug!(action, attempt, "Created private url");
                    return Ok(record);
                }
                Err(Error::DuplicateToken { .. }) => {
                    debug!(action, attempt, "Token collision, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        warn!(action, token_size = %size, max_attempts, "Token space exhausted");
        Err(Error::TokenSpaceExhausted {
            action: action.to_string(),
            token_size: size.to_string(),
            attempts: max_attempts,
        })
    }

    /// Availability at `now`, or at the current time when `now` is `None`
    pub fn is_available(&self, record: &PrivateUrlRecord, now: Option<DateTime<Utc>>) -> bool {
        is_available(record, now.unwrap_or_else(Utc::now))
    }

    /// Counts a hit on `record`.
    ///
    /// For a persisted record the increment is applied atomically to the
    /// stored row and `record` is refreshed from it. If the hit leaves the
    /// record unavailable and it has `auto_delete`, the row is deleted and the
    /// handle loses its persisted identity. A record that was never stored is
    /// only updated in memory.
    pub fn record_hit(&self, record: &mut PrivateUrlRecord) -> Result<HitOutcome> {
        self.hit(record, false)
    }

    /// Like [`record_hit`](Self::record_hit), but refuses a record that is
    /// already unavailable, checked in the same transaction as the increment.
    /// Concurrent consumers of one record can never push `hit_counter` past
    /// `hits_limit`.
    pub fn consume(&self, record: &mut PrivateUrlRecord) -> Result<HitOutcome> {
        self.hit(record, true)
    }

    fn hit(&self, record: &mut PrivateUrlRecord, gate: bool) -> Result<HitOutcome> {
        let now = Utc::now();

        if !record.persisted {
            if gate && !is_available(record, now) {
                return Ok(HitOutcome::Refused);
            }

            record.hit_counter = record.hit_counter.saturating_add(1);
            if record.auto_delete && !is_available(record, now) {
                return Ok(HitOutcome::Deleted);
            }

            record.last_hit = Some(now);
            if record.first_hit.is_none() {
                record.first_hit = Some(now);
            }
            return Ok(HitOutcome::Counted);
        }

        let outcome = match self
            .store
            .increment_hit(&record.action, &record.token, now, gate)?
        {
            StoredHit::Counted(stored) => {
                *record = stored;
                HitOutcome::Counted
            }
            StoredHit::Deleted(stored) => {
                *record = stored;
                HitOutcome::Deleted
            }
            StoredHit::Refused(stored) => {
                *record = stored;
                HitOutcome::Refused
            }
            StoredHit::Missing => {
                record.persisted = false;
                HitOutcome::Missing
            }
        };

        debug!(
            action = %record.action,
            hit_counter = record.hit_counter,
            ?outcome,
            "Recorded hit"
        );
        Ok(outcome)
    }

    pub fn find(&self, action: &str, token: &str) -> Result<Option<PrivateUrlRecord>> {
        self.store.find(action, token)
    }

    /// Deletes a record. When `owner` is given it must match the record's owner.
    pub fn remove(&self, action: &str, token: &str, owner: Option<&str>) -> Result<PrivateUrlRecord> {
        let record = self
            .store
            .find(action, token)?
            .ok_or_else(|| Error::NotFound("Private url not found".to_string()))?;

        if let Some(owner) = owner {
            match record.owner.as_deref() {
                Some(record_owner) if record_owner == owner => {}
                Some(_) => {
                    return Err(Error::Forbidden(
                        "You are not authorized to delete this private url".to_string(),
                    ))
                }
                None => {
                    return Err(Error::Forbidden(
                        "This private url has no owner and cannot be deleted with owner verification"
                            .to_string(),
                    ))
                }
            }
        }

        if !self.store.delete(action, token)? {
            return Err(Error::NotFound("Private url not found".to_string()));
        }

        debug!(action, "Deleted private url");
        Ok(record)
    }

    pub fn list(
        &self,
        action: Option<&str>,
        owner: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PrivateUrlRecord>> {
        self.store.list(action, owner, offset, limit)
    }
}
