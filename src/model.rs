//! Data models for the private URL service
//!
//! This module defines the stored record, the payload codec and the
//! request/response structures of the management API.

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::Result;
use crate::token::TokenSize;

/// Longest accepted action name
pub const ACTION_MAX_LEN: usize = 40;

/// Longest accepted token, matching the generator's upper bound
pub const TOKEN_MAX_LEN: usize = 64;

/// Checks an action name against `[-_a-zA-Z0-9]{1,40}`
pub fn is_valid_action(action: &str) -> bool {
    (1..=ACTION_MAX_LEN).contains(&action.len())
        && action
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Checks a token against `[-a-zA-Z0-9]{1,64}`
pub fn is_valid_token(token: &str) -> bool {
    (1..=TOKEN_MAX_LEN).contains(&token.len())
        && token.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// A private URL record stored in the database
///
/// The pair `(action, token)` is unique across all records. Whether the
/// record can still be consumed is decided by
/// [`availability::is_available`](crate::availability::is_available).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct PrivateUrlRecord {
    /// Owner of the record, used for replace semantics and delete checks
    pub owner: Option<String>,

    /// Name of the behavior this token triggers (e.g. "confirm-email")
    pub action: String,

    /// Random URL-safe secret
    pub token: String,

    /// Expiration time; `None` means no time limit
    pub expire: Option<DateTime<Utc>>,

    /// Encoded payload; an empty string means "no payload"
    #[serde(default)]
    pub payload: String,

    pub created: DateTime<Utc>,

    /// Maximum number of hits, `0` means unlimited
    pub hits_limit: u32,

    #[serde(default)]
    pub hit_counter: u32,

    pub first_hit: Option<DateTime<Utc>>,
    pub last_hit: Option<DateTime<Utc>>,

    /// Delete the record once a hit leaves it unavailable
    #[serde(default)]
    pub auto_delete: bool,

    #[serde(skip)]
    pub(crate) persisted: bool,
}

impl PrivateUrlRecord {
    /// Builds an in-memory record with no hits and no persisted identity
    pub fn new(action: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            owner: None,
            action: action.into(),
            token: token.into(),
            expire: None,
            payload: String::new(),
            created: Utc::now(),
            hits_limit: 1,
            hit_counter: 0,
            first_hit: None,
            last_hit: None,
            auto_delete: false,
            persisted: false,
        }
    }

    /// Whether this handle refers to a row in the store
    pub fn is_persisted(&self) -> bool {
        self.persisted
    }

    /// Store key: `"{action}/{token}"`
    pub fn key(&self) -> String {
        record_key(&self.action, &self.token)
    }

    /// Path under which the dispatch route serves this record
    pub fn absolute_path(&self, namespace: &str) -> String {
        format!("/{}/{}/{}", namespace, self.action, self.token)
    }

    /// Usage summary, e.g. `"1 / 3"` or `"4 / unlimited"`
    pub fn used(&self) -> String {
        if self.hits_limit == 0 {
            format!("{} / unlimited", self.hit_counter)
        } else {
            format!("{} / {}", self.hit_counter, self.hits_limit)
        }
    }

    /// Encodes `data` into the payload with the default JSON codec.
    /// `None` clears the payload.
    pub fn set_payload<T: Serialize>(&mut self, data: Option<&T>) -> Result<()> {
        self.set_payload_with(&JsonCodec, data)
    }

    /// Decodes the payload with the default JSON codec
    pub fn payload<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.payload_with(&JsonCodec)
    }

    pub fn set_payload_with<C, T>(&mut self, codec: &C, data: Option<&T>) -> Result<()>
    where
        C: PayloadCodec,
        T: Serialize,
    {
        self.payload = match data {
            Some(data) => codec.encode(data)?,
            None => String::new(),
        };
        Ok(())
    }

    pub fn payload_with<C, T>(&self, codec: &C) -> Result<Option<T>>
    where
        C: PayloadCodec,
        T: DeserializeOwned,
    {
        if self.payload.is_empty() {
            return Ok(None);
        }
        codec.decode(&self.payload).map(Some)
    }
}

pub(crate) fn record_key(action: &str, token: &str) -> String {
    format!("{}/{}", action, token)
}

/// Serialization boundary for record payloads
///
/// The store only ever sees the encoded text.
pub trait PayloadCodec {
    fn encode<T: Serialize>(&self, data: &T) -> Result<String>;
    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T>;
}

/// JSON codec with sorted object keys
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn encode<T: Serialize>(&self, data: &T) -> Result<String> {
        // serde_json::Map is ordered by key, so going through Value sorts
        // the keys of every nested object.
        let value = serde_json::to_value(data)?;
        Ok(serde_json::to_string(&value)?)
    }

    fn decode<T: DeserializeOwned>(&self, text: &str) -> Result<T> {
        Ok(serde_json::from_str(text)?)
    }
}

/// Request payload for creating a private URL
///
/// # Example
/// ```json
/// {
///   "action": "confirm-email",
///   "owner": "user_123",
///   "expire_in_secs": 86400,
///   "payload": {"email": "user@example.com"},
///   "hits_limit": 1,
///   "token_size": [16, 32]
/// }
/// ```
#[derive(Deserialize, Debug, Default)]
pub struct CreateRequest {
    pub action: String,
    pub owner: Option<String>,

    /// Absolute expiration time; takes precedence over `expire_in_secs`
    pub expire_at: Option<DateTime<Utc>>,

    /// Expiration relative to the time of the request
    pub expire_in_secs: Option<i64>,

    pub payload: Option<serde_json::Value>,

    /// Defaults to 1
    pub hits_limit: Option<u32>,

    #[serde(default)]
    pub auto_delete: bool,

    pub token_size: Option<TokenSize>,
    pub dashed_piece_size: Option<i64>,

    /// Remove existing records of the same action and owner first
    #[serde(default)]
    pub replace: bool,
}

/// Response returned after successfully creating a private URL
#[derive(Serialize, Debug)]
pub struct CreateResponse {
    pub action: String,
    pub token: String,

    /// Absolute URL of the dispatch route for this token
    pub url: String,

    pub expire: Option<DateTime<Utc>>,
    pub hits_limit: u32,
    pub auto_delete: bool,
    pub created: DateTime<Utc>,
}

/// A record as listed by the management API
#[derive(Serialize, Debug)]
pub struct RecordView {
    #[serde(flatten)]
    pub record: PrivateUrlRecord,
    pub used: String,
    pub available: bool,
}

/// Query parameters for listing records
///
/// # Example
/// Query string: `?action=confirm-email&owner=user_123&page=2&limit=20`
#[derive(Deserialize, Debug, Default)]
pub struct ListParams {
    pub action: Option<String>,
    pub owner: Option<String>,

    /// Starts from 1
    pub page: Option<usize>,

    /// Defaults to 10, maximum is 100
    pub limit: Option<usize>,
}

/// Query parameters for deleting a record
#[derive(Deserialize, Debug, Default)]
pub struct DeleteParams {
    /// When given, the record's owner must match
    pub owner: Option<String>,
}
