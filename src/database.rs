//! Record storage on top of the embedded redb database
//!
//! Records live in a single table keyed by `"{action}/{token}"`. Neither slug
//! may contain a `/`, so the key is unique exactly when the pair is, and all
//! tokens of one action form a contiguous key range.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use crate::availability::is_available;
use crate::error::{Error, Result};
use crate::model::{record_key, PrivateUrlRecord};

/// Main table for private URL records
///
/// Key: `"{action}/{token}"`, e.g. `"confirm-email/aZ3kQ9pLm2xR"`
/// Value: JSON-serialized `PrivateUrlRecord`
pub const TABLE_PRIVATE_URLS: TableDefinition<&str, &str> = TableDefinition::new("privateurl_v1");

type UrlTable<'txn> = redb::Table<'txn, &'static str, &'static str>;

/// Creates or opens the database file and makes sure the table exists
///
/// # Example
///
/// ```no_run
/// # use privateurl::database::init_db;
/// let db = init_db("data.db").expect("Failed to initialize database");
/// ```
pub fn init_db(db_path: &str) -> std::result::Result<Database, redb::Error> {
    let db = Database::create(db_path)?;

    let write_txn = db.begin_write()?;
    {
        write_txn.open_table(TABLE_PRIVATE_URLS)?;
    }
    write_txn.commit()?;

    Ok(db)
}

/// Individually updatable record fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordField {
    Owner,
    Expire,
    Payload,
    HitsLimit,
    HitCounter,
    FirstHit,
    LastHit,
    AutoDelete,
}

impl RecordField {
    fn copy(self, from: &PrivateUrlRecord, to: &mut PrivateUrlRecord) {
        match self {
            RecordField::Owner => to.owner = from.owner.clone(),
            RecordField::Expire => to.expire = from.expire,
            RecordField::Payload => to.payload = from.payload.clone(),
            RecordField::HitsLimit => to.hits_limit = from.hits_limit,
            RecordField::HitCounter => to.hit_counter = from.hit_counter,
            RecordField::FirstHit => to.first_hit = from.first_hit,
            RecordField::LastHit => to.last_hit = from.last_hit,
            RecordField::AutoDelete => to.auto_delete = from.auto_delete,
        }
    }
}

/// Fields written by a counted hit
const HIT_FIELDS: [RecordField; 3] = [
    RecordField::HitCounter,
    RecordField::FirstHit,
    RecordField::LastHit,
];

/// Result of an atomic hit, carrying the row as it is after the transaction
#[derive(Debug, Clone, PartialEq)]
pub enum StoredHit {
    /// Counter incremented and written back
    Counted(PrivateUrlRecord),
    /// Counter incremented, the record became unavailable and was removed
    Deleted(PrivateUrlRecord),
    /// The row was already unavailable; nothing was written
    Refused(PrivateUrlRecord),
    /// No row for this key
    Missing,
}

/// Thread-safe handle to the record table
#[derive(Clone)]
pub struct RecordStore {
    db: Arc<Database>,
}

impl RecordStore {
    /// Wraps a database previously prepared by [`init_db`]
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn open(db_path: &str) -> Result<Self> {
        Ok(Self::new(init_db(db_path)?))
    }

    /// Looks up a record. A miss is `Ok(None)`.
    pub fn find(&self, action: &str, token: &str) -> Result<Option<PrivateUrlRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_PRIVATE_URLS)?;

        let found = match table.get(record_key(action, token).as_str())? {
            Some(value) => Some(decode(value.value())?),
            None => None,
        };
        Ok(found)
    }

    /// Inserts a new record, failing with [`Error::DuplicateToken`] if the
    /// `(action, token)` pair is taken. The check and the write share one
    /// write transaction.
    pub fn insert(&self, record: &mut PrivateUrlRecord) -> Result<()> {
        let key = record.key();

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(TABLE_PRIVATE_URLS)?;

            if table.get(key.as_str())?.is_some() {
                return Err(Error::DuplicateToken {
                    action: record.action.clone(),
                    token: record.token.clone(),
                });
            }

            save(&mut table, record)?;
        }
        write_txn.commit()?;

        record.persisted = true;
        Ok(())
    }

    /// Writes only the named fields of `record` over the stored row.
    ///
    /// Fields not listed keep whatever value the row currently holds, so
    /// concurrent changes to them are not overwritten. Returns `false` if
    /// the row does not exist.
    pub fn update_fields(&self, record: &PrivateUrlRecord, fields: &[RecordField]) -> Result<bool> {
        let key = record.key();

        let write_txn = self.db.begin_write()?;
        let updated = {
            let mut table = write_txn.open_table(TABLE_PRIVATE_URLS)?;
            let merged = apply_fields(&mut table, &key, record, fields)?;
            merged.is_some()
        };
        write_txn.commit()?;

        Ok(updated)
    }

    /// Removes a record, returning whether it existed
    pub fn delete(&self, action: &str, token: &str) -> Result<bool> {
        let key = record_key(action, token);

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TABLE_PRIVATE_URLS)?;
            let existed = table.remove(key.as_str())?.is_some();
            existed
        };
        write_txn.commit()?;

        Ok(removed)
    }

    /// Removes every record of `action` owned by `owner`, returning the count
    pub fn delete_where(&self, action: &str, owner: &str) -> Result<usize> {
        let (start, end) = action_range(action);

        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(TABLE_PRIVATE_URLS)?;

            let mut keys = Vec::new();
            for entry in table.range(start.as_str()..end.as_str())? {
                let (key, value) = entry?;
                let record = decode(value.value())?;
                if record.owner.as_deref() == Some(owner) {
                    keys.push(key.value().to_string());
                }
            }

            for key in &keys {
                table.remove(key.as_str())?;
            }
            keys.len()
        };
        write_txn.commit()?;

        Ok(removed)
    }

    /// Increments the hit counter of the stored row in a single write
    /// transaction.
    ///
    /// redb runs one write transaction at a time, so two concurrent hits on
    /// the same row always see each other's increment. With `gate` set, a
    /// row that is already unavailable at `now` is refused untouched. A row
    /// that becomes unavailable through this hit is removed when it has
    /// `auto_delete`; otherwise `hit_counter`, `last_hit` and, on the first
    /// hit, `first_hit` are written through the same field-wise merge as
    /// [`update_fields`](Self::update_fields).
    pub fn increment_hit(
        &self,
        action: &str,
        token: &str,
        now: DateTime<Utc>,
        gate: bool,
    ) -> Result<StoredHit> {
        let key = record_key(action, token);

        let write_txn = self.db.begin_write()?;
        let outcome = {
            let mut table = write_txn.open_table(TABLE_PRIVATE_URLS)?;

            match load(&table, &key)? {
                None => StoredHit::Missing,
                Some(stored) if gate && !is_available(&stored, now) => StoredHit::Refused(stored),
                Some(mut stored) => {
                    stored.hit_counter = stored.hit_counter.saturating_add(1);

                    if stored.auto_delete && !is_available(&stored, now) {
                        table.remove(key.as_str())?;
                        stored.persisted = false;
                        StoredHit::Deleted(stored)
                    } else {
                        stored.last_hit = Some(now);
                        if stored.first_hit.is_none() {
                            stored.first_hit = Some(now);
                        }
                        match apply_fields(&mut table, &key, &stored, &HIT_FIELDS)? {
                            Some(merged) => StoredHit::Counted(merged),
                            None => StoredHit::Missing,
                        }
                    }
                }
            }
        };
        write_txn.commit()?;

        Ok(outcome)
    }

    /// Lists records, optionally restricted to one action and/or owner
    ///
    /// Records are returned in key order. Filtering by action uses a range
    /// query; without an action the whole table is scanned.
    pub fn list(
        &self,
        action: Option<&str>,
        owner: Option<&str>,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<PrivateUrlRecord>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(TABLE_PRIVATE_URLS)?;

        let bounds = action.map(action_range);
        let entries = match &bounds {
            Some((start, end)) => table.range(start.as_str()..end.as_str())?,
            None => table.iter()?,
        };

        let mut records = Vec::new();
        for entry in entries {
            let (_, value) = entry?;
            let record = decode(value.value())?;
            if owner.is_none() || record.owner.as_deref() == owner {
                records.push(record);
            }
        }

        Ok(records.into_iter().skip(offset).take(limit).collect())
    }
}

/// Key bounds covering every token of `action`.
///
/// `'0'` is the character right after `'/'`, so `"{action}/".."{action}0"`
/// holds exactly the keys starting with `"{action}/"`.
fn action_range(action: &str) -> (String, String) {
    (format!("{}/", action), format!("{}0", action))
}

fn decode(value: &str) -> Result<PrivateUrlRecord> {
    let mut record: PrivateUrlRecord = serde_json::from_str(value)?;
    record.persisted = true;
    Ok(record)
}

fn load(table: &UrlTable<'_>, key: &str) -> Result<Option<PrivateUrlRecord>> {
    match table.get(key)? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

/// Copies `fields` of `source` onto the stored row at `key` and writes it
/// back, returning the merged row. `None` if the row does not exist.
fn apply_fields(
    table: &mut UrlTable<'_>,
    key: &str,
    source: &PrivateUrlRecord,
    fields: &[RecordField],
) -> Result<Option<PrivateUrlRecord>> {
    let Some(mut stored) = load(table, key)? else {
        return Ok(None);
    };
    for field in fields {
        field.copy(source, &mut stored);
    }
    save(table, &stored)?;
    Ok(Some(stored))
}

fn save(table: &mut UrlTable<'_>, record: &PrivateUrlRecord) -> Result<()> {
    let json = serde_json::to_string(record)?;
    table.insert(record.key().as_str(), json.as_str())?;
    Ok(())
}
