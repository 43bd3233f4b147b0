//! Encrypt-before-write, decrypt-after-read persistence for diary entries
//! and chat transcripts.

use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::chat::ChatMessage;
use crate::crypto::{Cipher, Envelope, KdfParams};
use crate::error::{CryptoError, JournalError};
use crate::search;
use crate::store::{CHATS, DocumentStore, ENTRIES, FieldValue, Fields, OrderBy, Record};

/// A decrypted diary entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiaryEntry {
    pub id: String,
    pub content: String,
    pub date: NaiveDate,
    pub owner_id: String,
}

/// An entry record that could not be decrypted or parsed.
#[derive(Debug)]
pub struct EntryFailure {
    pub id: String,
    /// The record's day, when its `date` field is readable.
    pub date: Option<NaiveDate>,
    pub error: JournalError,
}

/// Result of a bulk load: decrypted entries, newest first, plus the records
/// that failed. One bad record never hides the others.
#[derive(Debug, Default)]
pub struct EntryBatch {
    pub entries: Vec<DiaryEntry>,
    pub failures: Vec<EntryFailure>,
}

impl EntryBatch {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn for_date(&self, date: NaiveDate) -> Option<&DiaryEntry> {
        self.entries.iter().find(|e| e.date == date)
    }

    /// The failure for a record dated `date`, if one could not be opened.
    pub fn failure_for_date(&self, date: NaiveDate) -> Option<&EntryFailure> {
        self.failures.iter().find(|f| f.date == Some(date))
    }
}

/// Stored timestamp for a calendar day: midnight UTC.
pub fn day_timestamp(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(chrono::NaiveTime::MIN).and_utc()
}

fn text(name: &str, value: impl Into<FieldValue>) -> (String, FieldValue) {
    (name.to_string(), value.into())
}

fn envelope_fields(envelope: Envelope) -> [(String, FieldValue); 3] {
    [
        text("encryptedData", envelope.ciphertext),
        text("salt", envelope.salt),
        text("iv", envelope.iv),
    ]
}

fn envelope_of(record: &Record) -> Result<Envelope, JournalError> {
    let field = |name: &str| {
        record
            .text(name)
            .map(str::to_string)
            .ok_or_else(|| JournalError::MalformedRecord {
                id: record.id.clone(),
                reason: format!("missing text field '{name}'"),
            })
    };
    Ok(Envelope {
        ciphertext: field("encryptedData")?,
        salt: field("salt")?,
        iv: field("iv")?,
    })
}

/// Persistence adapter over a [`DocumentStore`].
///
/// Keys are derived afresh for every seal and open; nothing derived from the
/// secret outlives a single call.
pub struct Journal<S: DocumentStore> {
    store: Arc<S>,
    cipher: Cipher,
}

impl<S: DocumentStore> Journal<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self::with_kdf(store, KdfParams::default())
    }

    /// Every reader and writer of a store must use the same parameters.
    pub fn with_kdf(store: Arc<S>, kdf: KdfParams) -> Self {
        Self {
            store,
            cipher: Cipher::new(kdf),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Saves the entry for `date`, overwriting the owner's existing entry for
    /// that day if there is one. Returns the record id.
    ///
    /// The new envelope is sealed before anything is written, so a failure
    /// leaves the stored entry untouched.
    pub async fn save_entry(
        &self,
        owner_id: &str,
        content: &str,
        date: NaiveDate,
        secret: &str,
    ) -> Result<String, JournalError> {
        let day = day_timestamp(date);
        let envelope = self.cipher.seal(content, secret)?;
        let now = Utc::now();

        let existing = self
            .store
            .query_by_field(ENTRIES, "userId", &owner_id.into(), None)
            .await
            .map_err(JournalError::store("find entry by date"))?
            .into_iter()
            .filter(|r| r.timestamp("date") == Some(day))
            .collect::<Vec<_>>();

        if existing.len() > 1 {
            warn!(owner_id, %date, count = existing.len(), "several entries share one day");
        }

        match existing.into_iter().next() {
            Some(record) => {
                let mut fields: Fields = envelope_fields(envelope).into_iter().collect();
                fields.extend([text("date", day), text("updatedAt", now)]);
                self.store
                    .update(ENTRIES, &record.id, fields)
                    .await
                    .map_err(JournalError::store("update entry"))?;
                debug!(owner_id, id = %record.id, %date, "entry updated");
                Ok(record.id)
            }
            None => {
                let mut fields: Fields = envelope_fields(envelope).into_iter().collect();
                fields.extend([
                    text("userId", owner_id),
                    text("date", day),
                    text("createdAt", now),
                    text("updatedAt", now),
                ]);
                let id = self
                    .store
                    .create(ENTRIES, fields)
                    .await
                    .map_err(JournalError::store("create entry"))?;
                debug!(owner_id, %id, %date, "entry created");
                Ok(id)
            }
        }
    }

    /// Loads and decrypts every entry of `owner_id`, newest first.
    ///
    /// Records that fail to open are reported in [`EntryBatch::failures`];
    /// only store errors fail the whole call.
    pub async fn load_entries(
        &self,
        owner_id: &str,
        secret: &str,
    ) -> Result<EntryBatch, JournalError> {
        let records = self
            .store
            .query_by_field(
                ENTRIES,
                "userId",
                &owner_id.into(),
                Some(OrderBy::descending("date")),
            )
            .await
            .map_err(JournalError::store("load entries"))?;

        let mut batch = EntryBatch::default();
        for record in records {
            match self.open_entry(&record, owner_id, secret) {
                Ok(entry) => batch.entries.push(entry),
                Err(error) => {
                    warn!(owner_id, id = %record.id, %error, "skipping unreadable entry");
                    batch.failures.push(EntryFailure {
                        date: record.timestamp("date").map(|t| t.date_naive()),
                        id: record.id,
                        error,
                    });
                }
            }
        }

        debug!(
            owner_id,
            loaded = batch.entries.len(),
            failed = batch.failures.len(),
            "entries loaded"
        );
        Ok(batch)
    }

    fn open_entry(
        &self,
        record: &Record,
        owner_id: &str,
        secret: &str,
    ) -> Result<DiaryEntry, JournalError> {
        let date = record
            .timestamp("date")
            .ok_or_else(|| JournalError::MalformedRecord {
                id: record.id.clone(),
                reason: "missing timestamp field 'date'".into(),
            })?
            .date_naive();
        let content = self.cipher.open(&envelope_of(record)?, secret)?;

        Ok(DiaryEntry {
            id: record.id.clone(),
            content,
            date,
            owner_id: owner_id.to_string(),
        })
    }

    /// Deletes one of `owner_id`'s entries.
    pub async fn delete_entry(&self, owner_id: &str, entry_id: &str) -> Result<(), JournalError> {
        let record = self
            .store
            .get_by_id(ENTRIES, entry_id)
            .await
            .map_err(JournalError::store("find entry"))?;

        match record {
            Some(r) if r.text("userId") == Some(owner_id) => {
                self.store
                    .delete(ENTRIES, entry_id)
                    .await
                    .map_err(JournalError::store("delete entry"))?;
                debug!(owner_id, id = entry_id, "entry deleted");
                Ok(())
            }
            _ => Err(JournalError::EntryNotFound(entry_id.to_string())),
        }
    }

    /// Loads the owner's entries and keeps those matching `query`.
    pub async fn search_entries(
        &self,
        owner_id: &str,
        secret: &str,
        query: &str,
    ) -> Result<EntryBatch, JournalError> {
        let mut batch = self.load_entries(owner_id, secret).await?;
        batch.entries = search::filter_entries(batch.entries, query);
        Ok(batch)
    }

    /// Replaces the owner's whole chat transcript with `messages`.
    pub async fn save_chat_history(
        &self,
        owner_id: &str,
        messages: &[ChatMessage],
        secret: &str,
    ) -> Result<(), JournalError> {
        let transcript = zeroize::Zeroizing::new(serde_json::to_string(messages)?);
        let envelope = self.cipher.seal(&transcript, secret)?;
        let now = Utc::now();

        let created_at = self
            .store
            .get_by_id(CHATS, owner_id)
            .await
            .map_err(JournalError::store("find chat history"))?
            .and_then(|r| r.timestamp("createdAt"))
            .unwrap_or(now);

        let mut fields: Fields = envelope_fields(envelope).into_iter().collect();
        fields.extend([
            text("userId", owner_id),
            text("createdAt", created_at),
            text("updatedAt", now),
        ]);
        self.store
            .put(CHATS, owner_id, fields)
            .await
            .map_err(JournalError::store("save chat history"))?;

        debug!(owner_id, messages = messages.len(), "chat history saved");
        Ok(())
    }

    /// Loads the owner's chat transcript.
    ///
    /// A missing record is created empty; an empty record yields no messages
    /// without attempting to decrypt.
    pub async fn load_chat_history(
        &self,
        owner_id: &str,
        secret: &str,
    ) -> Result<Vec<ChatMessage>, JournalError> {
        let record = self
            .store
            .get_by_id(CHATS, owner_id)
            .await
            .map_err(JournalError::store("load chat history"))?;

        let Some(record) = record else {
            let now = Utc::now();
            let placeholder = Fields::from([
                text("userId", owner_id),
                text("encryptedData", ""),
                text("salt", ""),
                text("iv", ""),
                text("createdAt", now),
                text("updatedAt", now),
            ]);
            self.store
                .put(CHATS, owner_id, placeholder)
                .await
                .map_err(JournalError::store("create chat history"))?;
            debug!(owner_id, "created empty chat history");
            return Ok(Vec::new());
        };

        if record.text("encryptedData").is_none_or(str::is_empty) {
            return Ok(Vec::new());
        }

        let transcript = zeroize::Zeroizing::new(self.cipher.open(&envelope_of(&record)?, secret)?);
        Ok(serde_json::from_str(&transcript)?)
    }

    /// Opens an arbitrary envelope with this journal's parameters.
    pub fn open(&self, envelope: &Envelope, secret: &str) -> Result<String, CryptoError> {
        self.cipher.open(envelope, secret)
    }

    /// Seals arbitrary text with this journal's parameters.
    pub fn seal(&self, plaintext: &str, secret: &str) -> Result<Envelope, CryptoError> {
        self.cipher.seal(plaintext, secret)
    }
}
