//! Personal journal with client-side envelope encryption.
//!
//! Diary entries and chat transcripts are sealed with AES-256-GCM under a key
//! derived (PBKDF2-HMAC-SHA256) from the user's secret and a fresh salt
//! before they reach the [`DocumentStore`].

pub mod chat;
pub mod crypto;
mod error;
pub mod journal;
pub mod search;
pub mod session;
mod storage;
pub mod store;

pub use crate::chat::{ChatEngine, ChatMessage, Companion, Conversation, EngineHandle, Role};
pub use crate::crypto::{Cipher, Envelope, KdfParams, open, seal};
pub use crate::error::{AccountError, ChatError, CryptoError, JournalError, StoreError};
pub use crate::journal::{DiaryEntry, EntryBatch, EntryFailure, Journal};
pub use crate::session::{Accounts, AuthState, Session, UserSecret};
pub use crate::storage::FileStore;
pub use crate::store::{DocumentStore, FieldValue, Fields, MemoryStore, OrderBy, Record};

use directories::ProjectDirs;
use std::path::PathBuf;

/// `<platform data dir>/diarist.json`, or `None` if the platform has no
/// home directory.
pub fn default_store_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "diarist").map(|dirs| dirs.data_dir().join("diarist.json"))
}
