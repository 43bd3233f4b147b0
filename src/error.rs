//! Error types for every layer of the journal.

use thiserror::Error;

/// Failures of the envelope cipher and its helpers.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// An envelope field is not valid base64 or decodes to the wrong length.
    #[error("malformed encoding in {field}: {reason}")]
    MalformedEncoding { field: &'static str, reason: String },

    /// Tag verification failed: wrong secret or tampered envelope.
    #[error("authentication failed: wrong secret or corrupted data")]
    AuthenticationFailed,

    /// Decrypted bytes are not valid UTF-8.
    #[error("decrypted data is not valid text")]
    InvalidPlaintext,

    /// The OS random source or the cipher could not be used.
    #[error("cryptographic primitives unavailable: {0}")]
    CryptoUnavailable(String),

    #[error("invalid key derivation parameters: {0}")]
    InvalidKdfParams(String),
}

/// Failures reported by a [`DocumentStore`](crate::DocumentStore).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("document '{id}' not found in '{collection}'")]
    NotFound { collection: String, id: String },

    #[error("unsupported store file version: {0}")]
    UnsupportedVersion(u32),

    #[error("OS random generator unavailable")]
    Random,
}

/// Failures of the language-model collaborator.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat engine has been shut down")]
    ShutDown,

    #[error("chat engine failed: {0}")]
    Engine(String),
}

/// Failures of the persistence adapter.
#[derive(Debug, Error)]
pub enum JournalError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("{operation} failed: {source}")]
    Store {
        operation: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("record '{id}' is malformed: {reason}")]
    MalformedRecord { id: String, reason: String },

    #[error("chat transcript is not valid JSON: {0}")]
    Transcript(#[from] serde_json::Error),

    #[error("entry '{0}' not found")]
    EntryNotFound(String),

    #[error(transparent)]
    Chat(#[from] ChatError),

    #[error("message is empty")]
    EmptyMessage,
}

impl JournalError {
    pub(crate) fn store(operation: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| JournalError::Store { operation, source }
    }
}

/// Failures around the secret lifecycle of an account.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("no encryption key stored for user '{0}'")]
    SecretMissing(String),

    #[error("user '{0}' is already registered")]
    AlreadyRegistered(String),
}
