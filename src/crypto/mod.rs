//! Client-side envelope encryption.
//!
//! Provides the base64 codec, PBKDF2 key derivation, AES-256-GCM
//! primitives and the envelope `seal`/`open` operations built on them.

pub mod aead;
pub mod codec;
pub mod envelope;
pub mod kdf;

pub use aead::{decrypt, encrypt, generate_iv, generate_salt, generate_user_secret};
pub use envelope::{Cipher, Envelope, open, seal};
pub use kdf::{KdfParams, SymmetricKey, derive_key};

/// Length of the key derivation salt (16 bytes).
pub const SALT_LEN: usize = 16;
/// Length of the AES-GCM nonce (12 bytes).
pub const IV_LEN: usize = 12;
/// Length of the derived key and of the user secret (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// PBKDF2 iteration count shared by every reader and writer of a store.
pub const PBKDF2_ITERATIONS: u32 = 100_000;
