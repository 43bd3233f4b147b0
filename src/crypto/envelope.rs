//! Sealed envelopes: one plaintext blob encrypted under a key derived from
//! the user secret and a per-envelope salt.
//!
//! Every call to [`Cipher::seal`] draws a new salt and a new nonce, so two
//! envelopes never share a `(key, iv)` pair even for identical input.

use serde::{Deserialize, Serialize};

use super::{IV_LEN, KdfParams, SALT_LEN, aead, codec, derive_key};
use crate::error::CryptoError;

/// Base64-encoded ciphertext, salt and nonce, as stored in a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "encryptedData")]
    pub ciphertext: String,
    pub salt: String,
    pub iv: String,
}

/// Seals and opens envelopes with a fixed set of KDF parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cipher {
    kdf: KdfParams,
}

impl Cipher {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn kdf(&self) -> KdfParams {
        self.kdf
    }

    pub fn seal(&self, plaintext: &str, secret: &str) -> Result<Envelope, CryptoError> {
        let salt = aead::generate_salt()?;
        let iv = aead::generate_iv()?;
        let key = derive_key(secret, &salt, self.kdf)?;

        let ciphertext = aead::encrypt(key.as_ref(), &iv, plaintext.as_bytes())?;

        Ok(Envelope {
            ciphertext: codec::encode(&ciphertext),
            salt: codec::encode(&salt),
            iv: codec::encode(&iv),
        })
    }

    pub fn open(&self, envelope: &Envelope, secret: &str) -> Result<String, CryptoError> {
        let salt = codec::decode_exact::<SALT_LEN>("salt", &envelope.salt)?;
        let iv = codec::decode_exact::<IV_LEN>("iv", &envelope.iv)?;
        let ciphertext = codec::decode("encryptedData", &envelope.ciphertext)?;

        let key = derive_key(secret, &salt, self.kdf)?;
        let plaintext = aead::decrypt(key.as_ref(), &iv, &ciphertext)?;

        String::from_utf8(plaintext.to_vec()).map_err(|_| CryptoError::InvalidPlaintext)
    }
}

/// Seal with the default KDF parameters.
pub fn seal(plaintext: &str, secret: &str) -> Result<Envelope, CryptoError> {
    Cipher::default().seal(plaintext, secret)
}

/// Open with the default KDF parameters.
pub fn open(envelope: &Envelope, secret: &str) -> Result<String, CryptoError> {
    Cipher::default().open(envelope, secret)
}
