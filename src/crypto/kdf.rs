use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroizing;

use super::{KEY_LEN, PBKDF2_ITERATIONS};
use crate::error::CryptoError;

/// A derived AES-256 key, wiped when dropped.
pub type SymmetricKey = Zeroizing<[u8; KEY_LEN]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: PBKDF2_ITERATIONS,
        }
    }
}

impl KdfParams {
    /// Custom iteration count. Envelopes do not record it, so data sealed
    /// with one value can only be opened with the same value.
    pub fn new(iterations: u32) -> Result<Self, CryptoError> {
        let params = Self { iterations };
        params.validate()?;
        Ok(params)
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    pub fn validate(&self) -> Result<(), CryptoError> {
        if self.iterations < 1 {
            return Err(CryptoError::InvalidKdfParams(
                "pbkdf2 iterations must be >= 1".into(),
            ));
        }
        Ok(())
    }
}

/// Derive the AES-256-GCM key for one envelope from the user secret and the
/// envelope's salt. PBKDF2-HMAC-SHA256, recomputed on every call.
pub fn derive_key(secret: &str, salt: &[u8], kdf: KdfParams) -> Result<SymmetricKey, CryptoError> {
    kdf.validate()?;

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, kdf.iterations, key.as_mut());

    Ok(key)
}
