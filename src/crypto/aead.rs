use super::{IV_LEN, KEY_LEN, SALT_LEN, codec};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Fill buffer with cryptographically secure random bytes
fn secure_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    fill(buf).map_err(|e| CryptoError::CryptoUnavailable(format!("OS random generator: {e}")))
}

/// Generate salt
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    secure_random(&mut salt)?;
    Ok(salt)
}

/// Generate nonce
pub fn generate_iv() -> Result<[u8; IV_LEN], CryptoError> {
    let mut iv = [0u8; IV_LEN];
    secure_random(&mut iv)?;
    Ok(iv)
}

/// Generate the 256-bit secret handed to a new account, as base64.
pub fn generate_user_secret() -> Result<Zeroizing<String>, CryptoError> {
    let mut raw = Zeroizing::new([0u8; KEY_LEN]);
    secure_random(raw.as_mut())?;
    Ok(Zeroizing::new(codec::encode(raw.as_ref())))
}

fn cipher(key: &[u8]) -> Result<Aes256Gcm, CryptoError> {
    Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::CryptoUnavailable(format!("AES-256-GCM needs a {KEY_LEN}-byte key")))
}

/// Encrypt plaintext. The result is ciphertext followed by the 16-byte tag.
pub fn encrypt(key: &[u8], iv: &[u8; IV_LEN], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    cipher(key)?
        .encrypt(Nonce::from_slice(iv), plaintext)
        .map_err(|_| CryptoError::CryptoUnavailable("AES-256-GCM encryption failed".into()))
}

/// Decrypt and verify ciphertext
pub fn decrypt(
    key: &[u8],
    iv: &[u8; IV_LEN],
    ciphertext: &[u8],
) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let plaintext = cipher(key)?
        .decrypt(Nonce::from_slice(iv), ciphertext)
        .map_err(|_| CryptoError::AuthenticationFailed)?;
    Ok(Zeroizing::new(plaintext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn salts_and_ivs_are_fresh() {
        assert_ne!(generate_salt().unwrap(), generate_salt().unwrap());
        assert_ne!(generate_iv().unwrap(), generate_iv().unwrap());
    }

    #[test]
    fn user_secret_is_256_bits_of_base64() {
        let secret = generate_user_secret().unwrap();
        assert_eq!(secret.len(), 44);
        assert_eq!(codec::decode("secret", &secret).unwrap().len(), KEY_LEN);
        assert_ne!(*secret, *generate_user_secret().unwrap());
    }

    #[test]
    fn encrypt_appends_tag() {
        let key = [3u8; KEY_LEN];
        let iv = [4u8; IV_LEN];
        let ciphertext = encrypt(&key, &iv, b"hello").unwrap();
        assert_eq!(ciphertext.len(), 5 + 16);
        assert_eq!(*decrypt(&key, &iv, &ciphertext).unwrap(), b"hello");
    }

    #[test]
    fn decrypt_with_other_iv_fails() {
        let key = [3u8; KEY_LEN];
        let ciphertext = encrypt(&key, &[4u8; IV_LEN], b"hello").unwrap();
        assert!(matches!(
            decrypt(&key, &[5u8; IV_LEN], &ciphertext),
            Err(CryptoError::AuthenticationFailed)
        ));
    }

    #[test]
    fn short_key_is_reported_not_panicking() {
        assert!(matches!(
            encrypt(&[0u8; 8], &[0u8; IV_LEN], b"x"),
            Err(CryptoError::CryptoUnavailable(_))
        ));
    }
}
