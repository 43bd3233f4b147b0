//! Base64 conversion for envelope fields.

use base64::{Engine as _, engine::general_purpose::STANDARD};

use crate::error::CryptoError;

/// Encode bytes as standard, padded base64.
pub fn encode(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64.
///
/// # Errors
///
/// Returns [`CryptoError::MalformedEncoding`] naming `field` if the input is
/// not valid base64.
pub fn decode(field: &'static str, input: &str) -> Result<Vec<u8>, CryptoError> {
    STANDARD
        .decode(input)
        .map_err(|e| CryptoError::MalformedEncoding {
            field,
            reason: e.to_string(),
        })
}

/// Decode a field that must hold exactly `N` bytes.
pub(crate) fn decode_exact<const N: usize>(
    field: &'static str,
    input: &str,
) -> Result<[u8; N], CryptoError> {
    let bytes = decode(field, input)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::MalformedEncoding {
            field,
            reason: format!("expected {N} bytes, got {len}"),
        })
}
