//! Unpadded base64url encoding for digests, nonces and pages.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;

use crate::{CryptoError, Digest, Result, DIGEST_LEN};

/// Length of a base64url-encoded 32-byte digest.
pub const DIGEST_B64_LEN: usize = 43;

/// Encode bytes as base64url without padding.
pub fn b64u_encode(bytes: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Decode unpadded base64url.
pub fn b64u_decode(encoded: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|e| CryptoError::Encoding(format!("invalid base64url: {e}")))
}

/// Decode a base64url string that must carry exactly one digest.
pub fn decode_digest(encoded: &str) -> Result<Digest> {
    let bytes = b64u_decode(encoded)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| CryptoError::InvalidInput(format!("expected {DIGEST_LEN}-byte digest, got {len}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_encodes_to_43_chars() {
        let encoded = b64u_encode(&[0xffu8; 32]);
        assert_eq!(encoded.len(), DIGEST_B64_LEN);
        assert!(!encoded.contains('='));
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
    }

    #[test]
    fn test_url_safe_alphabet() {
        assert_eq!(b64u_encode(&[0xfb, 0xff]), "-_8");
    }

    #[test]
    fn test_decode_digest_length_checked() {
        let short = b64u_encode(&[1u8; 16]);
        assert!(decode_digest(&short).is_err());

        let digest = [7u8; 32];
        let decoded = decode_digest(&b64u_encode(&digest)).expect("decode");
        assert_eq!(decoded, digest);
    }

    #[test]
    fn test_decode_rejects_padding_and_garbage() {
        assert!(b64u_decode("AA==").is_err());
        assert!(b64u_decode("not base64!").is_err());
    }
}
