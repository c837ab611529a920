//! AES-256-CBC page cipher.
//!
//! Used by the memory-hard page mixer. The cipher encrypts with PKCS#7
//! padding and hands back only the first `out_len` ciphertext bytes, so for
//! block-aligned pages the result is plain CBC without the padding block.

use aes::cipher::{generic_array::GenericArray, BlockEncrypt, KeyInit};
use aes::Aes256;

use crate::{CryptoError, Result};

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// AES-256 key size in bytes.
pub const KEY_SIZE: usize = 32;

/// An imported AES-256 key, reusable across any number of encryptions.
#[derive(Clone)]
pub struct CbcCipher {
    cipher: Aes256,
}

impl std::fmt::Debug for CbcCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CbcCipher").finish_non_exhaustive()
    }
}

impl CbcCipher {
    /// Import a 32-byte AES-256 key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256::new(GenericArray::from_slice(key)),
        }
    }

    /// Import a key from an arbitrary slice, which must be exactly 32 bytes.
    pub fn from_slice(key: &[u8]) -> Result<Self> {
        let key: &[u8; KEY_SIZE] = key.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;
        Ok(Self::new(key))
    }

    /// CBC-encrypt `input` under `iv` with PKCS#7 padding and return the
    /// first `out_len` bytes of the ciphertext.
    ///
    /// Only the blocks needed to cover `out_len` are encrypted. `out_len`
    /// may not exceed the padded ciphertext length.
    pub fn encrypt_truncated(
        &self,
        iv: &[u8; BLOCK_SIZE],
        input: &[u8],
        out_len: usize,
    ) -> Result<Vec<u8>> {
        let padded_len = (input.len() / BLOCK_SIZE + 1) * BLOCK_SIZE;
        if out_len > padded_len {
            return Err(CryptoError::InvalidInput(format!(
                "requested {out_len} bytes from a {padded_len}-byte ciphertext"
            )));
        }

        let blocks = out_len.div_ceil(BLOCK_SIZE);
        let mut out = Vec::with_capacity(blocks * BLOCK_SIZE);
        let mut chain = *iv;

        for block_index in 0..blocks {
            let start = block_index * BLOCK_SIZE;
            let mut block = [0u8; BLOCK_SIZE];
            for (j, byte) in block.iter_mut().enumerate() {
                *byte = match input.get(start + j) {
                    Some(b) => *b,
                    // PKCS#7 pad byte, always in 1..=16.
                    None => (padded_len - input.len()) as u8,
                };
            }
            for (b, c) in block.iter_mut().zip(chain.iter()) {
                *b ^= c;
            }
            let mut ga = GenericArray::from(block);
            self.cipher.encrypt_block(&mut ga);
            chain.copy_from_slice(&ga);
            out.extend_from_slice(&ga);
        }

        out.truncate(out_len);
        Ok(out)
    }
}
