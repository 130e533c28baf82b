//! Chunked streaming encryption for large files.
//!
//! Files are processed in fixed-size blocks so that content never has to
//! fit in memory. The on-disk layout is:
//!
//! ```text
//! [file nonce (24 bytes)] [u32-LE ciphertext length | ciphertext+tag]*
//! ```
//!
//! A single random file-level nonce is written once; each block is then
//! sealed under a per-block nonce derived by XORing the little-endian
//! block index into the trailing 8 bytes of the file nonce. No two
//! blocks, within a file or across files under the same key, share a
//! (key, nonce) pair. Length-prefix framing makes every block
//! independently recoverable on a second pass without look-ahead.
//!
//! Invariant, enforced on both sides: every plaintext block except the
//! last is exactly [`BLOCK_SIZE`] bytes.

use std::io::{ErrorKind, Read, Write};

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};

use crate::keys::KEY_LENGTH;
use vidvault_common::{Error, Result};

/// Plaintext block size (64 KiB, a bandwidth/latency balance).
pub const BLOCK_SIZE: usize = 64 * 1024;

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Size of the per-block ciphertext length prefix.
const LEN_PREFIX_SIZE: usize = 4;

/// Derive the nonce for a single block from the file nonce.
fn block_nonce(file_nonce: &[u8; NONCE_SIZE], index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = *file_nonce;
    let counter = index.to_le_bytes();
    for (n, c) in nonce[NONCE_SIZE - 8..].iter_mut().zip(counter) {
        *n ^= c;
    }
    nonce
}

/// Fill `buf` as far as the reader allows; short only at end of input.
fn read_block<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

/// Encrypting stream that processes data in authenticated blocks.
pub struct EncryptingStream<'a> {
    key: &'a [u8],
    block_size: usize,
}

impl<'a> EncryptingStream<'a> {
    /// Create a new encrypting stream.
    ///
    /// # Preconditions
    /// - `key` must be KEY_LENGTH bytes
    ///
    /// # Errors
    /// - Returns `InvalidKey` before any data is touched if the key
    ///   length is wrong
    pub fn new(key: &'a [u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(Error::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LENGTH,
                key.len()
            )));
        }
        Ok(Self {
            key,
            block_size: BLOCK_SIZE,
        })
    }

    /// Set a custom block size (tests only exercise this).
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Encrypt data from `reader` and write the framed ciphertext to
    /// `writer`. Returns the number of plaintext bytes consumed.
    ///
    /// # Postconditions
    /// - The file nonce is fully written before any ciphertext block
    /// - Every block except the last contains exactly `block_size`
    ///   bytes of plaintext
    ///
    /// # Errors
    /// - I/O errors from reader/writer
    /// - Encryption errors
    pub fn encrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(self.key));
        let file_nonce: [u8; NONCE_SIZE] = XChaCha20Poly1305::generate_nonce(&mut OsRng).into();
        writer.write_all(&file_nonce)?;

        let mut buffer = vec![0u8; self.block_size];
        let mut index = 0u64;
        let mut total_bytes = 0u64;

        loop {
            let filled = read_block(&mut reader, &mut buffer)?;
            if filled == 0 {
                break;
            }

            let nonce = block_nonce(&file_nonce, index);
            let ciphertext = cipher
                .encrypt(XNonce::from_slice(&nonce), &buffer[..filled])
                .map_err(|e| Error::Authentication(format!("encryption failed: {}", e)))?;

            writer.write_all(&(ciphertext.len() as u32).to_le_bytes())?;
            writer.write_all(&ciphertext)?;

            total_bytes += filled as u64;
            index += 1;

            // A short read means end of input; the loop above only
            // returns short on EOF.
            if filled < self.block_size {
                break;
            }
        }

        Ok(total_bytes)
    }
}

/// Decrypting stream that verifies and recovers framed blocks.
pub struct DecryptingStream<'a> {
    key: &'a [u8],
    block_size: usize,
}

impl<'a> DecryptingStream<'a> {
    /// Create a new decrypting stream.
    ///
    /// # Errors
    /// - Returns `InvalidKey` if the key length is wrong
    pub fn new(key: &'a [u8]) -> Result<Self> {
        if key.len() != KEY_LENGTH {
            return Err(Error::InvalidKey(format!(
                "expected {} bytes, got {}",
                KEY_LENGTH,
                key.len()
            )));
        }
        Ok(Self {
            key,
            block_size: BLOCK_SIZE,
        })
    }

    /// Set a custom block size; must match the encrypting side.
    pub fn with_block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Decrypt data from `reader` and write plaintext to `writer`.
    /// Returns the number of plaintext bytes recovered.
    ///
    /// # Postconditions
    /// - Every block is authenticated before any of its plaintext is
    ///   written; a failing block aborts the whole operation
    ///
    /// # Errors
    /// - `Authentication` on tamper, truncation, reordering, or a
    ///   malformed frame
    /// - I/O errors from reader/writer
    pub fn decrypt_stream<R: Read, W: Write>(&self, mut reader: R, mut writer: W) -> Result<u64> {
        let cipher = XChaCha20Poly1305::new(Key::from_slice(self.key));

        let mut file_nonce = [0u8; NONCE_SIZE];
        reader.read_exact(&mut file_nonce).map_err(|e| {
            if e.kind() == ErrorKind::UnexpectedEof {
                Error::Authentication("encrypted file truncated before nonce".to_string())
            } else {
                Error::Io(e)
            }
        })?;

        let max_block = self.block_size + TAG_SIZE;
        let mut ciphertext = Vec::with_capacity(max_block);
        let mut index = 0u64;
        let mut total_bytes = 0u64;
        let mut saw_short_block = false;

        loop {
            let mut prefix = [0u8; LEN_PREFIX_SIZE];
            match read_block(&mut reader, &mut prefix)? {
                0 => break,
                LEN_PREFIX_SIZE => {}
                _ => {
                    return Err(Error::Authentication(
                        "truncated block header".to_string(),
                    ))
                }
            }

            if saw_short_block {
                // Only the final block may be short; more data after it
                // means the stream was spliced or corrupted.
                return Err(Error::Authentication(
                    "data after final short block".to_string(),
                ));
            }

            let len = u32::from_le_bytes(prefix) as usize;
            if len < TAG_SIZE || len > max_block {
                return Err(Error::Authentication(format!(
                    "block {} has invalid length {}",
                    index, len
                )));
            }

            ciphertext.resize(len, 0);
            reader.read_exact(&mut ciphertext).map_err(|e| {
                if e.kind() == ErrorKind::UnexpectedEof {
                    Error::Authentication(format!("block {} truncated", index))
                } else {
                    Error::Io(e)
                }
            })?;

            let nonce = block_nonce(&file_nonce, index);
            let plaintext = cipher
                .decrypt(XNonce::from_slice(&nonce), ciphertext.as_slice())
                .map_err(|_| {
                    Error::Authentication(format!("block {} failed authentication", index))
                })?;

            if plaintext.len() < self.block_size {
                saw_short_block = true;
            }

            writer.write_all(&plaintext)?;
            total_bytes += plaintext.len() as u64;
            index += 1;
        }

        Ok(total_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Cursor;

    fn encrypt_bytes(key: &[u8], data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        let stream = EncryptingStream::new(key)?.with_block_size(block_size);
        let mut output = Vec::new();
        stream.encrypt_stream(data, &mut output)?;
        Ok(output)
    }

    fn decrypt_bytes(key: &[u8], data: &[u8], block_size: usize) -> Result<Vec<u8>> {
        let stream = DecryptingStream::new(key)?.with_block_size(block_size);
        let mut output = Vec::new();
        stream.decrypt_stream(Cursor::new(data), &mut output)?;
        Ok(output)
    }

    #[test]
    fn test_roundtrip_single_block() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = b"Hello, streaming encryption!";

        let encrypted = encrypt_bytes(&key, plaintext, BLOCK_SIZE).unwrap();
        let decrypted = decrypt_bytes(&key, &encrypted, BLOCK_SIZE).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_roundtrip_multiple_blocks() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = vec![0xAB; BLOCK_SIZE * 3 + 1000];

        let encrypted = encrypt_bytes(&key, &plaintext, BLOCK_SIZE).unwrap();
        let decrypted = decrypt_bytes(&key, &encrypted, BLOCK_SIZE).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_roundtrip_exact_block_multiple() {
        let key = [3u8; KEY_LENGTH];
        let plaintext = vec![0xCD; 1024 * 4];

        let encrypted = encrypt_bytes(&key, &plaintext, 1024).unwrap();
        let decrypted = decrypt_bytes(&key, &encrypted, 1024).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_input_is_nonce_only() {
        let key = [42u8; KEY_LENGTH];

        let encrypted = encrypt_bytes(&key, b"", BLOCK_SIZE).unwrap();
        assert_eq!(encrypted.len(), NONCE_SIZE);

        let decrypted = decrypt_bytes(&key, &encrypted, BLOCK_SIZE).unwrap();
        assert!(decrypted.is_empty());
    }

    #[test]
    fn test_framing_layout() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = vec![1u8; 100];

        let encrypted = encrypt_bytes(&key, &plaintext, BLOCK_SIZE).unwrap();

        // nonce + one frame: length prefix + ciphertext + tag
        assert_eq!(encrypted.len(), NONCE_SIZE + 4 + 100 + TAG_SIZE);
        let len = u32::from_le_bytes(encrypted[NONCE_SIZE..NONCE_SIZE + 4].try_into().unwrap());
        assert_eq!(len as usize, 100 + TAG_SIZE);
    }

    #[test]
    fn test_wrong_key_fails() {
        let key1 = [1u8; KEY_LENGTH];
        let key2 = [2u8; KEY_LENGTH];

        let encrypted = encrypt_bytes(&key1, b"secret video bytes", BLOCK_SIZE).unwrap();
        let result = decrypt_bytes(&key2, &encrypted, BLOCK_SIZE);

        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_invalid_key_length_rejected() {
        assert!(matches!(
            EncryptingStream::new(&[0u8; 16]),
            Err(Error::InvalidKey(_))
        ));
        assert!(matches!(
            DecryptingStream::new(&[0u8; 31]),
            Err(Error::InvalidKey(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = vec![7u8; 5000];

        let mut encrypted = encrypt_bytes(&key, &plaintext, 1024).unwrap();
        // Flip one byte inside the ciphertext region (past the nonce and
        // the first frame's length prefix).
        encrypted[NONCE_SIZE + 4 + 10] ^= 0xFF;

        let result = decrypt_bytes(&key, &encrypted, 1024);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_every_ciphertext_byte_is_covered() {
        let key = [5u8; KEY_LENGTH];
        let plaintext = vec![0x5A; 700];
        let encrypted = encrypt_bytes(&key, &plaintext, 256).unwrap();

        for i in NONCE_SIZE..encrypted.len() {
            let mut copy = encrypted.clone();
            copy[i] ^= 0x01;
            assert!(
                decrypt_bytes(&key, &copy, 256).is_err(),
                "flip at offset {} was not detected",
                i
            );
        }
    }

    #[test]
    fn test_reordered_blocks_fail() {
        let key = [42u8; KEY_LENGTH];
        let plaintext = vec![9u8; 512];
        let encrypted = encrypt_bytes(&key, &plaintext, 256).unwrap();

        // Two full frames of identical size; swap them.
        let frame_len = 4 + 256 + TAG_SIZE;
        let mut swapped = encrypted[..NONCE_SIZE].to_vec();
        swapped.extend_from_slice(&encrypted[NONCE_SIZE + frame_len..]);
        swapped.extend_from_slice(&encrypted[NONCE_SIZE..NONCE_SIZE + frame_len]);

        let result = decrypt_bytes(&key, &swapped, 256);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_truncated_nonce_fails() {
        let key = [42u8; KEY_LENGTH];
        let result = decrypt_bytes(&key, &[0u8; NONCE_SIZE - 1], BLOCK_SIZE);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_truncated_block_fails() {
        let key = [42u8; KEY_LENGTH];
        let encrypted = encrypt_bytes(&key, &vec![1u8; 300], 256).unwrap();

        let result = decrypt_bytes(&key, &encrypted[..encrypted.len() - 5], 256);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_data_after_short_block_fails() {
        let key = [42u8; KEY_LENGTH];

        // First stream ends in a short block; append another full frame.
        let short = encrypt_bytes(&key, &vec![1u8; 100], 256).unwrap();
        let extra = encrypt_bytes(&key, &vec![2u8; 256], 256).unwrap();
        let mut spliced = short;
        spliced.extend_from_slice(&extra[NONCE_SIZE..]);

        let result = decrypt_bytes(&key, &spliced, 256);
        assert!(matches!(result, Err(Error::Authentication(_))));
    }

    #[test]
    fn test_distinct_file_nonces() {
        let key = [42u8; KEY_LENGTH];
        let ct1 = encrypt_bytes(&key, b"same plaintext", BLOCK_SIZE).unwrap();
        let ct2 = encrypt_bytes(&key, b"same plaintext", BLOCK_SIZE).unwrap();

        assert_ne!(&ct1[..NONCE_SIZE], &ct2[..NONCE_SIZE]);
        assert_ne!(ct1, ct2);
    }

    #[test]
    fn test_block_nonce_unique_per_index() {
        let file_nonce = [0x11u8; NONCE_SIZE];
        let n0 = block_nonce(&file_nonce, 0);
        let n1 = block_nonce(&file_nonce, 1);
        let n2 = block_nonce(&file_nonce, 2);

        assert_eq!(n0, file_nonce);
        assert_ne!(n0, n1);
        assert_ne!(n1, n2);
        // The leading bytes stay untouched.
        assert_eq!(&n1[..NONCE_SIZE - 8], &file_nonce[..NONCE_SIZE - 8]);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_roundtrip(data in proptest::collection::vec(any::<u8>(), 0..20_000)) {
            let key = [77u8; KEY_LENGTH];
            let encrypted = encrypt_bytes(&key, &data, 1024).unwrap();
            let decrypted = decrypt_bytes(&key, &encrypted, 1024).unwrap();
            prop_assert_eq!(decrypted, data);
        }
    }
}
