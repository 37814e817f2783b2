//! Locked artifact format (`.dma`, version 3)
//!
//! ```text
//! [4 bytes:  magic "DMA3"]
//! [4 bytes:  Argon2id memory cost KiB, u32 LE]
//! [4 bytes:  Argon2id time cost, u32 LE]
//! [4 bytes:  Argon2id parallelism, u32 LE]
//! [16 bytes: salt]
//! [24 bytes: random nonce]
//! [N bytes:  ciphertext of zstd(plaintext)][16 bytes: Poly1305 tag]
//! AAD = the 56 header bytes above
//! ```
//!
//! Binding the header as AAD means a flipped KDF parameter or salt fails
//! authentication just like a flipped ciphertext byte.

use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    XChaCha20Poly1305, XNonce,
};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::kdf::KdfParams;
use crate::keyring::KeyRing;
use crate::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Artifact magic; bump the digit when the layout changes
pub const MAGIC: &[u8; 4] = b"DMA3";

/// Serialized header length
pub const HEADER_LEN: usize = 4 + 4 * 3 + SALT_SIZE + NONCE_SIZE;

/// zstd level used before encryption
pub const COMPRESSION_LEVEL: i32 = 3;

/// Parsed artifact header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub params: KdfParams,
    pub salt: [u8; SALT_SIZE],
    pub nonce: [u8; NONCE_SIZE],
}

impl Header {
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[..4].copy_from_slice(MAGIC);
        out[4..8].copy_from_slice(&self.params.mem_cost_kib.to_le_bytes());
        out[8..12].copy_from_slice(&self.params.time_cost.to_le_bytes());
        out[12..16].copy_from_slice(&self.params.parallelism.to_le_bytes());
        out[16..16 + SALT_SIZE].copy_from_slice(&self.salt);
        out[16 + SALT_SIZE..].copy_from_slice(&self.nonce);
        out
    }

    /// Parse the header at the start of an artifact.
    pub fn parse(blob: &[u8]) -> anyhow::Result<Self> {
        if blob.len() < HEADER_LEN + TAG_SIZE {
            anyhow::bail!(
                "artifact too short: {} bytes (minimum {})",
                blob.len(),
                HEADER_LEN + TAG_SIZE
            );
        }
        if &blob[..4] != MAGIC {
            anyhow::bail!("not a locked artifact: bad header");
        }

        let u32_at = |at: usize| u32::from_le_bytes([blob[at], blob[at + 1], blob[at + 2], blob[at + 3]]);
        let params = KdfParams {
            mem_cost_kib: u32_at(4),
            time_cost: u32_at(8),
            parallelism: u32_at(12),
        };

        let mut salt = [0u8; SALT_SIZE];
        salt.copy_from_slice(&blob[16..16 + SALT_SIZE]);
        let mut nonce = [0u8; NONCE_SIZE];
        nonce.copy_from_slice(&blob[16 + SALT_SIZE..HEADER_LEN]);

        Ok(Self { params, salt, nonce })
    }
}

/// Compress and encrypt `plaintext` with the ring's sealing key.
///
/// Returns the complete artifact bytes.
pub fn seal(keys: &mut KeyRing, plaintext: &[u8]) -> anyhow::Result<Vec<u8>> {
    let params = keys.params();
    let (salt, key) = keys.sealing_key()?;

    let mut nonce = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce);

    let header = Header { params, salt, nonce }.to_bytes();
    let compressed = Zeroizing::new(
        zstd::encode_all(plaintext, COMPRESSION_LEVEL)
            .map_err(|e| anyhow::anyhow!("zstd compress: {e}"))?,
    );

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let ciphertext = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: compressed.as_slice(),
                aad: &header,
            },
        )
        .map_err(|e| anyhow::anyhow!("artifact encryption failed: {e}"))?;

    let mut result = Vec::with_capacity(HEADER_LEN + ciphertext.len());
    result.extend_from_slice(&header);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Authenticate, decrypt and decompress an artifact.
pub fn open(keys: &mut KeyRing, blob: &[u8]) -> anyhow::Result<Zeroizing<Vec<u8>>> {
    let header = Header::parse(blob)?;
    let key = keys.key_for(&header.params, &header.salt)?;

    let cipher = XChaCha20Poly1305::new(key.as_bytes().into());
    let compressed = Zeroizing::new(
        cipher
            .decrypt(
                XNonce::from_slice(&header.nonce),
                Payload {
                    msg: &blob[HEADER_LEN..],
                    aad: &blob[..HEADER_LEN],
                },
            )
            .map_err(|_| {
                anyhow::anyhow!("artifact decryption failed: wrong password or corrupted data")
            })?,
    );

    zstd::decode_all(compressed.as_slice())
        .map(Zeroizing::new)
        .map_err(|e| anyhow::anyhow!("zstd decompress: {e}"))
}
