//! Content hashing for fingerprint signals.
//!
//! Three families of hashes appear in a fingerprint:
//!
//! - Cryptographic digests (`sha256`, `md5`) over raw response bytes.
//! - MurmurHash3 32-bit in the convention the Internet-scan services use
//!   for favicons: the hash is computed over the *base64 encoding* of the
//!   bytes, not the bytes themselves, and rendered as a signed decimal.
//! - A 64-bit perceptual hash (`phash`) for images, matched by Hamming
//!   distance rather than equality so that re-encoded logos still hit.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Maximum Hamming distance (out of 64 bits) at which two perceptual
/// hashes are still considered the same image.
pub const PHASH_MATCH_DISTANCE: u32 = 10;

/// Hash values attached to a single asset (favicon, image, page blob).
///
/// A bundle is "present" when at least one primary value is set; the
/// alternates exist because favicons are frequently served with small
/// byte-level differences that produce distinct MMH3 values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashBundle {
    /// SHA-256 over the raw bytes, hex-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    /// MD5 over the raw bytes, hex-encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub md5: Option<String>,
    /// 64-bit perceptual hash, hex-encoded (images only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phash: Option<String>,
    /// Shodan-convention MurmurHash3 as a signed decimal string
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mmh3: Option<String>,
    /// Alternative MMH3 values the planner may also query
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mmh3_alt: Vec<String>,
}

impl HashBundle {
    /// Whether any primary hash value is set
    #[must_use]
    pub fn is_present(&self) -> bool {
        self.sha256.is_some() || self.md5.is_some() || self.phash.is_some() || self.mmh3.is_some()
    }

    /// All MMH3 values: primary first, then alternates, in order
    #[must_use]
    pub fn all_mmh3(&self) -> Vec<String> {
        let mut values = Vec::with_capacity(1 + self.mmh3_alt.len());
        if let Some(primary) = &self.mmh3 {
            values.push(primary.clone());
        }
        values.extend(self.mmh3_alt.iter().cloned());
        values
    }
}

/// SHA-256 digest, hex-encoded
#[must_use]
pub fn sha256_hex(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// MD5 digest, hex-encoded
#[must_use]
pub fn md5_hex(content: &[u8]) -> String {
    hex::encode(Md5::digest(content))
}

fn mmh3_32(data: &[u8]) -> i32 {
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_32(&mut std::io::Cursor::new(data), 0).map_or(0, |h| h as i32)
}

/// MurmurHash3 over raw bytes, signed decimal
#[must_use]
pub fn mmh3_raw(content: &[u8]) -> String {
    mmh3_32(content).to_string()
}

/// Shodan-convention favicon hash: MurmurHash3 over the MIME-wrapped
/// base64 encoding of the bytes (76-column lines, each newline-terminated).
///
/// The line wrapping is load-bearing: the scan services hash the wrapped
/// form, so an unwrapped encoding produces a different value.
#[must_use]
pub fn favicon_mmh3(content: &[u8]) -> String {
    let encoded = BASE64.encode(content);
    let mut wrapped = Vec::with_capacity(encoded.len() + encoded.len() / 76 + 1);
    for chunk in encoded.as_bytes().chunks(76) {
        wrapped.extend_from_slice(chunk);
        wrapped.push(b'\n');
    }
    mmh3_32(&wrapped).to_string()
}

/// MurmurHash3 over the unwrapped base64 encoding, used for image checks.
#[must_use]
pub fn image_mmh3(content: &[u8]) -> String {
    mmh3_32(BASE64.encode(content).as_bytes()).to_string()
}

/// 64-bit perceptual hash of an encoded image, hex-encoded.
///
/// Returns `None` when the bytes do not decode as an image.
#[must_use]
pub fn phash_hex(content: &[u8]) -> Option<String> {
    let img = image::load_from_memory(content).ok()?;
    // DCT mean hash: the classic pHash construction, 8x8 = 64 bits.
    let hasher = image_hasher::HasherConfig::new()
        .hash_size(8, 8)
        .hash_alg(image_hasher::HashAlg::Mean)
        .preproc_dct()
        .to_hasher();
    Some(hex::encode(hasher.hash_image(&img).as_bytes()))
}

/// Hamming distance between two hex-encoded perceptual hashes.
///
/// Returns `None` when either value is not valid hex or the lengths differ.
#[must_use]
pub fn phash_distance(a_hex: &str, b_hex: &str) -> Option<u32> {
    let a = hex::decode(a_hex).ok()?;
    let b = hex::decode(b_hex).ok()?;
    if a.len() != b.len() {
        return None;
    }
    Some(a.iter().zip(b.iter()).map(|(x, y)| (x ^ y).count_ones()).sum())
}
