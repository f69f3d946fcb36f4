//! Content digests and short naming hashes
//!
//! Two very different hashes live here. [`digest_file`] and [`digest_bytes`]
//! produce the cryptographic content digests that key the object library;
//! they must be collision resistant and identical on every platform.
//! [`sipit`] is a cheap process- and platform-stable hash used only to build
//! short names (stage identities, controller/space tags); collisions there
//! are tolerable and never affect content addressing.

use crate::error::Result;
use sha2::{Digest, Sha256};
use siphasher::sip::SipHasher24;
use std::fs::File;
use std::hash::Hasher;
use std::io::Read;
use std::path::Path;

/// Fixed SipHash keys so short names are stable across runs and hosts
const SIPIT_KEY0: u64 = 0x6c75_6c75_6b61_696e;
const SIPIT_KEY1: u64 = 0x656e_7669_726f_6e73;

const DIGEST_BUFFER: usize = 64 * 1024;

/// Compute the content digest of a file as lowercase hex
///
/// Streams the file through SHA-256 in fixed-size chunks; the file is never
/// buffered whole, so arbitrarily large objects hash in constant memory.
///
/// # Errors
///
/// Returns [`crate::HolotreeError::Io`] when the file cannot be opened or read.
pub fn digest_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; DIGEST_BUFFER];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Compute the content digest of in-memory bytes as lowercase hex
pub fn digest_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Hash a blueprint into its catalog key
///
/// The key is the lowercase hex SHA-256 of the blueprint bytes and is the
/// `<key>` part of catalog filenames.
pub fn blueprint_hash(blueprint: &[u8]) -> String {
    digest_bytes(blueprint)
}

/// Short process-stable non-cryptographic hash
///
/// SipHash-2-4 with fixed keys, so the same input names the same thing in
/// every process on every platform. Never use this for content addressing.
pub fn sipit(data: &[u8]) -> u64 {
    let mut hasher = SipHasher24::new_with_keys(SIPIT_KEY0, SIPIT_KEY1);
    hasher.write(data);
    hasher.finish()
}

/// Render a hash value as fixed-width lowercase base-36 text
///
/// Zero-padded on the left and truncated to `width` characters, so generated
/// names always have a predictable length.
pub fn textual(mut value: u64, width: usize) -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while value > 0 {
        out.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    while out.len() < width {
        out.push(b'0');
    }
    out.reverse();
    out.truncate(width);
    out.into_iter().map(char::from).collect()
}
