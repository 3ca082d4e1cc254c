//! Checksum utilities for staged file verification

use crate::error::{IngestError, Result};
use sha2::{Digest, Sha256, Sha512};

/// Checksum algorithm named by a granule file's `checksumType`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumKind {
    Crc32,
    Md5,
    Sha256,
    Sha512,
}

impl ChecksumKind {
    /// Parse a `checksumType` string; unknown names fail with
    /// `UnsupportedChecksumType`
    pub fn parse(name: &str) -> Result<Self> {
        match name.to_lowercase().as_str() {
            "crc32" | "cksum" => Ok(ChecksumKind::Crc32),
            "md5" => Ok(ChecksumKind::Md5),
            "sha256" | "sha-256" => Ok(ChecksumKind::Sha256),
            "sha512" | "sha-512" => Ok(ChecksumKind::Sha512),
            other => Err(IngestError::UnsupportedChecksumType(other.to_string())),
        }
    }
}

impl std::fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChecksumKind::Crc32 => write!(f, "crc32"),
            ChecksumKind::Md5 => write!(f, "md5"),
            ChecksumKind::Sha256 => write!(f, "sha256"),
            ChecksumKind::Sha512 => write!(f, "sha512"),
        }
    }
}

/// Compute a checksum over a byte buffer.
///
/// CRC32 values render as decimal strings, hash digests as lowercase hex.
pub fn compute(kind: ChecksumKind, data: &[u8]) -> String {
    match kind {
        ChecksumKind::Crc32 => {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(data);
            hasher.finalize().to_string()
        },
        ChecksumKind::Md5 => format!("{:x}", md5::compute(data)),
        ChecksumKind::Sha256 => {
            let mut hasher = Sha256::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        },
        ChecksumKind::Sha512 => {
            let mut hasher = Sha512::new();
            hasher.update(data);
            hex::encode(hasher.finalize())
        },
    }
}

/// Compare a computed checksum against an expected value.
///
/// Hex digests compare case-insensitively; CRC32 compares numerically so
/// that "0123" and "123" agree.
pub fn matches(kind: ChecksumKind, data: &[u8], expected: &str) -> bool {
    let actual = compute(kind, data);
    match kind {
        ChecksumKind::Crc32 => {
            expected.trim().parse::<u32>().map(|v| v.to_string()) == Ok(actual)
        },
        _ => actual.eq_ignore_ascii_case(expected.trim()),
    }
}
