//! Archive Checksum Verification
//!
//! Re-hashes downloaded firmware archives before the admin domain consumes
//! them. The digest algorithm follows from the length of the expected token.

use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Digest algorithms published in fwupd release checksums.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DigestKind {
    Sha1,
    Sha256,
}

impl DigestKind {
    /// Infer the algorithm from a hex digest's length.
    pub fn for_token(token: &str) -> Option<Self> {
        match token.len() {
            40 => Some(Self::Sha1),
            64 => Some(Self::Sha256),
            _ => None,
        }
    }
}

/// Verification errors
#[derive(Debug)]
pub enum ChecksumError {
    IoError(io::Error),
    ChecksumMismatch { expected: String, actual: String },
    UnsupportedDigest(String),
}

impl From<io::Error> for ChecksumError {
    fn from(e: io::Error) -> Self {
        Self::IoError(e)
    }
}

impl std::fmt::Display for ChecksumError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "IO error: {}", e),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "Checksum mismatch: expected {}, got {}", expected, actual)
            }
            Self::UnsupportedDigest(token) => {
                write!(f, "Unsupported checksum format: {}", token)
            }
        }
    }
}

impl std::error::Error for ChecksumError {}

pub struct ArchiveVerifier;

impl ArchiveVerifier {
    fn hash_file<D: Digest>(path: &Path) -> Result<String, ChecksumError> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut hasher = D::new();

        let mut buffer = [0u8; 8192];
        loop {
            let bytes_read = reader.read(&mut buffer)?;
            if bytes_read == 0 {
                break;
            }
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hex::encode(hasher.finalize()))
    }

    /// Calculate SHA1 checksum of a file
    pub fn calculate_sha1(path: &Path) -> Result<String, ChecksumError> {
        Self::hash_file::<Sha1>(path)
    }

    /// Calculate SHA256 checksum of a file
    pub fn calculate_sha256(path: &Path) -> Result<String, ChecksumError> {
        Self::hash_file::<Sha256>(path)
    }

    /// Verify a file against an expected hex digest
    pub fn verify_checksum(path: &Path, expected: &str) -> Result<(), ChecksumError> {
        let actual = match DigestKind::for_token(expected) {
            Some(DigestKind::Sha1) => Self::calculate_sha1(path)?,
            Some(DigestKind::Sha256) => Self::calculate_sha256(path)?,
            None => return Err(ChecksumError::UnsupportedDigest(expected.to_string())),
        };
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(ChecksumError::ChecksumMismatch {
                expected: expected.to_string(),
                actual,
            });
        }
        Ok(())
    }
}
