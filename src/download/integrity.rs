//! Integrity Verifier: size and SHA-256 checks on written files.

use std::fmt::Write as _;
use std::path::Path;

use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::debug;

const READ_CHUNK: usize = 8192;

/// Result of checking a written file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verification {
    Ok,
    Mismatch { details: String },
}

impl Verification {
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

/// Compares files on disk against the size and signature the remote reported.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityVerifier;

impl IntegrityVerifier {
    /// Checks `path` against `expected_size` and, when given, `expected_signature`
    /// (lowercase or uppercase hex SHA-256).
    ///
    /// An empty file only verifies when the remote reported a size of zero.
    /// A missing file is an I/O error.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from reading metadata or content.
    pub async fn verify(
        &self,
        path: &Path,
        expected_size: Option<u64>,
        expected_signature: Option<&str>,
    ) -> std::io::Result<Verification> {
        let actual_size = tokio::fs::metadata(path).await?.len();
        if actual_size == 0 && expected_size != Some(0) {
            return Ok(Verification::Mismatch {
                details: "file is empty".to_string(),
            });
        }
        if let Some(expected) = expected_size
            && expected != actual_size
        {
            return Ok(Verification::Mismatch {
                details: format!("expected {expected} bytes, got {actual_size}"),
            });
        }

        if let Some(expected) = expected_signature {
            let actual = sha256_hex(path).await?;
            if !actual.eq_ignore_ascii_case(expected.trim()) {
                return Ok(Verification::Mismatch {
                    details: format!("expected sha256 {expected}, got {actual}"),
                });
            }
        }

        debug!(path = %path.display(), bytes = actual_size, "integrity verified");
        Ok(Verification::Ok)
    }
}

/// Lowercase hex SHA-256 of a file's content.
///
/// # Errors
///
/// Returns the I/O error from opening or reading the file.
pub async fn sha256_hex(path: &Path) -> std::io::Result<String> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0_u8; READ_CHUNK];
    loop {
        let read = file.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(to_hex(&hasher.finalize()))
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}
