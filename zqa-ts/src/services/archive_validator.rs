//! ZIP archive integrity check
//!
//! Opens the buffer as a ZIP archive and reads every entry to the end, which
//! makes the `zip` reader verify each entry's CRC-32. Entry contents are not
//! interpreted. Stored, deflate, bzip2 and LZMA entries are supported.
//!
//! Inflation stops once the running total passes the caller's budget.

use std::io::{self, Cursor, Read};
use thiserror::Error;
use zip::ZipArchive;

/// Structural validation failure
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArchiveError {
    /// Central directory or an entry could not be read, or a checksum mismatched
    #[error("corrupt archive: {0}")]
    Corrupt(String),

    /// Entries inflate to more than the allowed total
    #[error("archive expands beyond {limit} bytes")]
    TooLarge { limit: u64 },
}

/// Validate archive structure and per-entry checksums, inflating at most
/// `max_uncompressed` bytes in total
pub fn validate_archive(bytes: &[u8], max_uncompressed: u64) -> Result<ArchiveSummary, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ArchiveError::Corrupt(format!("unreadable central directory: {}", e)))?;

    let mut uncompressed_bytes: u64 = 0;
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| ArchiveError::Corrupt(format!("entry {}: {}", index, e)))?;
        let name = entry.name().to_string();

        // The reader checks the CRC once the entry is fully consumed
        let remaining = max_uncompressed - uncompressed_bytes;
        let copied = io::copy(
            &mut entry.by_ref().take(remaining.saturating_add(1)),
            &mut io::sink(),
        )
        .map_err(|e| ArchiveError::Corrupt(format!("entry '{}': {}", name, e)))?;
        if copied > remaining {
            return Err(ArchiveError::TooLarge {
                limit: max_uncompressed,
            });
        }
        uncompressed_bytes += copied;
    }

    Ok(ArchiveSummary {
        entries: archive.len(),
        uncompressed_bytes,
    })
}

/// What a successful validation saw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub uncompressed_bytes: u64,
}
