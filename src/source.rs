//! Record source abstraction for the ingestion collaborator.
//!
//! Decoding raw storage formats happens outside this crate. Whatever does the
//! decoding hands records over through `RecordSource`, so the engine can run
//! over files, sockets or test vectors without modification.
//!
//! # Implementing Custom Sources
//!
//! ```
//! use l2_book_reconstructor::source::{RecordSource, SourceMetadata};
//! use l2_book_reconstructor::{RawRecord, Result};
//!
//! struct ChannelSource {
//!     records: std::sync::mpsc::Receiver<RawRecord>,
//!     metadata: SourceMetadata,
//! }
//!
//! impl RecordSource for ChannelSource {
//!     type RecordIter = std::sync::mpsc::IntoIter<RawRecord>;
//!
//!     fn records(self) -> Result<Self::RecordIter> {
//!         Ok(self.records.into_iter())
//!     }
//!
//!     fn metadata(&self) -> &SourceMetadata {
//!         &self.metadata
//!     }
//! }
//! ```

use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::RawRecord;

/// Metadata about a record source.
///
/// Used for logging and as the key under which progress is tracked.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMetadata {
    /// Trading symbol, when the source covers a single one
    pub symbol: Option<String>,

    /// Trading date in YYYY-MM-DD format
    pub date: Option<String>,

    /// Original file path (if loaded from file)
    pub file_path: Option<PathBuf>,

    /// Data provider name (e.g., "memory", "vendor-x")
    pub provider: Option<String>,

    /// Estimated record count (for progress reporting)
    pub estimated_records: Option<u64>,
}

impl SourceMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_file_path(mut self, path: impl AsRef<Path>) -> Self {
        self.file_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_estimated_records(mut self, count: u64) -> Self {
        self.estimated_records = Some(count);
        self
    }

    /// Extract metadata from a file path.
    ///
    /// Parses symbol and date from filenames shaped like
    /// `SYMBOL_YYYY-MM-DD.<ext>` or `SYMBOL.<ext>`; every extension is
    /// stripped.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let mut metadata = Self::new().with_file_path(path);

        let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
            return metadata;
        };
        let base = filename.split('.').next().unwrap_or(filename);

        match base.split_once('_') {
            Some((symbol, rest)) => {
                metadata.symbol = Some(symbol.to_string());
                metadata.date = rest
                    .get(..10)
                    .filter(|d| d.as_bytes()[4] == b'-' && d.as_bytes()[7] == b'-')
                    .map(str::to_string);
            }
            None if !base.is_empty() => metadata.symbol = Some(base.to_string()),
            None => {}
        }

        metadata
    }

    /// Stable identifier for progress tracking.
    ///
    /// The file path when known, else `symbol/date`, else `None`.
    pub fn manifest_key(&self) -> Option<String> {
        if let Some(path) = &self.file_path {
            return Some(path.display().to_string());
        }
        match (&self.symbol, &self.date) {
            (Some(symbol), Some(date)) => Some(format!("{symbol}/{date}")),
            (Some(symbol), None) => Some(symbol.clone()),
            _ => None,
        }
    }
}

/// Trait for raw record sources.
///
/// `records()` consumes `self` for single-pass iteration. Records must be
/// yielded in arrival order per symbol; interleaving across symbols is fine.
pub trait RecordSource {
    /// The iterator type for records.
    type RecordIter: Iterator<Item = RawRecord>;

    /// Consume the source and return an iterator over records.
    fn records(self) -> Result<Self::RecordIter>;

    /// Metadata about the source.
    fn metadata(&self) -> &SourceMetadata;
}

/// In-memory source, for tests and replays of captured records.
///
/// # Example
///
/// ```
/// use l2_book_reconstructor::source::{RecordSource, SourceMetadata, VecSource};
/// use l2_book_reconstructor::{RawRecord, Side};
///
/// let source = VecSource::new(vec![
///     RawRecord::add("AAPL", 1, 1, Side::Buy, 10.0, 100),
///     RawRecord::cancel("AAPL", 2, 1, None),
/// ])
/// .with_metadata(SourceMetadata::new().with_symbol("AAPL"));
///
/// assert_eq!(source.records().unwrap().count(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct VecSource {
    records: Vec<RawRecord>,
    metadata: SourceMetadata,
}

impl VecSource {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self {
            metadata: SourceMetadata::new()
                .with_provider("memory")
                .with_estimated_records(records.len() as u64),
            records,
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: SourceMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

impl RecordSource for VecSource {
    type RecordIter = std::vec::IntoIter<RawRecord>;

    fn records(self) -> Result<Self::RecordIter> {
        Ok(self.records.into_iter())
    }

    fn metadata(&self) -> &SourceMetadata {
        &self.metadata
    }
}
