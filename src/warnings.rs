//! Warning tracking for non-fatal discontinuities.
//!
//! Streams that start mid-session, duplicate deliveries and lenient drops are
//! expected in production feeds. They must not stop reconstruction, but they
//! must not disappear either: each one is categorized, counted and kept (up to
//! a bound) for later export.
//!
//! # Example
//!
//! ```
//! use l2_book_reconstructor::warnings::{WarningCategory, WarningTracker};
//!
//! let mut tracker = WarningTracker::new();
//! tracker.record_order_warning(
//!     WarningCategory::OrderNotFound,
//!     "cancel for unknown order 12345",
//!     12345,
//!     Some(1_700_000_000_000_000_000),
//! );
//!
//! assert_eq!(tracker.count_by_category(WarningCategory::OrderNotFound), 1);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

/// Category of warning for classification and filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WarningCategory {
    /// Cancel/trade for an order that is not resting
    OrderNotFound,

    /// Sequence number at or below the last one seen
    DuplicateSequence,

    /// Sequence number skipped ahead
    SequenceGap,

    /// Record dropped in lenient mode (missing/unparsable field)
    MalformedRecord,

    /// Record dropped in lenient mode (unrecognized tag)
    UnknownMessageType,

    /// Record discarded while recovering
    RecoveryDrop,

    /// Book invariant breached
    InvariantViolation,

    /// Book was reset or rebuilt from a snapshot
    BookCleared,
}

impl WarningCategory {
    /// Get a human-readable name for the category.
    pub fn name(&self) -> &'static str {
        match self {
            WarningCategory::OrderNotFound => "ORDER_NOT_FOUND",
            WarningCategory::DuplicateSequence => "DUPLICATE_SEQUENCE",
            WarningCategory::SequenceGap => "SEQUENCE_GAP",
            WarningCategory::MalformedRecord => "MALFORMED_RECORD",
            WarningCategory::UnknownMessageType => "UNKNOWN_MESSAGE_TYPE",
            WarningCategory::RecoveryDrop => "RECOVERY_DROP",
            WarningCategory::InvariantViolation => "INVARIANT_VIOLATION",
            WarningCategory::BookCleared => "BOOK_CLEARED",
        }
    }

    /// Get severity level (1=low, 2=medium, 3=high).
    pub fn severity(&self) -> u8 {
        match self {
            WarningCategory::OrderNotFound => 1,
            WarningCategory::DuplicateSequence => 1,
            WarningCategory::BookCleared => 1,
            WarningCategory::MalformedRecord => 2,
            WarningCategory::UnknownMessageType => 2,
            WarningCategory::RecoveryDrop => 2,
            WarningCategory::SequenceGap => 3,
            WarningCategory::InvariantViolation => 3,
        }
    }
}

/// A single warning record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    /// Per-tracker id, starting at 1
    pub id: u64,

    pub category: WarningCategory,

    /// Human-readable message
    pub message: String,

    /// Event timestamp of the record that triggered the warning
    pub data_timestamp: Option<i64>,

    /// Related order id (if applicable)
    pub order_id: Option<u64>,

    /// Related sequence number (if applicable)
    pub sequence: Option<u64>,
}

impl Warning {
    /// Create a new warning with minimal information.
    pub fn new(id: u64, category: WarningCategory, message: impl Into<String>) -> Self {
        Self {
            id,
            category,
            message: message.into(),
            data_timestamp: None,
            order_id: None,
            sequence: None,
        }
    }

    pub fn with_data_timestamp(mut self, ts: i64) -> Self {
        self.data_timestamp = Some(ts);
        self
    }

    pub fn with_order_id(mut self, order_id: u64) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// Summary statistics for warnings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WarningSummary {
    /// Total number of warnings (including deduplicated ones)
    pub total: u64,

    /// Count by category name
    pub by_category: HashMap<String, u64>,

    /// Count by severity
    pub by_severity: HashMap<u8, u64>,

    /// First stored warning's data timestamp
    pub first_timestamp: Option<i64>,

    /// Last stored warning's data timestamp
    pub last_timestamp: Option<i64>,

    /// Number of unique order IDs involved
    pub unique_orders: u64,
}

/// Configuration for warning tracker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningTrackerConfig {
    /// Maximum number of warnings to keep in memory
    pub max_warnings: usize,

    /// Whether to emit warnings through the `log` facade
    pub log_warnings: bool,

    /// Minimum severity to log (1=all, 2=medium+, 3=high only)
    pub min_log_severity: u8,

    /// Whether to collapse identical messages inside the window
    pub deduplicate: bool,

    /// Deduplication window in data-time nanoseconds
    pub dedupe_window_ns: i64,
}

impl Default for WarningTrackerConfig {
    fn default() -> Self {
        Self {
            max_warnings: 10_000,
            log_warnings: true,
            min_log_severity: 2,
            deduplicate: true,
            dedupe_window_ns: 1_000_000_000, // 1 second
        }
    }
}

/// Per-symbol warning tracker.
#[derive(Debug, Clone)]
pub struct WarningTracker {
    config: WarningTrackerConfig,

    /// Stored warnings (bounded by `max_warnings`)
    warnings: Vec<Warning>,

    next_id: u64,

    /// Count by category, deduplicated warnings included
    category_counts: HashMap<WarningCategory, u64>,

    /// Last data timestamp per (category, message hash) inside the window
    recent: AHashMap<(WarningCategory, u64), i64>,

    /// Insertion order of `recent`, oldest first, for window pruning
    recent_order: VecDeque<(i64, WarningCategory, u64)>,

    /// Order ids of stored warnings only
    unique_orders: HashSet<u64>,
}

impl WarningTracker {
    /// Create a new warning tracker with default configuration.
    pub fn new() -> Self {
        Self::with_config(WarningTrackerConfig::default())
    }

    /// Create a new warning tracker with custom configuration.
    pub fn with_config(config: WarningTrackerConfig) -> Self {
        Self {
            config,
            warnings: Vec::new(),
            next_id: 1,
            category_counts: HashMap::new(),
            recent: AHashMap::new(),
            recent_order: VecDeque::new(),
            unique_orders: HashSet::new(),
        }
    }

    /// Record a warning.
    ///
    /// Returns the warning ID if stored, or None if deduplicated.
    pub fn record(&mut self, warning: Warning) -> Option<u64> {
        *self.category_counts.entry(warning.category).or_insert(0) += 1;

        if self.config.deduplicate && self.is_duplicate(&warning) {
            return None;
        }

        if self.config.log_warnings && warning.category.severity() >= self.config.min_log_severity
        {
            log::warn!(
                "[{}] #{}: {}",
                warning.category.name(),
                warning.id,
                warning.message
            );
        }

        let id = warning.id;
        if self.warnings.len() < self.config.max_warnings {
            if let Some(order_id) = warning.order_id {
                self.unique_orders.insert(order_id);
            }
            self.warnings.push(warning);
        }

        Some(id)
    }

    /// Record a simple warning with just category and message.
    pub fn record_simple(
        &mut self,
        category: WarningCategory,
        message: impl Into<String>,
    ) -> Option<u64> {
        let warning = Warning::new(self.take_id(), category, message);
        self.record(warning)
    }

    /// Record a warning stamped with the triggering record's event time.
    pub fn record_at(
        &mut self,
        category: WarningCategory,
        message: impl Into<String>,
        timestamp: Option<i64>,
    ) -> Option<u64> {
        let mut warning = Warning::new(self.take_id(), category, message);
        if let Some(ts) = timestamp {
            warning = warning.with_data_timestamp(ts);
        }
        self.record(warning)
    }

    /// Record a warning with order context.
    pub fn record_order_warning(
        &mut self,
        category: WarningCategory,
        message: impl Into<String>,
        order_id: u64,
        timestamp: Option<i64>,
    ) -> Option<u64> {
        let mut warning = Warning::new(self.take_id(), category, message).with_order_id(order_id);
        if let Some(ts) = timestamp {
            warning = warning.with_data_timestamp(ts);
        }
        self.record(warning)
    }

    /// Record a warning with sequence context.
    pub fn record_sequence_warning(
        &mut self,
        category: WarningCategory,
        message: impl Into<String>,
        sequence: u64,
        timestamp: Option<i64>,
    ) -> Option<u64> {
        let mut warning = Warning::new(self.take_id(), category, message).with_sequence(sequence);
        if let Some(ts) = timestamp {
            warning = warning.with_data_timestamp(ts);
        }
        self.record(warning)
    }

    /// Number of stored warnings.
    pub fn len(&self) -> usize {
        self.warnings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.warnings.is_empty()
    }

    /// Total count including deduplicated.
    pub fn total_count(&self) -> u64 {
        self.category_counts.values().sum()
    }

    /// Count for a specific category (deduplicated included).
    pub fn count_by_category(&self, category: WarningCategory) -> u64 {
        self.category_counts.get(&category).copied().unwrap_or(0)
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Stored warnings of one category.
    pub fn warnings_by_category(&self, category: WarningCategory) -> Vec<&Warning> {
        self.warnings
            .iter()
            .filter(|w| w.category == category)
            .collect()
    }

    /// Get summary statistics.
    pub fn summary(&self) -> WarningSummary {
        let mut by_category = HashMap::new();
        let mut by_severity = HashMap::new();

        for (cat, count) in &self.category_counts {
            by_category.insert(cat.name().to_string(), *count);
            *by_severity.entry(cat.severity()).or_insert(0) += *count;
        }

        WarningSummary {
            total: self.total_count(),
            by_category,
            by_severity,
            first_timestamp: self.warnings.first().and_then(|w| w.data_timestamp),
            last_timestamp: self.warnings.last().and_then(|w| w.data_timestamp),
            unique_orders: self.unique_orders.len() as u64,
        }
    }

    /// Export the summary and stored warnings to a JSON file.
    pub fn export_to_file(&self, path: impl AsRef<Path>) -> crate::error::Result<()> {
        #[derive(Serialize)]
        struct Export<'a> {
            summary: WarningSummary,
            warnings: &'a [Warning],
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(
            &mut writer,
            &Export {
                summary: self.summary(),
                warnings: &self.warnings,
            },
        )?;
        writer.flush()?;
        Ok(())
    }

    /// Clear all warnings.
    pub fn clear(&mut self) {
        self.warnings.clear();
        self.category_counts.clear();
        self.recent.clear();
        self.recent_order.clear();
        self.unique_orders.clear();
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Window check against data time, so replays dedupe identically.
    ///
    /// Constant time per warning; the window holds at most `max_warnings`
    /// distinct messages.
    fn is_duplicate(&mut self, warning: &Warning) -> bool {
        let now = warning.data_timestamp.unwrap_or(0);
        let window = self.config.dedupe_window_ns;
        self.prune_recent(now);

        let key = (warning.category, hash_message(&warning.message));
        if let Some(&seen) = self.recent.get(&key) {
            if now.saturating_sub(seen) < window {
                return true;
            }
        }

        self.recent.insert(key, now);
        self.recent_order.push_back((now, key.0, key.1));
        while self.recent_order.len() > self.config.max_warnings.max(1) {
            self.evict_oldest();
        }
        false
    }

    fn prune_recent(&mut self, now: i64) {
        let window = self.config.dedupe_window_ns;
        while let Some(&(ts, _, _)) = self.recent_order.front() {
            if now.saturating_sub(ts) < window {
                break;
            }
            self.evict_oldest();
        }
    }

    fn evict_oldest(&mut self) {
        if let Some((ts, category, hash)) = self.recent_order.pop_front() {
            // Only drop the entry if a later insert has not replaced it
            if self.recent.get(&(category, hash)) == Some(&ts) {
                self.recent.remove(&(category, hash));
            }
        }
    }
}

fn hash_message(message: &str) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    message.hash(&mut hasher);
    hasher.finish()
}

impl Default for WarningTracker {
    fn default() -> Self {
        Self::new()
    }
}
