//! Engine configuration.
//!
//! One explicit value passed at construction and shared read-only between
//! symbols. There is no process-wide or environment-driven state.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ReconError, Result};
use crate::warnings::WarningTrackerConfig;

/// How normalization faults are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum NormalizationMode {
    /// Malformed or unknown records fault the record's symbol
    #[default]
    Strict,
    /// Malformed or unknown records are skipped and counted
    Lenient,
}

/// When periodic snapshots are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SnapshotCadence {
    /// Only on demand and after recovery
    #[default]
    Never,
    /// After every N applied commands
    EveryCommands(u64),
    /// Whenever event time has advanced by at least N nanoseconds
    EveryNanos(i64),
}

/// What happens to commands arriving while a symbol recovers from a gap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RecoveryPolicy {
    /// Hold them and replay the ones newer than the recovery snapshot
    #[default]
    Buffer,
    /// Discard them
    Drop,
}

/// Configuration for reconstruction behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Normalization fault handling
    pub mode: NormalizationMode,

    /// Levels per side in snapshots (0 = full depth)
    pub snapshot_depth: usize,

    /// Periodic snapshot cadence
    pub snapshot_cadence: SnapshotCadence,

    /// Emit a snapshot as soon as a recovery snapshot is accepted
    pub snapshot_on_recovery: bool,

    /// Gap recovery handling
    pub recovery_policy: RecoveryPolicy,

    /// Maximum records held while recovering (Buffer policy)
    pub recovery_buffer_capacity: usize,

    /// Whether to log warnings for discontinuities
    pub log_warnings: bool,

    /// Warning tracker settings (one tracker per symbol)
    pub warnings: WarningTrackerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: NormalizationMode::Strict,
            snapshot_depth: 10,
            snapshot_cadence: SnapshotCadence::Never,
            snapshot_on_recovery: true,
            recovery_policy: RecoveryPolicy::Buffer,
            recovery_buffer_capacity: 100_000,
            log_warnings: true,
            warnings: WarningTrackerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new config with specified snapshot depth.
    pub fn new(snapshot_depth: usize) -> Self {
        Self {
            snapshot_depth,
            ..Default::default()
        }
    }

    /// Set normalization mode.
    pub fn with_mode(mut self, mode: NormalizationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set periodic snapshot cadence.
    pub fn with_snapshot_cadence(mut self, cadence: SnapshotCadence) -> Self {
        self.snapshot_cadence = cadence;
        self
    }

    /// Enable/disable the snapshot emitted after recovery.
    pub fn with_snapshot_on_recovery(mut self, enabled: bool) -> Self {
        self.snapshot_on_recovery = enabled;
        self
    }

    /// Set gap recovery policy.
    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery_policy = policy;
        self
    }

    /// Set the recovery buffer bound.
    pub fn with_recovery_buffer_capacity(mut self, capacity: usize) -> Self {
        self.recovery_buffer_capacity = capacity;
        self
    }

    /// Enable/disable warning logs.
    pub fn with_logging(mut self, log: bool) -> Self {
        self.log_warnings = log;
        self.warnings.log_warnings = log;
        self
    }

    /// Check the configuration for contradictory settings.
    pub fn validate(&self) -> Result<()> {
        if self.recovery_policy == RecoveryPolicy::Buffer && self.recovery_buffer_capacity == 0 {
            return Err(ReconError::InvalidConfig(
                "recovery_buffer_capacity must be > 0 with the Buffer policy".to_string(),
            ));
        }
        match self.snapshot_cadence {
            SnapshotCadence::EveryCommands(0) => Err(ReconError::InvalidConfig(
                "snapshot cadence EveryCommands(0) never advances".to_string(),
            )),
            SnapshotCadence::EveryNanos(ns) if ns <= 0 => Err(ReconError::InvalidConfig(
                format!("snapshot cadence EveryNanos({ns}) must be positive"),
            )),
            _ => Ok(()),
        }
    }

    /// Save to JSON file.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Load from JSON file and validate.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }
}
