//! Error types for the reconstruction engine.
//!
//! Faults are scoped to a single symbol. `is_fatal` tells the caller whether
//! the symbol needs an explicit reset (or a fresh snapshot) before it can
//! stream again.

use thiserror::Error;

/// Result type alias for reconstruction operations.
pub type Result<T> = std::result::Result<T, ReconError>;

/// Main error type for reconstruction operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReconError {
    /// A required field is missing or cannot be parsed
    #[error("Malformed record for {symbol}: {reason}")]
    MalformedRecord { symbol: String, reason: String },

    /// The message-type tag is not part of the accepted vocabulary
    #[error("Unknown message type for {symbol}: {tag:?}")]
    UnknownMessageType { symbol: String, tag: String },

    /// Cancel or trade referenced an order that is not resting
    #[error("Order not found: {0}")]
    OrderNotFound(u64),

    /// Arrival sequence skipped ahead; a fresh snapshot is required
    #[error("Sequence gap for {symbol}: expected {expected}, received {received}")]
    SequenceGap {
        symbol: String,
        expected: u64,
        received: u64,
    },

    /// No sequence number can follow the last one seen
    #[error("Sequence space exhausted for {symbol} after {last}")]
    SequenceExhausted { symbol: String, last: u64 },

    /// Book invariant breached (fatal for the symbol)
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Symbol is in a fatal recovering state and rejects commands
    #[error("Symbol {0} is faulted and requires a reset")]
    SymbolFaulted(String),

    /// Symbol not found (for multi-symbol engines)
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// Configuration rejected by validation
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Generic error with context
    #[error("Error: {0}")]
    Generic(String),
}

impl ReconError {
    /// Create a generic error from any string-like type.
    pub fn generic(msg: impl Into<String>) -> Self {
        ReconError::Generic(msg.into())
    }

    /// Create an invariant violation from any string-like type.
    pub fn invariant(msg: impl Into<String>) -> Self {
        ReconError::InvariantViolation(msg.into())
    }

    /// Errors that move the symbol into a faulted state until it is reset.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ReconError::MalformedRecord { .. }
                | ReconError::UnknownMessageType { .. }
                | ReconError::InvariantViolation(_)
                | ReconError::SequenceExhausted { .. }
                | ReconError::SymbolFaulted(_)
        )
    }

    /// Errors the caller can heal by supplying a fresh snapshot.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, ReconError::SequenceGap { .. })
    }
}

impl From<std::io::Error> for ReconError {
    fn from(err: std::io::Error) -> Self {
        ReconError::Generic(format!("IO error: {err}"))
    }
}

impl From<serde_json::Error> for ReconError {
    fn from(err: serde_json::Error) -> Self {
        ReconError::Generic(format!("JSON error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ReconError::OrderNotFound(12345);
        assert_eq!(err.to_string(), "Order not found: 12345");

        let err = ReconError::SequenceGap {
            symbol: "AAPL".to_string(),
            expected: 5,
            received: 9,
        };
        assert_eq!(
            err.to_string(),
            "Sequence gap for AAPL: expected 5, received 9"
        );
    }

    #[test]
    fn test_classification() {
        assert!(ReconError::invariant("negative aggregate").is_fatal());
        assert!(!ReconError::OrderNotFound(1).is_fatal());
        assert!(!ReconError::OrderNotFound(1).is_recoverable());

        let gap = ReconError::SequenceGap {
            symbol: "X".to_string(),
            expected: 2,
            received: 4,
        };
        assert!(gap.is_recoverable());
        assert!(!gap.is_fatal());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: ReconError = io.into();
        assert!(matches!(err, ReconError::Generic(ref m) if m.starts_with("IO error")));
    }
}
