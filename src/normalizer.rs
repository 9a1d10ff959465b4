//! Raw record → canonical command normalization.
//!
//! Vendors disagree on tags and side codes; everything downstream of this
//! module sees exactly three commands. Parsing is pure (`parse`); the
//! strict/lenient policy and drop counters live on `EventNormalizer`.

use crate::config::NormalizationMode;
use crate::error::{ReconError, Result};
use crate::types::{try_price_to_fixed, Command, OrderAdd, OrderCancel, OrderTrade, RawRecord, Side};

/// Which canonical command a vendor tag maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Add,
    Cancel,
    Trade,
}

impl MessageKind {
    /// Map a vendor message-type tag (case-insensitive).
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_lowercase().as_str() {
            "add" | "a" | "new" | "n" | "insert" => Some(MessageKind::Add),
            "cancel" | "c" | "delete" | "d" | "remove" | "x" => Some(MessageKind::Cancel),
            "trade" | "t" | "fill" | "f" | "execute" | "e" | "match" => Some(MessageKind::Trade),
            _ => None,
        }
    }
}

/// Normalizer with mode policy and drop counters.
#[derive(Debug, Clone)]
pub struct EventNormalizer {
    mode: NormalizationMode,
    malformed_dropped: u64,
    unknown_dropped: u64,
}

impl EventNormalizer {
    pub fn new(mode: NormalizationMode) -> Self {
        Self {
            mode,
            malformed_dropped: 0,
            unknown_dropped: 0,
        }
    }

    #[inline]
    pub fn mode(&self) -> NormalizationMode {
        self.mode
    }

    /// Normalize a record under the configured mode.
    ///
    /// # Returns
    /// - `Ok(Some(cmd))` for a valid record
    /// - `Ok(None)` when the record was dropped (lenient mode)
    ///
    /// # Errors
    /// `MalformedRecord` / `UnknownMessageType` in strict mode.
    pub fn normalize(&mut self, raw: &RawRecord) -> Result<Option<Command>> {
        match Self::parse(raw) {
            Ok(cmd) => Ok(Some(cmd)),
            Err(err) => match self.mode {
                NormalizationMode::Strict => Err(err),
                NormalizationMode::Lenient => {
                    match err {
                        ReconError::UnknownMessageType { .. } => self.unknown_dropped += 1,
                        _ => self.malformed_dropped += 1,
                    }
                    Ok(None)
                }
            },
        }
    }

    /// Records dropped in lenient mode (both kinds).
    #[inline]
    pub fn dropped(&self) -> u64 {
        self.malformed_dropped + self.unknown_dropped
    }

    #[inline]
    pub fn malformed_dropped(&self) -> u64 {
        self.malformed_dropped
    }

    #[inline]
    pub fn unknown_dropped(&self) -> u64 {
        self.unknown_dropped
    }

    /// Parse a record into a command, ignoring mode.
    pub fn parse(raw: &RawRecord) -> Result<Command> {
        let malformed = |reason: &str| ReconError::MalformedRecord {
            symbol: raw.symbol.clone(),
            reason: reason.to_string(),
        };

        let tag = raw
            .event
            .as_deref()
            .ok_or_else(|| malformed("missing event tag"))?;
        let kind = MessageKind::from_tag(tag).ok_or_else(|| ReconError::UnknownMessageType {
            symbol: raw.symbol.clone(),
            tag: tag.to_string(),
        })?;

        let ts = raw.ts.ok_or_else(|| malformed("missing ts"))?;
        let order_id = match raw.order_id {
            Some(id) if id > 0 => id as u64,
            Some(id) => return Err(malformed(&format!("invalid order_id {id}"))),
            None => return Err(malformed("missing order_id")),
        };

        match kind {
            MessageKind::Add => {
                let side_code = raw.side.as_deref().ok_or_else(|| malformed("missing side"))?;
                let side = Side::parse(side_code)
                    .ok_or_else(|| malformed(&format!("unparsable side {side_code:?}")))?;
                let price = parse_price(raw.price, &malformed)?
                    .ok_or_else(|| malformed("missing price"))?;
                let volume = match raw.volume {
                    Some(v) if v > 0 => v as u64,
                    Some(v) => return Err(malformed(&format!("invalid add volume {v}"))),
                    None => return Err(malformed("missing volume")),
                };
                Ok(Command::Add(OrderAdd {
                    order_id,
                    price,
                    volume,
                    side,
                    ts,
                }))
            }
            MessageKind::Cancel => {
                let cancel_volume = match raw.volume {
                    None | Some(0) => None,
                    Some(v) if v > 0 => Some(v as u64),
                    Some(v) => return Err(malformed(&format!("invalid cancel volume {v}"))),
                };
                Ok(Command::Cancel(OrderCancel {
                    order_id,
                    cancel_volume,
                    ts,
                }))
            }
            MessageKind::Trade => {
                let trade_volume = match raw.volume {
                    Some(v) if v > 0 => v as u64,
                    Some(v) => return Err(malformed(&format!("invalid trade volume {v}"))),
                    None => return Err(malformed("missing volume")),
                };
                let trade_price = parse_price(raw.price, &malformed)?;
                Ok(Command::Trade(OrderTrade {
                    order_id,
                    trade_volume,
                    trade_price,
                    ts,
                }))
            }
        }
    }
}

/// Optional price: absent is fine, present must be representable as a
/// positive fixed-point key.
fn parse_price(
    price: Option<f64>,
    malformed: &dyn Fn(&str) -> ReconError,
) -> Result<Option<i64>> {
    match price {
        None => Ok(None),
        Some(p) => try_price_to_fixed(p)
            .map(Some)
            .ok_or_else(|| malformed(&format!("invalid price {p}"))),
    }
}
