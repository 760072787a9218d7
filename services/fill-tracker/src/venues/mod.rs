//! Venue access
//!
//! Both clients are stateless: pagination cursors belong to the fill caches,
//! and every call carries the cursor it should start from.

pub mod okx;
pub mod snowtrace;

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{TrackerError, TrackerResult};

/// Synthesized value transfer produced by a smart-contract execution,
/// distinct from the externally signed transaction
#[derive(Debug, Clone, PartialEq)]
pub struct InternalTransfer {
    /// Receiving address, lowercased on ingress
    pub to: String,
    /// Transferred amount in the chain's smallest unit
    pub value: Decimal,
}

/// Per-transaction internal-transfer lookup
#[async_trait]
pub trait InternalTransferSource: Send + Sync {
    /// Internal transfers synthesized by the transaction, in execution order
    async fn internal_transfers(&self, tx_hash: &str) -> TrackerResult<Vec<InternalTransfer>>;
}

pub(crate) fn parse_decimal(raw: &str, context: &str) -> TrackerResult<Decimal> {
    Decimal::from_str(raw).map_err(|_| TrackerError::Venue {
        context: format!("{context}: '{raw}' is not a decimal"),
    })
}

pub(crate) fn parse_u64(raw: &str, context: &str) -> TrackerResult<u64> {
    raw.parse().map_err(|_| TrackerError::Venue {
        context: format!("{context}: '{raw}' is not an integer"),
    })
}

pub(crate) fn parse_i64(raw: &str, context: &str) -> TrackerResult<i64> {
    raw.parse().map_err(|_| TrackerError::Venue {
        context: format!("{context}: '{raw}' is not an integer"),
    })
}
