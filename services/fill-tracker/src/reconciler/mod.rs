//! Venue-specific fill reconciliation
//!
//! A reconciler takes one buffered order snapshot, finds its settled
//! execution through the venue's fill cache, and applies the enrichment
//! update. Every failure mode is contained here: the dispatcher only ever
//! observes an outcome or a logged error.

pub mod okx;
pub mod trader_joe;

use rust_decimal::{Decimal, RoundingStrategy};

/// What happened to one reconciliation attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The order row was enriched and finalized
    Updated,
    /// The row was already final; the replay changed nothing
    AlreadyFinal,
    /// The venue knows the order but it has not settled yet
    NotSettled,
    /// No fill data available from the venue yet; retry on a later pass
    FillUnavailable,
    /// The order predates the venue history floor and is never reconciled
    AgedOut,
    /// Venue data contradicts the order; skipped and logged
    Inconsistent,
    /// The row vanished from the store between read and update
    OrderMissing,
}

/// Round to 4 decimal places, ties to even.
///
/// Applied at final assignment boundaries only; intermediate arithmetic
/// keeps full precision.
#[must_use]
pub fn round4(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointNearestEven)
}

/// One whole token in the smallest on-chain unit (10^decimals)
#[must_use]
pub(crate) fn token_unit(decimals: u32) -> Decimal {
    Decimal::from_i128_with_scale(10i128.pow(decimals), 0)
}
