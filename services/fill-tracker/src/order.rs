//! Order row model and domain enums
//!
//! The `"order"` table is written by the placement pipeline; this service
//! only reads `CREATED` rows and transitions them to `FILLED` with the
//! enrichment columns populated.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::error::{TrackerError, TrackerResult};

/// Venue an order was placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exchange {
    /// OKX spot (centralized)
    Okx,
    /// Trader Joe on Avalanche (on-chain)
    TraderJoe,
}

impl Exchange {
    /// Database text representation
    #[must_use]
    pub const fn as_db(&self) -> &'static str {
        match self {
            Self::Okx => "OKX",
            Self::TraderJoe => "TRADER_JOE",
        }
    }

    /// Parse from the database text representation
    pub fn from_db(s: &str) -> TrackerResult<Self> {
        match s {
            "OKX" => Ok(Self::Okx),
            "TRADER_JOE" => Ok(Self::TraderJoe),
            other => Err(TrackerError::Decode {
                context: format!("unknown exchange '{other}'"),
            }),
        }
    }
}

/// Side of the trade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    /// Buying the base token with quote
    Buy,
    /// Selling the base token for quote
    Sell,
}

impl TradeSide {
    /// Database text representation
    #[must_use]
    pub const fn as_db(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }

    /// Parse from the database text representation
    pub fn from_db(s: &str) -> TrackerResult<Self> {
        match s {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            other => Err(TrackerError::Decode {
                context: format!("unknown trade side '{other}'"),
            }),
        }
    }
}

/// Order type as recorded by the placement pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderType {
    /// Market order
    Market,
    /// Limit order
    Limit,
    /// Post-only limit order
    LimitMaker,
}

impl OrderType {
    /// Database text representation
    #[must_use]
    pub const fn as_db(&self) -> &'static str {
        match self {
            Self::Market => "MARKET",
            Self::Limit => "LIMIT",
            Self::LimitMaker => "LIMIT_MAKER",
        }
    }

    /// Parse from the database text representation
    pub fn from_db(s: &str) -> TrackerResult<Self> {
        match s {
            "MARKET" => Ok(Self::Market),
            "LIMIT" => Ok(Self::Limit),
            "LIMIT_MAKER" => Ok(Self::LimitMaker),
            other => Err(TrackerError::Decode {
                context: format!("unknown order type '{other}'"),
            }),
        }
    }

    /// Whether this order rests on the book
    #[must_use]
    pub const fn is_limit_type(&self) -> bool {
        matches!(self, Self::Limit | Self::LimitMaker)
    }
}

/// Lifecycle state of an order row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Placed, fill not yet reconciled
    Created,
    /// Cancelled before filling
    Cancelled,
    /// Fill reconciled and enrichment columns written
    Filled,
}

impl OrderStatus {
    /// Database text representation
    #[must_use]
    pub const fn as_db(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Cancelled => "CANCELLED",
            Self::Filled => "FILLED",
        }
    }

    /// Parse from the database text representation
    pub fn from_db(s: &str) -> TrackerResult<Self> {
        match s {
            "CREATED" => Ok(Self::Created),
            "CANCELLED" => Ok(Self::Cancelled),
            "FILLED" => Ok(Self::Filled),
            other => Err(TrackerError::Decode {
                context: format!("unknown order status '{other}'"),
            }),
        }
    }

    /// Whether the row has reached a final state
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Filled)
    }
}

/// Immutable snapshot of one `"order"` row at read time
#[derive(Debug, Clone)]
pub struct OrderRow {
    /// Unique order id (wall-clock nanoseconds at creation)
    pub id: i64,
    /// Pairing key linking the two legs of an arbitrage round trip
    pub stitch_id: Option<i64>,
    /// Symbolic market, e.g. "AVAX/USDT"
    pub pair: String,
    /// Limit price, absent for market orders
    pub price: Option<Decimal>,
    /// Venue the order was placed on
    pub exchange: Exchange,
    /// Order size as recorded at placement
    pub size: Decimal,
    /// Order type
    pub order_type: OrderType,
    /// Trade side
    pub trade_side: TradeSide,
    /// Lifecycle state
    pub status: OrderStatus,
    /// Venue-side order identifier
    pub exchange_order_id: String,
    /// On-chain transaction hash, required for Trader Joe orders
    pub transaction_hash: Option<String>,
    /// Row creation time
    pub created_time: DateTime<Utc>,
    /// Last mutation time, non-decreasing
    pub last_updated_time: DateTime<Utc>,
    /// Amount paid into the venue (null until filled)
    pub input_amount: Option<Decimal>,
    /// Token the input amount is denominated in
    pub input_token: Option<String>,
    /// Amount received from the venue (null until filled)
    pub output_amount: Option<Decimal>,
    /// Token the output amount is denominated in
    pub output_token: Option<String>,
    /// Volume-weighted fill price
    pub average_fill_price: Option<Decimal>,
    /// Venue fee details, shape differs per venue
    pub fee_info: Option<serde_json::Value>,
}

/// Enrichment payload applied when an order transitions to its final state
#[derive(Debug, Clone, PartialEq)]
pub struct FillUpdate {
    /// New lifecycle state
    pub status: OrderStatus,
    /// Amount paid into the venue
    pub input_amount: Option<Decimal>,
    /// Token the input amount is denominated in
    pub input_token: Option<String>,
    /// Amount received from the venue
    pub output_amount: Option<Decimal>,
    /// Token the output amount is denominated in
    pub output_token: Option<String>,
    /// Volume-weighted fill price, rounded to 4 decimal places
    pub average_fill_price: Option<Decimal>,
    /// Venue fee details
    pub fee_info: serde_json::Value,
}

/// Generate an order id from the wall clock at nanosecond granularity.
///
/// Shared scheme with the placement writer; collisions would need two ids in
/// the same nanosecond, which the single-writer placement loop never produces.
#[must_use]
pub fn next_order_id() -> i64 {
    Utc::now().timestamp_nanos_opt().unwrap_or_default()
}
