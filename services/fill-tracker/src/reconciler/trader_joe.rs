//! Trader Joe fill reconciliation
//!
//! On-chain fills are keyed by transaction hash. The token-transfer record
//! carries the USDT leg and the gas accounting; for buys, the AVAX received
//! only shows up as an internal transfer, so that leg is fetched per
//! transaction and in parallel with the cache lookup.

use std::sync::Arc;

use serde_json::json;
use tracing::{error, info, warn};

use crate::cache::FillCache;
use crate::config::MarketConfig;
use crate::error::{TrackerError, TrackerResult};
use crate::order::{FillUpdate, OrderRow, OrderStatus, TradeSide};
use crate::persistence::{OrderStore, UpdateOutcome};
use crate::reconciler::{ReconcileOutcome, round4, token_unit};
use crate::venues::snowtrace::TokenTransfer;
use crate::venues::{InternalTransfer, InternalTransferSource};

/// Reconciles Trader Joe orders against explorer token transfers
pub struct TraderJoeReconciler {
    store: Arc<dyn OrderStore>,
    cache: Arc<FillCache<TokenTransfer>>,
    internal_source: Arc<dyn InternalTransferSource>,
    wallet: String,
    market: MarketConfig,
}

impl TraderJoeReconciler {
    /// Create a reconciler over the shared store, fill cache and explorer
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<FillCache<TokenTransfer>>,
        internal_source: Arc<dyn InternalTransferSource>,
        wallet: &str,
        market: MarketConfig,
    ) -> Self {
        Self {
            store,
            cache,
            internal_source,
            wallet: wallet.to_lowercase(),
            market,
        }
    }

    /// Reconcile one Trader Joe order snapshot
    pub async fn process(&self, order: &OrderRow) -> TrackerResult<ReconcileOutcome> {
        let Some(hash) = order.transaction_hash.as_deref() else {
            warn!("Trader Joe order {} has no transaction hash; skipping", order.id);
            return Ok(ReconcileOutcome::FillUnavailable);
        };
        let key = hash.to_lowercase();

        // Buys need the internal-transfer leg as well; issue both requests
        // together so a cache miss refill and the per-tx lookup overlap.
        let (transfer, internals) = match order.trade_side {
            TradeSide::Buy => {
                let (transfer, internals) = tokio::join!(
                    self.cache.lookup(&key),
                    self.internal_source.internal_transfers(hash)
                );
                (transfer?, Some(internals?))
            }
            TradeSide::Sell => (self.cache.lookup(&key).await?, None),
        };

        let Some(transfer) = transfer else {
            // Not indexed yet, or the transaction never made it on chain.
            info!("No token transfer found for {} (order {})", key, order.id);
            return Ok(ReconcileOutcome::FillUnavailable);
        };

        let fill = match order.trade_side {
            TradeSide::Buy => self.buy_fill(order, &transfer, internals.unwrap_or_default())?,
            TradeSide::Sell => self.sell_fill(order, &transfer),
        };
        let Some(update) = fill else {
            return Ok(ReconcileOutcome::Inconsistent);
        };

        match self.store.apply_fill(order.id, &update).await? {
            UpdateOutcome::Updated => {
                self.cache.purge(&key);
                info!("Order {} filled at {:?}", order.id, update.average_fill_price);
                Ok(ReconcileOutcome::Updated)
            }
            UpdateOutcome::AlreadyFinal => Ok(ReconcileOutcome::AlreadyFinal),
            UpdateOutcome::NotFound => {
                warn!("Order {} disappeared before its fill update", order.id);
                Ok(ReconcileOutcome::OrderMissing)
            }
        }
    }

    // Buy: USDT in (the order size), AVAX out via the last internal transfer
    // paying our wallet.
    fn buy_fill(
        &self,
        order: &OrderRow,
        transfer: &TokenTransfer,
        internals: Vec<InternalTransfer>,
    ) -> TrackerResult<Option<FillUpdate>> {
        let Some(last) = internals.last() else {
            return Err(TrackerError::Venue {
                context: format!(
                    "transaction {} produced no internal transfers",
                    transfer.hash
                ),
            });
        };

        if last.to != self.wallet {
            error!(
                "Internal transfer for {} pays {} instead of the trading wallet; order {} skipped",
                transfer.hash, last.to, order.id
            );
            return Ok(None);
        }

        let output_amount = round4(last.value / token_unit(self.market.base_decimals));
        let average_fill_price = if output_amount.is_zero() {
            None
        } else {
            Some(round4(order.size / output_amount))
        };

        Ok(Some(FillUpdate {
            status: OrderStatus::Filled,
            input_amount: Some(order.size),
            input_token: Some(self.market.quote_token.clone()),
            output_amount: Some(output_amount),
            output_token: Some(self.market.base_token.clone()),
            average_fill_price,
            fee_info: gas_fee_info(transfer),
        }))
    }

    // Sell: AVAX in (size divided by limit price), USDT out via the token
    // transfer itself.
    fn sell_fill(&self, order: &OrderRow, transfer: &TokenTransfer) -> Option<FillUpdate> {
        let Some(price) = order.price.filter(|price| !price.is_zero()) else {
            error!(
                "Sell order {} has no usable price; cannot derive the input amount",
                order.id
            );
            return None;
        };

        let input_amount = round4(order.size / price);
        let output_amount = transfer.value / token_unit(self.market.quote_decimals);
        let average_fill_price = if input_amount.is_zero() {
            None
        } else {
            Some(round4(output_amount / input_amount))
        };

        Some(FillUpdate {
            status: OrderStatus::Filled,
            input_amount: Some(input_amount),
            input_token: Some(self.market.base_token.clone()),
            output_amount: Some(output_amount),
            output_token: Some(self.market.quote_token.clone()),
            average_fill_price,
            fee_info: gas_fee_info(transfer),
        })
    }
}

fn gas_fee_info(transfer: &TokenTransfer) -> serde_json::Value {
    json!({
        "gas": transfer.gas,
        "gasPrice": transfer.gas_price,
        "gasUsed": transfer.gas_used,
        "cumulativeGasUsed": transfer.cumulative_gas_used,
    })
}
