//! OKX fill reconciliation
//!
//! OKX keys order history by the venue order id, so the cache is keyed by
//! `exchange_order_id` and the cursor is the epoch-ms fill time.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::cache::FillCache;
use crate::error::TrackerResult;
use crate::order::{FillUpdate, OrderRow, OrderStatus};
use crate::persistence::{OrderStore, UpdateOutcome};
use crate::reconciler::{ReconcileOutcome, round4};
use crate::venues::okx::{OKX_STATE_FILLED, OkxFillRecord};

/// Reconciles OKX orders against the venue's closed-order history
pub struct OkxReconciler {
    store: Arc<dyn OrderStore>,
    cache: Arc<FillCache<OkxFillRecord>>,
    history_floor: DateTime<Utc>,
}

impl OkxReconciler {
    /// Create a reconciler over the shared store and fill cache
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        cache: Arc<FillCache<OkxFillRecord>>,
        history_floor: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            cache,
            history_floor,
        }
    }

    /// Reconcile one OKX order snapshot
    pub async fn process(&self, order: &OrderRow) -> TrackerResult<ReconcileOutcome> {
        // OKX stops returning history for sufficiently old orders; looking
        // them up would only churn the cursor.
        if order.created_time < self.history_floor {
            debug!("Order {} predates the OKX history floor; dropping", order.id);
            return Ok(ReconcileOutcome::AgedOut);
        }

        let Some(record) = self.cache.lookup(&order.exchange_order_id).await? else {
            info!(
                "No fill data available for OKX order {} (id {})",
                order.exchange_order_id, order.id
            );
            return Ok(ReconcileOutcome::FillUnavailable);
        };

        if record.status != OKX_STATE_FILLED {
            debug!(
                "OKX order {} is '{}', leaving row untouched",
                order.exchange_order_id, record.status
            );
            return Ok(ReconcileOutcome::NotSettled);
        }

        let update = FillUpdate {
            status: OrderStatus::Filled,
            input_amount: None,
            input_token: None,
            output_amount: None,
            output_token: None,
            average_fill_price: record.average_fill_price.map(round4),
            fee_info: json!({
                "fee": record.fee.amount,
                "fee_token": record.fee.token,
            }),
        };

        match self.store.apply_fill(order.id, &update).await? {
            UpdateOutcome::Updated => {
                self.cache.purge(&order.exchange_order_id);
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
}
