//! End-to-end reconciliation scenarios over stubbed venues
//!
//! Each test drives a reconciler exactly the way the dispatcher does and
//! asserts on the updates captured by the recording store.

use std::sync::Arc;

use chrono::TimeZone;
use chrono::Utc;
use pretty_assertions::assert_eq;
use rust_decimal_macros::dec;
use serde_json::json;

use fill_tracker::config::MarketConfig;
use fill_tracker::order::{OrderStatus, TradeSide};
use fill_tracker::reconciler::ReconcileOutcome;
use fill_tracker::reconciler::okx::OkxReconciler;
use fill_tracker::reconciler::trader_joe::TraderJoeReconciler;
use fill_tracker::venues::InternalTransfer;

use crate::common::{
    RecordingStore, StaticInternalSource, TEST_WALLET, gas_fee_json, okx_filled_record, okx_order,
    page, scripted_cache, token_transfer, trader_joe_order,
};

fn okx_reconciler_over(
    store: Arc<RecordingStore>,
    pages: Vec<fill_tracker::cache::FillPage<fill_tracker::venues::okx::OkxFillRecord>>,
) -> (
    OkxReconciler,
    Arc<crate::common::ScriptedSource<fill_tracker::venues::okx::OkxFillRecord>>,
) {
    let (cache, source) = scripted_cache(pages);
    let reconciler = OkxReconciler::new(store, cache, MarketConfig::default().history_floor());
    (reconciler, source)
}

fn trader_joe_reconciler_over(
    store: Arc<RecordingStore>,
    pages: Vec<fill_tracker::cache::FillPage<fill_tracker::venues::snowtrace::TokenTransfer>>,
    internal: StaticInternalSource,
) -> TraderJoeReconciler {
    let (cache, _source) = scripted_cache(pages);
    TraderJoeReconciler::new(
        store,
        cache,
        Arc::new(internal),
        TEST_WALLET,
        MarketConfig::default(),
    )
}

#[tokio::test]
async fn test_okx_fill_enriches_order() {
    let store = Arc::new(RecordingStore::new());
    let order = okx_order("A1", dec!(2000));
    let (reconciler, source) = okx_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![("A1", okx_filled_record("A1", dec!(10.12345), dec!(2000)))],
            1_700_000_000_001,
        )],
    );

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated);
    assert_eq!(source.fetch_count(), 1);

    let update = store.update_for(order.id);
    assert_eq!(update.status, OrderStatus::Filled);
    assert_eq!(update.input_amount, None);
    assert_eq!(update.input_token, None);
    assert_eq!(update.output_amount, None);
    assert_eq!(update.output_token, None);
    assert_eq!(update.average_fill_price, Some(dec!(10.1234)));
    assert_eq!(
        update.fee_info,
        json!({"fee": dec!(0.5), "fee_token": "USDT"})
    );
}

#[tokio::test]
async fn test_okx_unsettled_order_is_left_alone() {
    let store = Arc::new(RecordingStore::new());
    let order = okx_order("A9", dec!(2000));
    let mut record = okx_filled_record("A9", dec!(10), dec!(0));
    record.status = "canceled".to_string();
    let (reconciler, _source) =
        okx_reconciler_over(Arc::clone(&store), vec![page(vec![("A9", record)], 1)]);

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::NotSettled);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn test_okx_age_gate_drops_ancient_orders() {
    let store = Arc::new(RecordingStore::new());
    let mut order = okx_order("A2", dec!(2000));
    order.created_time = Utc.with_ymd_and_hms(2022, 6, 1, 0, 0, 0).unwrap();
    let (reconciler, source) = okx_reconciler_over(Arc::clone(&store), vec![]);

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::AgedOut);
    // The venue is never asked about orders it no longer returns.
    assert_eq!(source.fetch_count(), 0);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn test_okx_missing_row_is_skipped() {
    let store = Arc::new(RecordingStore::new());
    let order = okx_order("A3", dec!(2000));
    store.mark_missing(order.id);
    let (reconciler, _source) = okx_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![("A3", okx_filled_record("A3", dec!(10), dec!(2000)))],
            1,
        )],
    );

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::OrderMissing);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn test_trader_joe_sell_arithmetic() {
    let store = Arc::new(RecordingStore::new());
    let order = trader_joe_order(TradeSide::Sell, dec!(100), Some(dec!(20)), "0xab");
    let reconciler = trader_joe_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![("0xab", token_transfer("0xab", 100, dec!(2000000000)))],
            101,
        )],
        StaticInternalSource::new(),
    );

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated);

    let update = store.update_for(order.id);
    assert_eq!(update.status, OrderStatus::Filled);
    assert_eq!(update.input_amount, Some(dec!(5.0000)));
    assert_eq!(update.input_token, Some("AVAX".to_string()));
    assert_eq!(update.output_amount, Some(dec!(2000.0000)));
    assert_eq!(update.output_token, Some("USDT".to_string()));
    assert_eq!(update.average_fill_price, Some(dec!(400.0000)));
    assert_eq!(update.fee_info, gas_fee_json());

    // Sell consistency: what went in times the fill price is what came out.
    let input = update.input_amount.unwrap();
    let output = update.output_amount.unwrap();
    let average = update.average_fill_price.unwrap();
    assert_eq!(input * average, output);
}

#[tokio::test]
async fn test_trader_joe_buy_arithmetic() {
    let store = Arc::new(RecordingStore::new());
    let order = trader_joe_order(TradeSide::Buy, dec!(2000), None, "0xcd");
    let internal = StaticInternalSource::new().with_transfers(
        "0xcd",
        vec![InternalTransfer {
            to: TEST_WALLET.to_string(),
            value: dec!(100000000000000000000),
        }],
    );
    let reconciler = trader_joe_reconciler_over(
        Arc::clone(&store),
        vec![
            // First page misses the hash; the next one carries it.
            page(vec![("0x99", token_transfer("0x99", 90, dec!(1)))], 91),
            page(
                vec![("0xcd", token_transfer("0xcd", 120, dec!(2000000000)))],
                121,
            ),
        ],
        internal,
    );

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Updated);

    let update = store.update_for(order.id);
    assert_eq!(update.input_amount, Some(dec!(2000)));
    assert_eq!(update.input_token, Some("USDT".to_string()));
    assert_eq!(update.output_amount, Some(dec!(100.0000)));
    assert_eq!(update.output_token, Some("AVAX".to_string()));
    assert_eq!(update.average_fill_price, Some(dec!(20.0000)));

    // Buy consistency: what came out times the fill price is what went in.
    let input = update.input_amount.unwrap();
    let output = update.output_amount.unwrap();
    let average = update.average_fill_price.unwrap();
    assert_eq!(output * average, input);
}

#[tokio::test]
async fn test_trader_joe_buy_rejects_foreign_recipient() {
    let store = Arc::new(RecordingStore::new());
    let order = trader_joe_order(TradeSide::Buy, dec!(2000), None, "0xcd");
    let internal = StaticInternalSource::new().with_transfers(
        "0xcd",
        vec![InternalTransfer {
            to: "0x3333333333333333333333333333333333333333".to_string(),
            value: dec!(100000000000000000000),
        }],
    );
    let reconciler = trader_joe_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![("0xcd", token_transfer("0xcd", 120, dec!(2000000000)))],
            121,
        )],
        internal,
    );

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Inconsistent);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn test_concurrent_okx_misses_share_one_refill() {
    let store = Arc::new(RecordingStore::new());
    let first = okx_order("B1", dec!(1500));
    let second = okx_order("B2", dec!(1600));
    let (reconciler, source) = okx_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![
                ("B1", okx_filled_record("B1", dec!(10), dec!(1500))),
                ("B2", okx_filled_record("B2", dec!(11), dec!(1600))),
            ],
            1_700_000_000_001,
        )],
    );

    let (left, right) = tokio::join!(reconciler.process(&first), reconciler.process(&second));
    assert_eq!(left.unwrap(), ReconcileOutcome::Updated);
    assert_eq!(right.unwrap(), ReconcileOutcome::Updated);
    assert_eq!(source.fetch_count(), 1);
    assert_eq!(store.update_count(), 2);
}

#[tokio::test]
async fn test_transfer_never_on_chain_is_skipped() {
    let store = Arc::new(RecordingStore::new());
    let order = trader_joe_order(TradeSide::Sell, dec!(100), Some(dec!(20)), "0xdead");
    let reconciler = trader_joe_reconciler_over(
        Arc::clone(&store),
        // A page without the hash, then the feed runs dry.
        vec![page(vec![("0x77", token_transfer("0x77", 50, dec!(1)))], 51)],
        StaticInternalSource::new(),
    );

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::FillUnavailable);
    assert_eq!(store.update_count(), 0);
}

#[tokio::test]
async fn test_replay_produces_no_state_change() {
    let store = Arc::new(RecordingStore::new());
    let order = okx_order("C1", dec!(2000));
    let (reconciler, _source) = okx_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![("C1", okx_filled_record("C1", dec!(10.12345), dec!(2000)))],
            1_700_000_000_001,
        )],
    );

    assert_eq!(
        reconciler.process(&order).await.unwrap(),
        ReconcileOutcome::Updated
    );
    assert_eq!(store.update_count(), 1);

    // Replay through the same reconciler: the entry was purged and the feed
    // is dry, so the order is just not enriched again.
    assert_eq!(
        reconciler.process(&order).await.unwrap(),
        ReconcileOutcome::FillUnavailable
    );
    assert_eq!(store.update_count(), 1);

    // Replay with the fill visible again: the store refuses to downgrade.
    let (fresh, _source) = okx_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![("C1", okx_filled_record("C1", dec!(10.12345), dec!(2000)))],
            1_700_000_000_001,
        )],
    );
    assert_eq!(
        fresh.process(&order).await.unwrap(),
        ReconcileOutcome::AlreadyFinal
    );
    assert_eq!(store.update_count(), 1);
}

#[tokio::test]
async fn test_sell_without_price_is_inconsistent() {
    let store = Arc::new(RecordingStore::new());
    let order = trader_joe_order(TradeSide::Sell, dec!(100), None, "0xab");
    let reconciler = trader_joe_reconciler_over(
        Arc::clone(&store),
        vec![page(
            vec![("0xab", token_transfer("0xab", 100, dec!(2000000000)))],
            101,
        )],
        StaticInternalSource::new(),
    );

    let outcome = reconciler.process(&order).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Inconsistent);
    assert_eq!(store.update_count(), 0);
}
