//! Fill tracker
//!
//! Post-trade enrichment for the market-making order book: discovers settled
//! executions on OKX and Trader Joe for orders the placement pipeline left in
//! `CREATED`, computes canonical fill attributes (amounts, tokens, average
//! price, fees) and transitions each row to `FILLED`.
//!
//! Pipeline shape:
//! - Tailing reader: polls the order table past a watermark
//! - Rolling buffer: bounded FIFO between reader and dispatcher
//! - Dispatcher: batches the head, fans out under a semaphore
//! - Per-venue reconcilers backed by refilling fill caches

#![warn(missing_docs)]
#![forbid(unsafe_code)]

use std::sync::Arc;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tracing::info;

pub mod cache;
pub mod config;
pub mod error;
pub mod order;
pub mod persistence;
pub mod pipeline;
pub mod reconciler;
pub mod venues;

use cache::FillCache;
use config::TrackerConfig;
use error::TrackerResult;
use persistence::{OrderStore, PersistenceManager};
use pipeline::{Dispatcher, OrderBuffer, TailingReader};
use reconciler::okx::OkxReconciler;
use reconciler::trader_joe::TraderJoeReconciler;
use venues::okx::OkxClient;
use venues::snowtrace::SnowtraceClient;

/// The assembled fill-reconciliation service
pub struct FillTracker {
    config: TrackerConfig,
    pool: PgPool,
}

impl FillTracker {
    /// Connect to the database and prepare the schema
    pub async fn connect(config: TrackerConfig) -> TrackerResult<Self> {
        info!("Connecting to {} as {}", config.database.host, config.database.user);
        let pool = PgPoolOptions::new()
            .max_connections(config.database.pool_size)
            .connect(&config.database.url())
            .await?;
        persistence::run_migrations(&pool).await?;
        Ok(Self { config, pool })
    }

    /// Run the pipeline until a shutdown signal arrives.
    ///
    /// Both loops exit at their next suspension point after ctrl-c;
    /// in-flight reconciliations run to completion.
    pub async fn run(self) -> TrackerResult<()> {
        let market = self.config.market.clone();
        let pipeline = self.config.pipeline.clone();

        let store: Arc<dyn OrderStore> = Arc::new(PersistenceManager::new(
            self.pool.clone(),
            market.min_order_size,
            pipeline.fetch_page_size,
        ));

        let okx_client = OkxClient::new(self.config.okx.clone(), &market.pair);
        let okx_cache = Arc::new(FillCache::new(
            Box::new(okx_client),
            market.history_floor_ms.max(0) as u64,
            pipeline.max_refill_pages,
        ));
        let okx_reconciler = Arc::new(OkxReconciler::new(
            Arc::clone(&store),
            okx_cache,
            market.history_floor(),
        ));

        let snowtrace = SnowtraceClient::new(self.config.snowtrace.clone());
        let transfer_cache = Arc::new(FillCache::new(
            Box::new(snowtrace.clone()),
            0,
            pipeline.max_refill_pages,
        ));
        let trader_joe_reconciler = Arc::new(TraderJoeReconciler::new(
            Arc::clone(&store),
            transfer_cache,
            Arc::new(snowtrace),
            &self.config.snowtrace.wallet_address,
            market.clone(),
        ));

        let buffer = Arc::new(OrderBuffer::new(pipeline.buffer_capacity));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reader = TailingReader::new(
            Arc::clone(&store),
            Arc::clone(&buffer),
            market.history_floor(),
            pipeline.poll_interval,
            shutdown_rx.clone(),
        );
        let dispatcher = Dispatcher::new(
            buffer,
            okx_reconciler,
            trader_joe_reconciler,
            pipeline.reconcile_permits,
            pipeline.dispatch_batch,
            pipeline.idle_backoff,
            shutdown_rx,
        );

        let reader_task = tokio::spawn(reader.run());
        let dispatcher_task = tokio::spawn(dispatcher.run());
        info!("Fill tracker running for {}", market.pair);

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received, draining in-flight work");
        let _ = shutdown_tx.send(true);
        let _ = tokio::join!(reader_task, dispatcher_task);

        Ok(())
    }
}
