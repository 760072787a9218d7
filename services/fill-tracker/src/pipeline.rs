//! Tailing reader, rolling buffer and dispatcher
//!
//! The reader polls the order table past a watermark and appends snapshots
//! to a bounded FIFO; the dispatcher drains the head in batches, fanning
//! each batch out to the venue reconcilers under a concurrency cap.
//!
//! Buffer discipline: only the reader appends (tail) and only the
//! dispatcher removes (head). The watermark is derived from the last row
//! actually appended, so a head insert would corrupt the correspondence
//! between watermark and buffered rows.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{Semaphore, watch};
use tokio::time::{interval, sleep};
use tracing::{debug, error, info, warn};

use crate::order::{Exchange, OrderRow};
use crate::persistence::OrderStore;
use crate::reconciler::okx::OkxReconciler;
use crate::reconciler::trader_joe::TraderJoeReconciler;

/// How an append interacted with the buffer's capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendReport {
    /// Rows that made it into the buffer
    pub appended: usize,
    /// Rows cut from the batch because the buffer was full
    pub truncated: usize,
}

/// Bounded FIFO of order snapshots between the reader and the dispatcher
#[derive(Debug)]
pub struct OrderBuffer {
    entries: Mutex<VecDeque<OrderRow>>,
    capacity: usize,
}

impl OrderBuffer {
    /// Create a buffer holding at most `capacity` rows
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Append a batch at the tail, truncating it to the remaining capacity
    pub fn append(&self, mut batch: Vec<OrderRow>) -> AppendReport {
        let mut entries = self.entries.lock();
        let open_slots = self.capacity.saturating_sub(entries.len());
        let truncated = batch.len().saturating_sub(open_slots);
        batch.truncate(open_slots);
        let appended = batch.len();
        entries.extend(batch);
        AppendReport {
            appended,
            truncated,
        }
    }

    /// Clone up to `count` rows from the head without removing them
    #[must_use]
    pub fn snapshot_front(&self, count: usize) -> Vec<OrderRow> {
        self.entries.lock().iter().take(count).cloned().collect()
    }

    /// Remove `count` processed rows from the head
    pub fn pop_front(&self, count: usize) {
        let mut entries = self.entries.lock();
        for _ in 0..count {
            entries.pop_front();
        }
    }

    /// Rows currently buffered
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether the buffer holds no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Polls the order table and feeds the rolling buffer
pub struct TailingReader {
    store: Arc<dyn OrderStore>,
    buffer: Arc<OrderBuffer>,
    watermark: DateTime<Utc>,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl TailingReader {
    /// Create a reader starting at `watermark`
    #[must_use]
    pub fn new(
        store: Arc<dyn OrderStore>,
        buffer: Arc<OrderBuffer>,
        watermark: DateTime<Utc>,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            buffer,
            watermark,
            poll_interval,
            shutdown,
        }
    }

    /// Run until the shutdown flag flips
    pub async fn run(mut self) {
        let mut ticker = interval(self.poll_interval);
        info!("Tailing reader started at watermark {}", self.watermark);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.shutdown.changed() => break,
            }
            if *self.shutdown.borrow() {
                break;
            }

            let rows = match self.store.fetch_created_since(self.watermark).await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!("Order fetch failed, retrying next tick: {}", e);
                    continue;
                }
            };
            if rows.is_empty() {
                continue;
            }

            // The watermark only advances past rows that made it into the
            // buffer; a truncated tail is re-read on the next tick.
            let created_times: Vec<DateTime<Utc>> =
                rows.iter().map(|row| row.created_time).collect();
            let report = self.buffer.append(rows);
            if report.truncated > 0 {
                error!(
                    "Rolling buffer full: {} rows truncated, increase capacity or throughput",
                    report.truncated
                );
            }
            if report.appended > 0 {
                self.watermark = created_times[report.appended - 1];
                info!(
                    "Buffered {} new orders, watermark now {}",
                    report.appended, self.watermark
                );
            }
        }

        info!("Tailing reader stopped");
    }
}

/// Drains the rolling buffer and fans batches out to the reconcilers
pub struct Dispatcher {
    buffer: Arc<OrderBuffer>,
    okx: Arc<OkxReconciler>,
    trader_joe: Arc<TraderJoeReconciler>,
    permits: Arc<Semaphore>,
    batch_size: usize,
    idle_backoff: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Dispatcher {
    /// Create a dispatcher over the shared buffer and reconcilers
    #[must_use]
    pub fn new(
        buffer: Arc<OrderBuffer>,
        okx: Arc<OkxReconciler>,
        trader_joe: Arc<TraderJoeReconciler>,
        reconcile_permits: usize,
        batch_size: usize,
        idle_backoff: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            buffer,
            okx,
            trader_joe,
            permits: Arc::new(Semaphore::new(reconcile_permits)),
            batch_size,
            idle_backoff,
            shutdown,
        }
    }

    /// Run until the shutdown flag flips; in-flight batches finish first
    pub async fn run(mut self) {
        info!("Dispatcher started");

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            let batch = self.buffer.snapshot_front(self.batch_size);
            if batch.is_empty() {
                tokio::select! {
                    _ = sleep(self.idle_backoff) => {}
                    _ = self.shutdown.changed() => break,
                }
                continue;
            }

            let mut handles = Vec::with_capacity(batch.len());
            for order in &batch {
                let permit = match Arc::clone(&self.permits).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                let okx = Arc::clone(&self.okx);
                let trader_joe = Arc::clone(&self.trader_joe);
                let order = order.clone();
                handles.push((
                    order.id,
                    tokio::spawn(async move {
                        let _permit = permit;
                        match order.exchange {
                            Exchange::Okx => okx.process(&order).await,
                            Exchange::TraderJoe => trader_joe.process(&order).await,
                        }
                    }),
                ));
            }

            // Failures stay with their order: log and move on, siblings are
            // unaffected and the row is retried on a later tailing pass.
            for (order_id, handle) in handles {
                match handle.await {
                    Ok(Ok(outcome)) => {
                        debug!("Order {} reconciled: {:?}", order_id, outcome);
                    }
                    Ok(Err(e)) => {
                        error!("Reconciliation failed for order {}: {}", order_id, e);
                    }
                    Err(e) => {
                        error!("Reconciliation task for order {} panicked: {}", order_id, e);
                    }
                }
            }

            // Entries leave the buffer only after their task has terminated.
            self.buffer.pop_front(batch.len());
        }

        info!("Dispatcher stopped");
    }
}
