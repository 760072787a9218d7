//! Per-venue fill cache with coalesced, cursor-advancing refills
//!
//! A cache miss triggers a batch fetch from the venue that starts at the
//! pagination cursor the cache owns. Concurrent misses coalesce onto a
//! single in-flight refill; one fetched page typically settles many waiting
//! lookups at once.

use async_trait::async_trait;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::TrackerResult;

/// One page of fill records fetched from a venue
#[derive(Debug, Clone)]
pub struct FillPage<R> {
    /// Records keyed by the venue lookup key, normalized on ingress
    pub records: Vec<(String, R)>,
    /// Cursor for the next fetch, strictly past the last observed item;
    /// equal to the request cursor when the page is empty
    pub next_cursor: u64,
}

/// A paginating venue feed the cache refills from
#[async_trait]
pub trait FillSource<R>: Send + Sync {
    /// Fetch one page of records starting at `cursor`
    async fn fetch_page(&self, cursor: u64) -> TrackerResult<FillPage<R>>;
}

/// Keyed fill store for one venue
pub struct FillCache<R> {
    source: Box<dyn FillSource<R>>,
    entries: RwLock<FxHashMap<String, R>>,
    // The refill gate doubles as the cursor's home: holding the lock is what
    // makes a task the sole refiller, and the cursor is only read or advanced
    // while held.
    cursor: Mutex<u64>,
    max_pages: u32,
}

impl<R: Clone + Send + Sync + 'static> FillCache<R> {
    /// Create a cache over `source`, starting pagination at `initial_cursor`
    pub fn new(source: Box<dyn FillSource<R>>, initial_cursor: u64, max_pages: u32) -> Self {
        Self {
            source,
            entries: RwLock::new(FxHashMap::default()),
            cursor: Mutex::new(initial_cursor),
            max_pages,
        }
    }

    /// Non-refilling read of the current cache contents
    #[must_use]
    pub fn peek(&self, key: &str) -> Option<R> {
        self.entries.read().get(key).cloned()
    }

    /// Look up `key`, refilling from the venue until it appears or the feed
    /// runs dry.
    ///
    /// Returns `None` once a refill comes back empty or the page budget is
    /// exhausted; the caller treats that as "fill data not available yet".
    pub async fn lookup(&self, key: &str) -> TrackerResult<Option<R>> {
        if let Some(record) = self.peek(key) {
            debug!("Cache hit for {}", key);
            return Ok(Some(record));
        }

        info!("Cache miss for {}, triggering refill", key);
        let mut cursor = self.cursor.lock().await;

        // A refill we waited on may already have landed the key.
        if let Some(record) = self.peek(key) {
            debug!("Cache hit for {} after waiting on refill", key);
            return Ok(Some(record));
        }

        for _ in 0..self.max_pages {
            let page = self.source.fetch_page(*cursor).await?;
            if page.records.is_empty() {
                debug!("Refill at cursor {} returned no records; {} stays absent", *cursor, key);
                return Ok(None);
            }

            *cursor = (*cursor).max(page.next_cursor);
            let fetched = page.records.len();
            {
                let mut entries = self.entries.write();
                for (record_key, record) in page.records {
                    entries.insert(record_key, record);
                }
                info!("Refill added {} records, cache size now {}", fetched, entries.len());
            }

            if let Some(record) = self.peek(key) {
                return Ok(Some(record));
            }
        }

        warn!(
            "Gave up on {} after {} refill pages without an empty response",
            key, self.max_pages
        );
        Ok(None)
    }

    /// Drop a consumed entry so the cache stays bounded
    pub fn purge(&self, key: &str) {
        self.entries.write().remove(key);
    }

    /// Number of cached records
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no records
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<R> std::fmt::Debug for FillCache<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FillCache")
            .field("entries", &self.entries.read().len())
            .field("max_pages", &self.max_pages)
            .finish()
    }
}
