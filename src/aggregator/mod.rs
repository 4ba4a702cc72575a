//! Single-writer aggregation engine.
//!
//! All connectors funnel change notifications into one mpsc queue drained by
//! a single task; that task is the only place the consolidated book and the
//! published snapshot are ever written. Readers go through the same queue, so
//! they always observe a fully-built snapshot, never a partial rebuild. The
//! version counter alone is shared as an atomic so subscribers can poll for
//! "anything new" without entering the queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

use crate::error::FeedError;
use crate::metrics;
use crate::orderbook::{BookSnapshot, ConsolidatedBook, OrderBook};
use crate::venue::Venue;

/// Notification queue depth. Bursts beyond this are dropped by
/// [`AggregatorHandle::notify_book_changed`], which is safe because every
/// rebuild reads the current state of all books: any queued notification
/// processed after a book write already reflects that write.
const NOTIFY_QUEUE_DEPTH: usize = 256;

/// Messages processed by the aggregator task, one at a time.
#[derive(Debug)]
enum AggregatorMessage {
    /// A connector applied an update to its book.
    BookChanged {
        /// Venue whose book changed. Informational only: the rebuild reads
        /// every venue's current book, so processing is idempotent.
        venue: Venue,
    },
    /// Read the latest snapshot through the serialized queue.
    Snapshot {
        reply: oneshot::Sender<Arc<BookSnapshot>>,
    },
}

/// Cloneable handle used by connectors and subscriber sessions.
#[derive(Debug, Clone)]
pub struct AggregatorHandle {
    tx: mpsc::Sender<AggregatorMessage>,
    version: Arc<AtomicU64>,
}

impl AggregatorHandle {
    /// Current consolidation version, readable without entering the queue.
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Fire-and-forget notification that a venue's book changed.
    ///
    /// Never blocks a connector's read loop. Dropped notifications on a full
    /// queue are harmless: consolidation converges on the current book state.
    pub fn notify_book_changed(&self, venue: Venue) {
        let _ = self.tx.try_send(AggregatorMessage::BookChanged { venue });
    }

    /// Latest snapshot, read through the serialized executor.
    pub async fn snapshot(&self) -> Result<Arc<BookSnapshot>, FeedError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(AggregatorMessage::Snapshot { reply })
            .await
            .map_err(|_| FeedError::AggregatorUnavailable)?;
        rx.await.map_err(|_| FeedError::AggregatorUnavailable)
    }
}

/// The aggregation task. Owns the consolidated book, the latest snapshot and
/// the version counter; everything else only holds an [`AggregatorHandle`].
pub struct Aggregator {
    books: Arc<DashMap<Venue, OrderBook>>,
    rx: mpsc::Receiver<AggregatorMessage>,
    version: Arc<AtomicU64>,
    consolidated: ConsolidatedBook,
    latest: Arc<BookSnapshot>,
    symbol: String,
    depth_limit: usize,
}

impl Aggregator {
    /// Create the aggregator and its handle.
    pub fn new(symbol: String, depth_limit: usize) -> (Self, AggregatorHandle) {
        let (tx, rx) = mpsc::channel(NOTIFY_QUEUE_DEPTH);
        let version = Arc::new(AtomicU64::new(0));

        let aggregator = Self {
            books: Arc::new(DashMap::new()),
            rx,
            version: version.clone(),
            consolidated: ConsolidatedBook::new(),
            latest: Arc::new(BookSnapshot::empty(&symbol)),
            symbol,
            depth_limit,
        };
        let handle = AggregatorHandle { tx, version };

        (aggregator, handle)
    }

    /// Shared registry of per-venue books.
    ///
    /// Each entry is written only by its owning connector; this task reads
    /// all entries during rebuilds.
    pub fn books(&self) -> Arc<DashMap<Venue, OrderBook>> {
        self.books.clone()
    }

    /// Drain the queue until every handle is dropped.
    pub async fn run(mut self) {
        debug!(symbol = %self.symbol, depth_limit = self.depth_limit, "Aggregator started");

        while let Some(message) = self.rx.recv().await {
            match message {
                AggregatorMessage::BookChanged { venue } => {
                    trace!(venue = %venue, "Processing book change");
                    self.consolidate();
                }
                AggregatorMessage::Snapshot { reply } => {
                    let _ = reply.send(self.latest.clone());
                }
            }
        }

        debug!("Aggregator stopped");
    }

    /// One consolidation cycle: rebuild the sums from every venue's current
    /// book, publish a fresh snapshot, then advance the version by one.
    fn consolidate(&mut self) {
        let started = Instant::now();

        self.consolidated.clear();
        for entry in self.books.iter() {
            self.consolidated.absorb(entry.value());
        }

        // Single writer: the plain read cannot race another increment.
        let next_version = self.version.load(Ordering::Relaxed) + 1;
        self.latest = Arc::new(
            self.consolidated
                .snapshot(&self.symbol, next_version, self.depth_limit),
        );
        self.version.store(next_version, Ordering::Release);

        metrics::inc_consolidation_cycles();
        metrics::record_consolidation_latency(started);
    }
}
