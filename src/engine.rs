//! The single owner of one book's state.
//!
//! Every mutating call takes `&mut self`, so orders are matched one at a
//! time in arrival order and a flush can never interleave with a match.

use std::{sync::Arc, time::Instant};

use tracing::{info, warn};

use crate::{
    clock::Clock,
    config::EngineConfig,
    errors::EngineError,
    flush::{FlushPolicy, FlushState, FlushSummary},
    orderbook::{MatchOutcome, OrderBook},
    orders::{IncomingOrder, Side},
    stats::Stats,
    store::{BookStore, OrderStore, Store},
    tape::TradeWriter,
};

pub struct Engine {
    book: OrderBook,
    store: Box<dyn BookStore>,
    writer: TradeWriter,
    policy: FlushPolicy,
    flush_state: FlushState,
    clock: Arc<dyn Clock>,
    stats: Stats,
}

impl Engine {
    /// Open the store under `config.data_dir` and rebuild the book from it.
    pub fn open(config: EngineConfig, clock: Arc<dyn Clock>) -> Result<Self, EngineError> {
        let store = Store::open(&config.data_dir)?;
        Self::with_store(config, store, clock)
    }

    /// Rebuild the book from an already opened `store` and take ownership of it.
    /// `config.data_dir` is only used for logging.
    pub fn with_store(
        config: EngineConfig,
        store: impl BookStore + 'static,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let bids = store.load_side(Side::Bid)?;
        let asks = store.load_side(Side::Ask)?;
        info!(
            bids = bids.len(),
            asks = asks.len(),
            dir = %config.data_dir.display(),
            "opened book"
        );
        let flush_state = FlushState::new(clock.now_nanos());
        Ok(Self {
            book: OrderBook::from_sides(bids, asks, clock.clone()),
            store: Box::new(store),
            writer: TradeWriter::new(config.trades_dir),
            policy: config.flush,
            flush_state,
            clock,
            stats: Stats::new(),
        })
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn stats(&self) -> &Stats {
        &self.stats
    }

    pub fn processed_since_flush(&self) -> u64 {
        self.flush_state.processed()
    }

    /// Match one order. Counts towards the next flush whether or not it was accepted.
    pub fn process_order(&mut self, order: &IncomingOrder) -> Result<MatchOutcome, EngineError> {
        self.flush_state.record_order();
        let book = &mut self.book;
        let result = self.stats.time("process_order", || book.process_order(order));
        if let Err(e) = &result {
            warn!(id = order.id, error = %e, "order rejected");
        }
        result
    }

    /// Flush if either the order count or the time since the last commit is
    /// over its limit.
    pub fn check_flush(&mut self) -> Result<Option<FlushSummary>, EngineError> {
        if !self.flush_state.is_due(&self.policy, self.clock.now_nanos()) {
            return Ok(None);
        }
        self.flush().map(Some)
    }

    /// Commit both sides of the book and the trade tape together.
    ///
    /// Both sides are staged into one transaction, the tape is published as an
    /// artifact, then the transaction is committed. If the commit fails the
    /// artifact is retracted; on any failure the tape, the pending book changes
    /// and the flush counters stay exactly as they were, so the next flush
    /// retries everything.
    pub fn flush(&mut self) -> Result<FlushSummary, EngineError> {
        let started = Instant::now();
        let result = self.try_flush();
        self.stats.record("flush", started.elapsed());
        match &result {
            Ok(summary) => info!(
                orders = summary.orders,
                trades = summary.trades,
                "flush      : {summary}"
            ),
            Err(e) => warn!(error = %e, "flush failed, state kept for the next attempt"),
        }
        result
    }

    fn try_flush(&mut self) -> Result<FlushSummary, EngineError> {
        let now = self.clock.now_nanos();
        let elapsed = self.flush_state.elapsed(now);

        let mut txn = self.store.begin();
        self.book.bids.persist(&mut txn)?;
        self.book.asks.persist(&mut txn)?;
        let book_writes = txn.len();

        let artifact = self.writer.flush_trades(self.book.tape(), now)?;
        if let Err(e) = self.store.commit(txn) {
            if let Some(path) = &artifact {
                if let Err(io) = self.writer.retract(path) {
                    warn!(path = %path.display(), error = %io, "could not retract trade artifact");
                }
            }
            return Err(e.into());
        }

        self.book.bids.mark_persisted();
        self.book.asks.mark_persisted();
        let trades = self.book.tape_mut().replace().len();
        let summary = FlushSummary {
            orders: self.flush_state.processed(),
            trades,
            book_writes,
            elapsed,
            artifact,
        };
        self.flush_state.reset(self.clock.now_nanos());
        Ok(summary)
    }

    /// Diagnostic listing of the resting book.
    pub fn dump_book(&self) -> String {
        let started = Instant::now();
        let dump = self.book.dump_book();
        info!(
            "{:.2} ms elapsed.",
            started.elapsed().as_secs_f64() * 1000.0
        );
        dump
    }
}
