use crate::{
    clock::Clock,
    errors::EngineError,
    orders::{IncomingOrder, OrderKind, RestingOrder, Side},
    store::{OrderList, OrderStore, StoreResult},
    tape::TradeTape,
    trade::Trade,
};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// The result of feeding one order to the book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Trades this order produced, in execution order.
    pub trades: Vec<Trade>,
    /// The limit remainder now resting on the order's own side, if any.
    pub residual: Option<RestingOrder>,
}

impl MatchOutcome {
    pub fn filled(&self) -> u64 {
        self.trades.iter().map(|t| t.quantity).sum()
    }
}

/// An [`OrderBook`] stores **resting** bid and ask orders in two separate
/// [`OrderList`]s and the tape of trades executed since the last flush.
///
/// Each list iterates in price-time priority, which is all the matching loop
/// relies on.
pub struct OrderBook {
    /// Buy orders, best (highest) price first.
    pub bids: OrderList,

    /// Sell orders, best (lowest) price first.
    pub asks: OrderList,

    tape: TradeTape,
    clock: Arc<dyn Clock>,
}

/// Matches an **incoming order** against one side of the order book,
/// potentially producing a series of [`Trade`]s.
///
/// # Parameters
/// - `book_side`: the side being consumed (asks for an incoming bid, bids for an incoming ask).
/// - `incoming`: the taker. It is only read; the quantity still to fill is tracked in
///   `remaining` and handed back.
/// - `limit`: the taker's limit price, `None` for market orders (no price stop).
///
/// # Returns
/// The unfilled quantity and the trades executed, oldest first.
///
/// # Notes
/// - The fill quantity is `min(remaining, resting.quantity)` so neither order is overfilled.
/// - Every trade executes at the resting order's price.
/// - A maker that is partially filled keeps its place in the queue.
/// - Fully consumed makers are only marked during the walk and removed in one batch at the end.
///
/// # Errors
/// A store failure mid-walk still applies the deletes already marked, then returns
/// [`EngineError::MatchInterrupted`] carrying the trades executed so far. Those trades are
/// on the tape and their makers are updated, so book and tape stay in agreement.
fn match_against<S: OrderStore + ?Sized>(
    book_side: &mut S,
    incoming: &IncomingOrder,
    limit: Option<u64>,
    remaining: u64,
    clock: &dyn Clock,
    tape: &mut TradeTape,
) -> Result<(u64, Vec<Trade>), EngineError> {
    let mut remaining = remaining;
    let mut trades = Vec::new();
    let walk = walk_side(book_side, incoming, limit, &mut remaining, clock, tape, &mut trades);
    let removed = book_side.apply_deletes();
    trace!(removed, "applied deferred deletes");
    match walk {
        Ok(()) => Ok((remaining, trades)),
        Err(source) => {
            warn!(id = incoming.id, executed = trades.len(), %source, "matching interrupted by store failure");
            Err(EngineError::MatchInterrupted { trades, source })
        }
    }
}

fn walk_side<S: OrderStore + ?Sized>(
    book_side: &mut S,
    incoming: &IncomingOrder,
    limit: Option<u64>,
    remaining: &mut u64,
    clock: &dyn Clock,
    tape: &mut TradeTape,
    trades: &mut Vec<Trade>,
) -> StoreResult<()> {
    let side = book_side.side();
    let mut cursor = book_side.iterate();
    while *remaining > 0 {
        let Some(key) = cursor.next(book_side) else {
            break;
        };
        let resting = book_side.get(key)?;
        if let Some(limit) = limit {
            if !side.accepts(resting.price, limit) {
                break;
            }
        }

        let traded = (*remaining).min(resting.quantity);
        if *remaining < resting.quantity {
            book_side.update_quantity(key, resting.quantity - traded)?;
        } else {
            book_side.delete(key);
        }
        *remaining -= traded;

        let trade = Trade {
            timestamp: clock.now_nanos(),
            price: resting.price,
            quantity: traded,
            maker_id: resting.id,
            taker_id: incoming.id,
        };
        trace!(?trade, left = *remaining, "trade");
        tape.push(trade.clone());
        trades.push(trade);
    }
    Ok(())
}

impl OrderBook {
    /// Creates a new, empty [`OrderBook`].
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::from_sides(OrderList::new(Side::Bid), OrderList::new(Side::Ask), clock)
    }

    /// Creates a book over sides loaded from a store.
    pub fn from_sides(bids: OrderList, asks: OrderList, clock: Arc<dyn Clock>) -> Self {
        Self {
            bids,
            asks,
            tape: TradeTape::new(),
            clock,
        }
    }

    pub fn tape(&self) -> &TradeTape {
        &self.tape
    }

    pub fn tape_mut(&mut self) -> &mut TradeTape {
        &mut self.tape
    }

    /// Dispatches an incoming order by kind and runs it against the book.
    ///
    /// # Behavior
    /// - `Market`: consumes the opposite side, best price first, until filled or the side
    ///   is empty. Whatever cannot be filled is dropped; market orders never rest.
    /// - `Limit`: consumes the opposite side while its price is acceptable, then rests the
    ///   remainder on its own side and returns it as the residual.
    ///
    /// # Errors
    /// Unknown kinds, limit orders without a price and zero quantities are rejected before
    /// the book is touched.
    pub fn process_order(&mut self, order: &IncomingOrder) -> Result<MatchOutcome, EngineError> {
        let limit = match &order.kind {
            OrderKind::Market => None,
            OrderKind::Limit => Some(order.price.ok_or(EngineError::MissingLimitPrice(order.id))?),
            OrderKind::Unsupported(kind) => return Err(EngineError::InvalidOrderKind(kind.clone())),
        };
        if order.quantity == 0 {
            return Err(EngineError::ZeroQuantity(order.id));
        }
        debug!(id = order.id, kind = %order.kind, side = %order.side, price = ?order.price, qty = order.quantity, "matching incoming order");

        let (book_side, same_side) = match order.side {
            Side::Bid => (&mut self.asks, &mut self.bids),
            Side::Ask => (&mut self.bids, &mut self.asks),
        };
        let (remaining, trades) = match_against(
            book_side,
            order,
            limit,
            order.quantity,
            self.clock.as_ref(),
            &mut self.tape,
        )?;

        let residual = match limit {
            Some(price) if remaining > 0 => {
                let rested = same_side.insert(order.id, price, remaining)?;
                debug!(id = rested.id, qty = rested.quantity, seq = rested.seq, "resting limit remainder");
                Some(rested)
            }
            Some(_) => None,
            None => {
                if remaining > 0 {
                    debug!(id = order.id, unfilled = remaining, "market order ran out of liquidity");
                }
                None
            }
        };
        Ok(MatchOutcome { trades, residual })
    }

    /// Diagnostic listing of both sides, best prices first.
    pub fn dump_book(&self) -> String {
        let mut out = self.bids.debug_dump();
        out.push_str(&self.asks.debug_dump());
        out
    }
}
