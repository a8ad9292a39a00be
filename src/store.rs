use bincode::{
    config::standard,
    error::{DecodeError, EncodeError},
};
use parity_db::{ColId, Db, Options};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    ops::Bound::{Excluded, Unbounded},
    path::Path,
};
use thiserror::Error;

use crate::orders::{RestingOrder, Side};

const BID_COL: ColId = 0;
const ASK_COL: ColId = 1;
const COLUMNS: u8 = 2;

/// Errors from the order store and its key/value backend
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("ParityDB error: {0}")]
    Parity(#[from] parity_db::Error),

    #[error("Bincode encode error: {0}")]
    BincodeEncode(#[from] EncodeError),

    #[error("Bincode decode error: {0}")]
    BincodeDecode(#[from] DecodeError),

    #[error("no resting order at {0}")]
    NotFound(PriorityKey),

    #[error("resting quantity must be positive (order {0})")]
    ZeroQuantity(u64),

    #[error("corrupt key of {0} bytes")]
    BadKey(usize),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Position of a resting order in matching priority.
///
/// `rank` is the price for asks and `u64::MAX - price` for bids, so on both
/// sides smaller keys match first: better price, then earlier arrival.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PriorityKey {
    pub rank: u64,
    pub seq: u64,
}

impl PriorityKey {
    pub fn new(side: Side, price: u64, seq: u64) -> Self {
        let rank = match side {
            Side::Ask => price,
            Side::Bid => u64::MAX - price,
        };
        Self { rank, seq }
    }

    pub fn of(order: &RestingOrder) -> Self {
        Self::new(order.side, order.price, order.seq)
    }

    /// Big-endian so the byte order of keys in the B-tree equals priority order.
    #[inline]
    pub fn encode(&self) -> [u8; 16] {
        let mut k = [0u8; 16];
        k[..8].copy_from_slice(&self.rank.to_be_bytes());
        k[8..].copy_from_slice(&self.seq.to_be_bytes());
        k
    }

    #[inline]
    pub fn decode(raw: &[u8]) -> StoreResult<Self> {
        let bytes: [u8; 16] = raw.try_into().map_err(|_| StoreError::BadKey(raw.len()))?;
        let mut rank = [0u8; 8];
        let mut seq = [0u8; 8];
        rank.copy_from_slice(&bytes[..8]);
        seq.copy_from_slice(&bytes[8..]);
        Ok(Self {
            rank: u64::from_be_bytes(rank),
            seq: u64::from_be_bytes(seq),
        })
    }
}

impl fmt::Display for PriorityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rank, self.seq)
    }
}

/// A batch of writes that is committed atomically by [`BookStore::commit`].
#[derive(Debug, Default)]
pub struct Transaction {
    ops: Vec<(ColId, Vec<u8>, Option<Vec<u8>>)>,
}

impl Transaction {
    pub fn put(&mut self, col: ColId, key: Vec<u8>, value: Vec<u8>) {
        self.ops.push((col, key, Some(value)));
    }

    pub fn remove(&mut self, col: ColId, key: Vec<u8>) {
        self.ops.push((col, key, None));
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Walks one side of the book in priority order.
///
/// The cursor only remembers the last key it yielded, so the store can be
/// mutated between steps (quantity updates, deferred deletes).
#[derive(Debug, Default)]
pub struct PriorityCursor {
    after: Option<PriorityKey>,
}

impl PriorityCursor {
    pub fn next<S: OrderStore + ?Sized>(&mut self, store: &S) -> Option<PriorityKey> {
        let key = store.next_key(self.after)?;
        self.after = Some(key);
        Some(key)
    }
}

/// The per-side store of resting orders the matching core works against.
pub trait OrderStore {
    fn side(&self) -> Side;

    /// The first live key strictly after `after` (or the best key if `None`).
    fn next_key(&self, after: Option<PriorityKey>) -> Option<PriorityKey>;

    /// A fresh priority-ordered walk over the side.
    fn iterate(&self) -> PriorityCursor {
        PriorityCursor::default()
    }

    fn get(&self, key: PriorityKey) -> StoreResult<RestingOrder>;

    /// Set a resting order's quantity in place. Its arrival sequence is kept.
    fn update_quantity(&mut self, key: PriorityKey, quantity: u64) -> StoreResult<()>;

    /// Mark for removal; nothing changes until [`OrderStore::apply_deletes`].
    fn delete(&mut self, key: PriorityKey);

    /// Remove everything marked by [`OrderStore::delete`], returning how many.
    fn apply_deletes(&mut self) -> usize;

    /// Add a new resting order behind everything already at its price.
    fn insert(&mut self, id: u64, price: u64, quantity: u64) -> StoreResult<RestingOrder>;

    /// Stage every change since the last successful commit into `txn`.
    fn persist(&self, txn: &mut Transaction) -> StoreResult<()>;

    /// Forget staged changes once the transaction they went into committed.
    fn mark_persisted(&mut self);

    fn debug_dump(&self) -> String;
}

/// In-memory side of the book backed by one column of the [`Store`].
#[derive(Debug)]
pub struct OrderList {
    side: Side,
    orders: BTreeMap<PriorityKey, RestingOrder>,
    pending_deletes: BTreeSet<PriorityKey>,
    dirty: BTreeSet<PriorityKey>,
    next_seq: u64,
}

impl OrderList {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            orders: BTreeMap::new(),
            pending_deletes: BTreeSet::new(),
            dirty: BTreeSet::new(),
            next_seq: 1,
        }
    }

    fn column(&self) -> ColId {
        column_for(self.side)
    }

    /// Resting orders in matching priority.
    pub fn iter(&self) -> impl Iterator<Item = &RestingOrder> {
        self.orders.values()
    }

    pub fn best(&self) -> Option<&RestingOrder> {
        self.orders.values().next()
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn total_quantity(&self) -> u64 {
        self.orders.values().map(|o| o.quantity).sum()
    }

    /// Keys changed since the last successful commit.
    pub fn unpersisted(&self) -> usize {
        self.dirty.len()
    }

    pub fn find(&self, id: u64) -> Option<&RestingOrder> {
        self.orders.values().find(|o| o.id == id)
    }
}

impl OrderStore for OrderList {
    fn side(&self) -> Side {
        self.side
    }

    fn next_key(&self, after: Option<PriorityKey>) -> Option<PriorityKey> {
        let mut range = match after {
            Some(k) => self.orders.range((Excluded(k), Unbounded)),
            None => self.orders.range::<PriorityKey, _>(..),
        };
        range
            .find(|(k, _)| !self.pending_deletes.contains(*k))
            .map(|(k, _)| *k)
    }

    fn get(&self, key: PriorityKey) -> StoreResult<RestingOrder> {
        self.orders
            .get(&key)
            .cloned()
            .ok_or(StoreError::NotFound(key))
    }

    fn update_quantity(&mut self, key: PriorityKey, quantity: u64) -> StoreResult<()> {
        let order = self.orders.get_mut(&key).ok_or(StoreError::NotFound(key))?;
        if quantity == 0 {
            return Err(StoreError::ZeroQuantity(order.id));
        }
        order.quantity = quantity;
        self.dirty.insert(key);
        Ok(())
    }

    fn delete(&mut self, key: PriorityKey) {
        self.pending_deletes.insert(key);
    }

    fn apply_deletes(&mut self) -> usize {
        let mut removed = 0;
        for key in std::mem::take(&mut self.pending_deletes) {
            if self.orders.remove(&key).is_some() {
                self.dirty.insert(key);
                removed += 1;
            }
        }
        removed
    }

    fn insert(&mut self, id: u64, price: u64, quantity: u64) -> StoreResult<RestingOrder> {
        if quantity == 0 {
            return Err(StoreError::ZeroQuantity(id));
        }
        let order = RestingOrder {
            id,
            side: self.side,
            price,
            quantity,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        let key = PriorityKey::of(&order);
        self.orders.insert(key, order.clone());
        self.dirty.insert(key);
        Ok(order)
    }

    fn persist(&self, txn: &mut Transaction) -> StoreResult<()> {
        let col = self.column();
        for key in &self.dirty {
            match self.orders.get(key) {
                Some(order) => {
                    let value = bincode::encode_to_vec(order, standard())?;
                    txn.put(col, key.encode().to_vec(), value);
                }
                None => txn.remove(col, key.encode().to_vec()),
            }
        }
        Ok(())
    }

    fn mark_persisted(&mut self) {
        self.dirty.clear();
    }

    fn debug_dump(&self) -> String {
        let mut out = format!("{} ({} orders)\n", self.side, self.orders.len());
        for o in self.orders.values() {
            out.push_str(&format!(
                "  price: {:<10} qty: {:<10} id: {:<10} seq: {}\n",
                o.price, o.quantity, o.id, o.seq
            ));
        }
        out
    }
}

fn column_for(side: Side) -> ColId {
    match side {
        Side::Bid => BID_COL,
        Side::Ask => ASK_COL,
    }
}

/// A ParityDB-backed store holding both sides of the book, one B-tree column each.
pub struct Store {
    db: Db,
}

impl Store {
    /// Open (or create) a ParityDB at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let mut opts = Options::with_columns(path.as_ref(), COLUMNS);
        // ordered iteration is what rebuilds price-time priority on load
        for col in opts.columns.iter_mut() {
            col.btree_index = true;
        }
        let db = Db::open_or_create(&opts)?;
        Ok(Store { db })
    }
}

/// Durable home of both sides of the book.
pub trait BookStore {
    /// Rebuild one side of the book from storage.
    fn load_side(&self, side: Side) -> StoreResult<OrderList>;

    /// Apply every write in `txn` or none of them.
    fn commit(&self, txn: Transaction) -> StoreResult<()>;

    fn begin(&self) -> Transaction {
        Transaction::default()
    }
}

impl BookStore for Store {
    fn commit(&self, txn: Transaction) -> StoreResult<()> {
        if txn.is_empty() {
            return Ok(());
        }
        self.db.commit(txn.ops)?;
        Ok(())
    }

    fn load_side(&self, side: Side) -> StoreResult<OrderList> {
        let mut list = OrderList::new(side);
        let mut iter = self.db.iter(column_for(side))?;
        iter.seek_to_first()?;
        while let Some((raw_key, raw)) = iter.next()? {
            let key = PriorityKey::decode(&raw_key)?;
            let (order, _): (RestingOrder, usize) = bincode::decode_from_slice(&raw, standard())?;
            list.next_seq = list.next_seq.max(order.seq + 1);
            list.orders.insert(key, order);
        }
        Ok(list)
    }
}
