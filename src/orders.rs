use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Represents which side of the market the order is on.
///
/// # Intuition
/// - `Bid`: The trader wants to purchase the asset. Bids are matched from **highest to lowest price**
///   because a higher price means more willingness to buy, i.e. more aggressive.
/// - `Ask`: The trader wants to sell the asset. Asks are matched from **lowest to highest price**
///   because a lower price means more willingness to sell.
///
/// An incoming bid consumes the ask side and an incoming ask consumes the bid side.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    bincode::Encode,
    bincode::Decode,
)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// The side an order on `self` trades against.
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }

    /// Whether a resting order on `self` at `resting` is acceptable for an
    /// incoming limit order on the opposite side at `limit`.
    pub fn accepts(self, resting: u64, limit: u64) -> bool {
        match self {
            // resting asks: buyer pays at most `limit`
            Side::Ask => resting <= limit,
            // resting bids: seller receives at least `limit`
            Side::Bid => resting >= limit,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => f.write_str("bid"),
            Side::Ask => f.write_str("ask"),
        }
    }
}

/// Specifies how an order interacts with the book.
///
/// - `Limit`: Executes at a specific price or better, the remainder rests in the book
/// - `Market`: Executes immediately against whatever liquidity exists, never rests
/// - `Unsupported`: Any other kind the decoder saw. The matching core rejects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OrderKind {
    Market,
    Limit,
    Unsupported(String),
}

impl From<String> for OrderKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "market" => OrderKind::Market,
            "limit" => OrderKind::Limit,
            _ => OrderKind::Unsupported(s),
        }
    }
}

impl From<&str> for OrderKind {
    fn from(s: &str) -> Self {
        OrderKind::from(s.to_string())
    }
}

impl From<OrderKind> for String {
    fn from(kind: OrderKind) -> Self {
        kind.to_string()
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderKind::Market => f.write_str("market"),
            OrderKind::Limit => f.write_str("limit"),
            OrderKind::Unsupported(other) => f.write_str(other),
        }
    }
}

/// An order submitted by a trader, consumed once by the matching core.
///
/// - `price` is required for limit orders and ignored for market orders
/// - the core only ever borrows it; the unfilled remainder is reported back
///   through [`crate::orderbook::MatchOutcome`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingOrder {
    pub id: u64,
    pub kind: OrderKind,
    pub side: Side,
    #[serde(default)]
    pub price: Option<u64>,
    pub quantity: u64,
}

impl IncomingOrder {
    pub fn limit(id: u64, side: Side, price: u64, quantity: u64) -> Self {
        Self {
            id,
            kind: OrderKind::Limit,
            side,
            price: Some(price),
            quantity,
        }
    }

    pub fn market(id: u64, side: Side, quantity: u64) -> Self {
        Self {
            id,
            kind: OrderKind::Market,
            side,
            price: None,
            quantity,
        }
    }
}

/// An order held in the book awaiting a counterparty.
///
/// `seq` is the arrival-sequence key assigned by the order store on insert.
/// It never changes, including across partial fills, so time priority is kept.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, bincode::Encode, bincode::Decode,
)]
pub struct RestingOrder {
    pub id: u64,
    pub side: Side,
    pub price: u64,
    pub quantity: u64,
    pub seq: u64,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed order: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one JSON-encoded order, e.g.
/// `{"id":1,"kind":"limit","side":"bid","price":100,"quantity":10}`.
///
/// Only the shape is checked here. Kind, price and quantity rules are
/// enforced by the matching core.
pub fn decode_order(line: &str) -> Result<IncomingOrder, DecodeError> {
    Ok(serde_json::from_str(line.trim())?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_limit_order() {
        let o = decode_order(r#"{"id":7,"kind":"limit","side":"ask","price":101,"quantity":3}"#)
            .unwrap();
        assert_eq!(o, IncomingOrder::limit(7, Side::Ask, 101, 3));
    }

    #[test]
    fn decode_market_order_without_price() {
        let o = decode_order(r#"{"id":8,"kind":"market","side":"bid","quantity":5}"#).unwrap();
        assert_eq!(o, IncomingOrder::market(8, Side::Bid, 5));
    }

    #[test]
    fn decode_keeps_unknown_kind_for_the_core_to_reject() {
        let o = decode_order(r#"{"id":9,"kind":"stop","side":"bid","price":1,"quantity":5}"#)
            .unwrap();
        assert_eq!(o.kind, OrderKind::Unsupported("stop".into()));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_order("not json").is_err());
        assert!(decode_order(r#"{"id":1,"kind":"limit","side":"up","quantity":1}"#).is_err());
    }

    #[test]
    fn side_acceptance() {
        assert!(Side::Ask.accepts(100, 100));
        assert!(!Side::Ask.accepts(101, 100));
        assert!(Side::Bid.accepts(100, 100));
        assert!(!Side::Bid.accepts(99, 100));
        assert_eq!(Side::Bid.opposite(), Side::Ask);
    }
}
