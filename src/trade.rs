use std::{fmt, str::FromStr};

use thiserror::Error;

/// A trade represents a matched transaction between two orders.
///
/// # Terminology
/// - **Maker**: The order that was already resting in the order book (providing liquidity).
///   - Can be either a bid or an ask.
/// - **Taker**: The incoming order that triggered the trade (taking liquidity).
///   - Can also be a bid or an ask.
///
/// # Behavior
/// - The trade always executes at the **maker's price** (book price).
/// - Partial fills may occur: multiple trades can be generated from one order.
///
/// Example:
/// - A limit bid at 105 (taker) matches a resting ask at 102 (maker).
/// - A trade is created at price 102; the taker gets the improvement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trade {
    /// Nanoseconds, strictly increasing within one engine.
    pub timestamp: u64,
    pub price: u64,
    pub quantity: u64,
    pub maker_id: u64,
    pub taker_id: u64,
}

/// One artifact record: `timestamp,price,quantity,maker_id,taker_id`.
impl fmt::Display for Trade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.timestamp, self.price, self.quantity, self.maker_id, self.taker_id
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseTradeError {
    #[error("expected 5 fields, found {0}")]
    FieldCount(usize),
    #[error("invalid number in field {field}: {source}")]
    Number {
        field: usize,
        source: std::num::ParseIntError,
    },
}

impl FromStr for Trade {
    type Err = ParseTradeError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim_end().split(',').collect();
        if fields.len() != 5 {
            return Err(ParseTradeError::FieldCount(fields.len()));
        }
        let mut nums = [0u64; 5];
        for (field, (raw, slot)) in fields.iter().zip(nums.iter_mut()).enumerate() {
            *slot = raw
                .parse()
                .map_err(|source| ParseTradeError::Number { field, source })?;
        }
        let [timestamp, price, quantity, maker_id, taker_id] = nums;
        Ok(Trade {
            timestamp,
            price,
            quantity,
            maker_id,
            taker_id,
        })
    }
}
