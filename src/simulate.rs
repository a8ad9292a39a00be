//! Synthetic order flow for exercising the engine end to end.
//!
//! ## Components
//!
//! - `SimConfig` holds the generator parameters:
//!   - `orders`: how many orders to generate.
//!   - `seed`: RNG seed; the same seed always yields the same stream.
//!   - `start_mid`: initial mid price in ticks.
//!   - `noise_sigma`: standard deviation of the Gaussian drift applied to the mid on each order.
//!   - `mean_qty`: average order size; each order samples `Exp1 * mean_qty` (at least 1).
//!   - `max_offset`: limit prices are placed uniformly within `mid ± max_offset`.
//!   - `market_ratio`: probability that an order is a market order.
//! - `OrderStream`: an iterator of [`IncomingOrder`]s with ids `1..=orders`.
//! - `run_simulation`: feeds a stream through an [`Engine`], checking for a flush after
//!   every order and flushing once more at the end.

use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Exp1, Normal, NormalError};
use thiserror::Error;

use crate::{
    engine::Engine,
    errors::EngineError,
    orders::{IncomingOrder, Side},
};

#[derive(Debug, Clone)]
pub struct SimConfig {
    pub orders: u64,
    pub seed: u64,
    pub start_mid: u64,
    pub noise_sigma: f64,
    pub mean_qty: f64,
    pub max_offset: u64,
    pub market_ratio: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            orders: 100_000,
            seed: 42,
            start_mid: 10_000,
            noise_sigma: 2.0,
            mean_qty: 10.0,
            max_offset: 20,
            market_ratio: 0.1,
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SimConfigError {
    #[error("noise sigma must be a finite non-negative number, got {0}")]
    Sigma(f64),
    #[error("market ratio must lie in [0, 1], got {0}")]
    MarketRatio(f64),
    #[error(transparent)]
    Normal(#[from] NormalError),
}

pub struct OrderStream {
    cfg: SimConfig,
    rng: StdRng,
    drift: Normal<f64>,
    mid: f64,
    next_id: u64,
}

impl OrderStream {
    pub fn new(cfg: SimConfig) -> Result<Self, SimConfigError> {
        // Normal::new accepts a negative sigma and mirrors the distribution
        if !(cfg.noise_sigma.is_finite() && cfg.noise_sigma >= 0.0) {
            return Err(SimConfigError::Sigma(cfg.noise_sigma));
        }
        if !(0.0..=1.0).contains(&cfg.market_ratio) {
            return Err(SimConfigError::MarketRatio(cfg.market_ratio));
        }
        let drift = Normal::new(0.0, cfg.noise_sigma)?;
        Ok(Self {
            rng: StdRng::seed_from_u64(cfg.seed),
            drift,
            mid: cfg.start_mid as f64,
            next_id: 1,
            cfg,
        })
    }
}

impl Iterator for OrderStream {
    type Item = IncomingOrder;

    fn next(&mut self) -> Option<IncomingOrder> {
        if self.next_id > self.cfg.orders {
            return None;
        }
        let id = self.next_id;
        self.next_id += 1;

        // drift the mid, keeping it clear of zero
        self.mid = (self.mid + self.drift.sample(&mut self.rng)).max((self.cfg.max_offset + 1) as f64);

        let raw: f64 = Exp1.sample(&mut self.rng);
        let quantity = ((raw * self.cfg.mean_qty) as u64).max(1);
        let side = if self.rng.random_bool(0.5) {
            Side::Bid
        } else {
            Side::Ask
        };

        if self.rng.random_bool(self.cfg.market_ratio) {
            return Some(IncomingOrder::market(id, side, quantity));
        }
        let offset = self.rng.random_range(0..=self.cfg.max_offset);
        let mid = self.mid as u64;
        // bids mostly below the mid, asks mostly above, with some overlap to cross
        let price = match side {
            Side::Bid => mid + self.cfg.max_offset / 4 - offset,
            Side::Ask => mid - self.cfg.max_offset / 4 + offset,
        };
        Some(IncomingOrder::limit(id, side, price, quantity))
    }
}

/// Totals from one simulation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimReport {
    pub orders: u64,
    pub rejected: u64,
    pub trades: u64,
    pub volume: u64,
    pub flushes: u64,
}

/// Drive a generated stream through `engine`.
///
/// Rejected orders are counted and skipped; store and artifact failures stop the run.
pub fn run_simulation(engine: &mut Engine, cfg: SimConfig) -> anyhow::Result<SimReport> {
    let stream = OrderStream::new(cfg)?;
    let mut report = SimReport::default();
    for order in stream {
        report.orders += 1;
        match engine.process_order(&order) {
            Ok(out) => {
                report.trades += out.trades.len() as u64;
                report.volume += out.filled();
            }
            Err(e) if e.is_rejection() => report.rejected += 1,
            Err(e) => return Err(e.into()),
        }
        if engine.check_flush()?.is_some() {
            report.flushes += 1;
        }
    }
    engine.flush()?;
    report.flushes += 1;
    tracing::info!(?report, "simulation finished");
    Ok(report)
}

/// Feed a fixed list of orders through `engine`, stopping at the first error of any kind.
pub fn replay(engine: &mut Engine, orders: &[IncomingOrder]) -> Result<(), EngineError> {
    for order in orders {
        engine.process_order(order)?;
        engine.check_flush()?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orders::OrderKind;

    #[test]
    fn same_seed_same_stream() {
        let cfg = SimConfig {
            orders: 200,
            ..SimConfig::default()
        };
        let a: Vec<_> = OrderStream::new(cfg.clone()).unwrap().collect();
        let b: Vec<_> = OrderStream::new(cfg).unwrap().collect();
        assert_eq!(a.len(), 200);
        assert_eq!(a, b);
    }

    #[test]
    fn stream_orders_are_well_formed() {
        let cfg = SimConfig {
            orders: 500,
            market_ratio: 0.3,
            ..SimConfig::default()
        };
        for (i, o) in OrderStream::new(cfg).unwrap().enumerate() {
            assert_eq!(o.id, i as u64 + 1);
            assert!(o.quantity > 0);
            match o.kind {
                OrderKind::Limit => assert!(o.price.unwrap() > 0),
                OrderKind::Market => assert!(o.price.is_none()),
                OrderKind::Unsupported(_) => panic!("generator made an unsupported kind"),
            }
        }
    }

    #[test]
    fn negative_sigma_is_an_error() {
        let cfg = SimConfig {
            noise_sigma: -1.0,
            ..SimConfig::default()
        };
        assert_eq!(OrderStream::new(cfg).err(), Some(SimConfigError::Sigma(-1.0)));
    }

    #[test]
    fn non_finite_sigma_and_bad_ratio_are_errors() {
        let nan = SimConfig {
            noise_sigma: f64::NAN,
            ..SimConfig::default()
        };
        assert!(matches!(OrderStream::new(nan).err(), Some(SimConfigError::Sigma(s)) if s.is_nan()));

        let inf = SimConfig {
            noise_sigma: f64::INFINITY,
            ..SimConfig::default()
        };
        assert!(matches!(OrderStream::new(inf).err(), Some(SimConfigError::Sigma(_))));

        let ratio = SimConfig {
            market_ratio: 1.5,
            ..SimConfig::default()
        };
        assert_eq!(OrderStream::new(ratio).err(), Some(SimConfigError::MarketRatio(1.5)));

        let zero = SimConfig {
            noise_sigma: 0.0,
            orders: 3,
            ..SimConfig::default()
        };
        assert_eq!(OrderStream::new(zero).unwrap().count(), 3);
    }
}
