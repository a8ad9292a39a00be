pub mod cli;
pub mod clock;
pub mod config;
pub mod engine;
pub mod errors;
pub mod flush;
pub mod orderbook;
pub mod orders;
pub mod simulate;
pub mod stats;
pub mod store;
pub mod tape;
pub mod trade;
