use anyhow::Context;
use clap::{Args, Parser, Subcommand, builder::PossibleValuesParser};
use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    sync::Arc,
    time::Duration,
};
use tracing::{Level, warn};

use crate::{
    clock::SystemClock,
    config::EngineConfig,
    engine::Engine,
    flush::{DEFAULT_FLUSH_COUNT, FlushPolicy},
    orders::{IncomingOrder, OrderKind, Side, decode_order},
    simulate::{SimConfig, run_simulation},
    tape::read_trades_dir,
};

/// Matching engine for a continuous double-auction limit order book
#[derive(Parser)]
#[command(name = "lob")]
#[command(version, about = "Price-time priority matching with batched durable flushes")]
struct Cli {
    #[command(flatten)]
    opts: GlobalOpts,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalOpts {
    /// Directory of the book database
    #[arg(long, global = true, default_value = "lob-data")]
    data_dir: PathBuf,

    /// Directory trade artifacts are published into
    #[arg(long, global = true, default_value = "trades")]
    trades_dir: PathBuf,

    /// Flush after more than this many orders
    #[arg(long, global = true, default_value_t = DEFAULT_FLUSH_COUNT)]
    flush_count: u64,

    /// Flush when more than this many milliseconds passed since the last one
    #[arg(long, global = true, default_value_t = 1000)]
    flush_interval_ms: u64,

    /// Log matching detail
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl GlobalOpts {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig::new(&self.data_dir, &self.trades_dir).with_flush(FlushPolicy {
            max_orders: self.flush_count,
            max_interval: Duration::from_millis(self.flush_interval_ms),
        })
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Match a stream of JSON orders, one per line
    Run {
        /// Input file (stdin when omitted)
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Submit a single order and flush
    Submit {
        /// BID or ASK
        #[arg(value_parser = PossibleValuesParser::new(["bid", "ask"]))]
        side: String,

        /// LIMIT or MARKET
        #[arg(value_parser = PossibleValuesParser::new(["limit", "market"]))]
        kind: String,

        /// Quantity (must be > 0)
        quantity: u64,

        /// Price (only used for limit orders)
        #[arg(long)]
        price: Option<u64>,

        /// Order id (random when omitted)
        #[arg(long)]
        id: Option<u64>,
    },

    /// Generate random order flow and match it
    Simulate {
        #[arg(long, default_value_t = 100_000)]
        orders: u64,
        #[arg(long, default_value_t = 42)]
        seed: u64,
        #[arg(long, default_value_t = 10_000)]
        mid: u64,
        #[arg(long, default_value_t = 2.0)]
        sigma: f64,
        #[arg(long, default_value_t = 10.0)]
        mean_qty: f64,
        #[arg(long, default_value_t = 0.1)]
        market_ratio: f64,
    },

    /// Display the resting book
    Book,

    /// Print every published trade
    Trades,
}

fn open_engine(opts: &GlobalOpts) -> anyhow::Result<Engine> {
    Engine::open(opts.engine_config(), Arc::new(SystemClock::new()))
        .with_context(|| format!("opening book at {}", opts.data_dir.display()))
}

fn handle_run(engine: &mut Engine, input: Option<PathBuf>) -> anyhow::Result<()> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("opening {}", path.display()))?,
        )),
        None => Box::new(BufReader::new(io::stdin())),
    };

    let (mut orders, mut trades, mut skipped) = (0u64, 0usize, 0u64);
    for (lineno, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let order = match decode_order(&line) {
            Ok(order) => order,
            Err(e) => {
                warn!(line = lineno + 1, error = %e, "skipping undecodable order");
                skipped += 1;
                continue;
            }
        };
        orders += 1;
        match engine.process_order(&order) {
            Ok(out) => trades += out.trades.len(),
            Err(e) if e.is_rejection() => skipped += 1,
            Err(e) => return Err(e.into()),
        }
        // a failed flush keeps everything in memory and is retried on the next check
        if let Err(e) = engine.check_flush() {
            warn!(error = %e, "flush attempt failed");
        }
    }
    engine.flush()?;
    println!("orders: {orders} trades: {trades} skipped: {skipped}");
    Ok(())
}

fn handle_submit(
    engine: &mut Engine,
    side_str: String,
    kind_str: String,
    quantity: u64,
    price: Option<u64>,
    id: Option<u64>,
) -> anyhow::Result<()> {
    let side = match side_str.as_str() {
        "bid" => Side::Bid,
        "ask" => Side::Ask,
        _ => unreachable!(),
    };
    let kind = OrderKind::from(kind_str);
    let order = IncomingOrder {
        id: id.unwrap_or_else(rand::random::<u64>),
        price: match kind {
            OrderKind::Limit => price,
            _ => None,
        },
        kind,
        side,
        quantity,
    };

    let out = engine.process_order(&order)?;
    if out.trades.is_empty() {
        println!("No trades occured.");
    } else {
        println!("Trades generated:");
        for t in &out.trades {
            println!("{t}");
        }
    }
    if let Some(rested) = out.residual {
        println!("Resting: {:?}", rested);
    }
    engine.flush()?;
    Ok(())
}

fn print_trades(opts: &GlobalOpts) -> anyhow::Result<()> {
    let trades = read_trades_dir(&opts.trades_dir)?;
    for t in &trades {
        println!("{t}");
    }
    eprintln!("{} trades", trades.len());
    Ok(())
}

pub fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let level = if cli.opts.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Commands::Run { input } => {
            let mut engine = open_engine(&cli.opts)?;
            handle_run(&mut engine, input)?;
        }
        Commands::Submit {
            side,
            kind,
            quantity,
            price,
            id,
        } => {
            let mut engine = open_engine(&cli.opts)?;
            handle_submit(&mut engine, side, kind, quantity, price, id)?;
        }
        Commands::Simulate {
            orders,
            seed,
            mid,
            sigma,
            mean_qty,
            market_ratio,
        } => {
            let mut engine = open_engine(&cli.opts)?;
            let cfg = SimConfig {
                orders,
                seed,
                start_mid: mid,
                noise_sigma: sigma,
                mean_qty,
                market_ratio,
                ..SimConfig::default()
            };
            let report = run_simulation(&mut engine, cfg)?;
            println!(
                "orders: {} rejected: {} trades: {} volume: {} flushes: {}",
                report.orders, report.rejected, report.trades, report.volume, report.flushes
            );
            print!("{}", engine.stats());
        }
        Commands::Book => {
            let engine = open_engine(&cli.opts)?;
            println!("------ Order Book ------");
            print!("{}", engine.dump_book());
            println!("--------------------------");
        }
        Commands::Trades => print_trades(&cli.opts)?,
    }
    Ok(())
}
