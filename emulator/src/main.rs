//! Host emulator for the cord-withdrawal trainer.
//!
//! Runs the device loop over a real UDP socket with a simulated encoder,
//! brake servo and winding motor. Drive it with any UDP console (or the
//! `testflow` binary) and move the cord from stdin:
//!
//! ```bash
//! trainer-emulator --bind 127.0.0.1:4210 --pull-rate 2.0
//! # then type `:pull 12` or `:status`
//! ```

mod config;
mod console;
mod device;
mod diagnostics;
mod error;
mod hardware;
mod net;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::mpsc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::{EmulatorConfig, LogLevel, Overrides};
use device::Emulator;
use error::EmulatorError;

#[derive(Parser, Debug)]
#[command(name = "trainer-emulator")]
#[command(version)]
#[command(about = "Cord-withdrawal trainer emulator listening for UDP console commands")]
struct Cli {
    /// TOML configuration file; every setting has a default.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Address to listen on.
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Automatic withdrawal speed in cm/s.
    #[arg(long, value_name = "CM_PER_S")]
    pull_rate: Option<f32>,

    /// Seed for profile generation and selection.
    #[arg(long)]
    seed: Option<u64>,

    /// Log level used when RUST_LOG is not set.
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            bind: self.bind,
            pull_rate: self.pull_rate,
            seed: self.seed,
            log_level: self.log_level,
        }
    }
}

fn main() -> Result<(), EmulatorError> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => EmulatorConfig::load(path)?,
        None => EmulatorConfig::default(),
    };
    config.apply(&cli.overrides());

    setup_tracing(config.logging.level);

    let mut emulator = Emulator::build(&config)?;
    info!(
        addr = %emulator.local_addr()?,
        version = env!("CARGO_PKG_VERSION"),
        "trainer emulator listening"
    );

    let (requests, inbox) = mpsc::channel();
    console::spawn(emulator.cord(), requests)?;
    emulator.serve(&inbox);
    Ok(())
}

fn setup_tracing(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
