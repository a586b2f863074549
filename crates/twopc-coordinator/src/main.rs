#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::as_conversions,
    clippy::float_arithmetic,
    clippy::must_use_candidate
)]
#![warn(clippy::todo, clippy::dbg_macro)]

use twopc_coordinator::config::{Config, Mode};
use twopc_utils::config::read_config_file;
use twopc_utils::tracing::setup_tracing;

use anyhow::Result;
use camino::Utf8PathBuf;
use clap::Parser;
use tracing::debug;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Debug, clap::Parser)]
struct Opt {
    #[clap(long)]
    config: Option<Utf8PathBuf>,

    /// Run in-process with this many participants.
    #[clap(long)]
    participants: Option<usize>,
}

fn main() -> Result<()> {
    let opt = Opt::parse();

    setup_tracing();

    let mut config: Config = match opt.config {
        Some(ref path) => read_config_file(path)?,
        None => Config::default(),
    };

    if let Some(n) = opt.participants {
        config.mode = match config.mode {
            Mode::Local { faults, .. } => Mode::Local { participants: n, faults },
            Mode::Remote { .. } => Mode::Local { participants: n, faults: Vec::new() },
        };
    }

    debug!(?config);

    run(config)
}

#[tokio::main]
async fn run(config: Config) -> Result<()> {
    let outcome = twopc_coordinator::run(config).await?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
