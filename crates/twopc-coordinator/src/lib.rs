#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::as_conversions,
    clippy::float_arithmetic,
    clippy::must_use_candidate
)]
#![warn(clippy::todo, clippy::dbg_macro)]

pub mod config;

// -----------------------------------------------------------------------------

use self::config::{Config, Mode};

use twopc_core::cohort::{Cohort, LocalCohort};
use twopc_core::coordinator::TransactionCoordinator;
use twopc_core::transport::RemoteCohort;
use twopc_core::types::Outcome;
use twopc_protocol::transport::TcpVoteTransport;

use anyhow::{ensure, Result};
use tokio::spawn;
use tracing::{info, warn};

/// Runs one transaction as configured and returns its outcome.
///
/// Ctrl-C interrupts the transaction: the cohort is told to abort and the
/// interruption comes back as an error.
pub async fn run(config: Config) -> Result<Outcome> {
    match config.mode {
        Mode::Local { participants, faults } => {
            let mut cohort = LocalCohort::new(participants);
            for fault in faults {
                ensure!(fault.index < participants, "fault for participant {} out of {participants}", fault.index);
                cohort = cohort.with_override(fault.index, fault.resource);
            }
            drive(TransactionCoordinator::new(cohort, config.coordinator)).await
        }
        Mode::Remote { participants } => {
            let transport = TcpVoteTransport::new(config.rpc_client);
            let cohort = RemoteCohort::new(participants, transport)?;
            drive(TransactionCoordinator::new(cohort, config.coordinator)).await
        }
    }
}

async fn drive<C: Cohort>(coordinator: TransactionCoordinator<C>) -> Result<Outcome> {
    let watcher = {
        let token = coordinator.shutdown_token();
        spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, aborting the running transaction");
                token.cancel();
            }
        })
    };

    let result = coordinator.start_transaction().await;
    watcher.abort();

    let outcome = result?;
    info!(tx = %outcome.tx, status = %outcome.status, reason = %outcome.reason, "transaction finished");
    Ok(outcome)
}
