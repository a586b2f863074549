use std::future::Future;
use std::time::Duration;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::time::sleep;
use tracing::info;

/// The local work a participant agrees to, applies or undoes.
///
/// `prepare` runs while the transaction lock is held; an error there turns
/// into a NO vote. Errors from `commit` or `rollback` turn into a negative
/// acknowledgement.
pub trait Resource: Send + 'static {
    fn prepare(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// A resource with no real state behind it, with configurable faults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatedResource {
    pub fail_prepare: bool,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    /// Extra time spent in every step, in microseconds.
    pub latency_us: u64,
}

impl SimulatedResource {
    async fn step(&self, what: &'static str, fail: bool) -> Result<()> {
        if self.latency_us > 0 {
            sleep(Duration::from_micros(self.latency_us)).await;
        }
        if fail {
            bail!("simulated {what} failure");
        }
        info!("{what}");
        Ok(())
    }
}

impl Resource for SimulatedResource {
    async fn prepare(&mut self) -> Result<()> {
        self.step("prepare", self.fail_prepare).await
    }

    async fn commit(&mut self) -> Result<()> {
        self.step("commit", self.fail_commit).await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.step("rollback", self.fail_rollback).await
    }
}
