use crate::cp::{Args, DecideArgs, Output, VoteArgs};
use crate::rpc::{self, RpcClientConfig};

use twopc_core::transport::VoteTransport;
use twopc_core::types::{Decision, HostInfo, TxId};

use anyhow::{bail, Result};
use tracing::debug;

/// [`VoteTransport`] over the rpc layer, one connection per exchange.
#[derive(Debug, Clone, Default)]
pub struct TcpVoteTransport {
    config: RpcClientConfig,
}

impl TcpVoteTransport {
    #[must_use]
    pub fn new(config: RpcClientConfig) -> Self {
        Self { config }
    }

    async fn exchange(&self, endpoint: &HostInfo, args: Args) -> Result<Output> {
        debug!(%endpoint, ?args, "rpc call");
        rpc::call((endpoint.host(), endpoint.port()), &args, &self.config).await
    }
}

impl VoteTransport for TcpVoteTransport {
    async fn request_vote(&self, endpoint: &HostInfo, tx: TxId) -> Result<bool> {
        match self.exchange(endpoint, Args::Vote(VoteArgs { tx })).await? {
            Output::Vote(output) => Ok(output.agreed),
            Output::Decide(_) => bail!("{endpoint} answered a vote request with a decide output"),
        }
    }

    async fn send_decision(&self, endpoint: &HostInfo, tx: TxId, decision: Decision) -> Result<bool> {
        match self.exchange(endpoint, Args::Decide(DecideArgs { tx, decision })).await? {
            Output::Decide(output) => Ok(output.ack),
            Output::Vote(_) => bail!("{endpoint} answered a decision with a vote output"),
        }
    }
}
