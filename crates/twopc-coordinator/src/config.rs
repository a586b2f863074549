use twopc_core::config::CoordinatorConfig;
use twopc_core::resource::SimulatedResource;
use twopc_core::types::HostInfo;
use twopc_protocol::rpc::RpcClientConfig;

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct Config {
    pub coordinator: CoordinatorConfig,
    pub mode: Mode,
    pub rpc_client: RpcClientConfig,
}

/// Where the participants live.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mode {
    /// In-process agents over simulated resources.
    Local {
        participants: usize,
        #[serde(default)]
        faults: Vec<LocalFault>,
    },
    /// Participant servers reached over TCP.
    Remote { participants: Vec<HostInfo> },
}

impl Default for Mode {
    fn default() -> Self {
        Self::Remote { participants: vec![HostInfo::new("localhost", 8080), HostInfo::new("localhost", 8081)] }
    }
}

/// Replaces the default resource of one local participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalFault {
    pub index: usize,
    pub resource: SimulatedResource,
}
