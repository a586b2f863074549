use twopc_core::resource::SimulatedResource;
use twopc_protocol::rpc::RpcServerConfig;

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub rpc_server: RpcServerConfig,
    #[serde(default)]
    pub participant: ParticipantConfig,
}

#[derive(Debug, Serialize, Deserialize)]
#[non_exhaustive]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticipantConfig {
    pub resource: SimulatedResource,
    /// How long a vote request waits for the lock held by another transaction.
    pub lock_timeout_us: u64,
    /// A prepared transaction with no decision by then is rolled back.
    pub decision_deadline_us: u64,
}

impl Default for ParticipantConfig {
    fn default() -> Self {
        Self {
            resource: SimulatedResource::default(),
            lock_timeout_us: 1_000_000,     // 1s
            decision_deadline_us: 5_000_000, // 5s
        }
    }
}

impl ParticipantConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_micros(self.lock_timeout_us)
    }

    #[must_use]
    pub const fn decision_deadline(&self) -> Duration {
        Duration::from_micros(self.decision_deadline_us)
    }
}
