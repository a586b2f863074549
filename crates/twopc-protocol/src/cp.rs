//! Coordinator to participant messages.

use twopc_core::types::{Decision, TxId};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Args {
    Vote(VoteArgs),
    Decide(DecideArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Output {
    Vote(VoteOutput),
    Decide(DecideOutput),
}

/// Phase one: prepare for `tx` and report whether the participant can commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteArgs {
    pub tx: TxId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteOutput {
    pub agreed: bool,
}

/// Phase two: apply the coordinator's decision for `tx`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideArgs {
    pub tx: TxId,
    pub decision: Decision,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecideOutput {
    pub ack: bool,
}
