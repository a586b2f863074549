use std::fmt;

use serde::{Deserialize, Serialize};

/// Coordinator-side transaction state. Only moves forward within a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TxPhase {
    Init = 0,
    Voting = 1,
    Deciding = 2,
    Completing = 3,
    Ended = 4,
}

impl TxPhase {
    #[must_use]
    #[allow(clippy::as_conversions)]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[must_use]
    pub const fn from_u8(val: u8) -> Option<Self> {
        match val {
            0 => Some(Self::Init),
            1 => Some(Self::Voting),
            2 => Some(Self::Deciding),
            3 => Some(Self::Completing),
            4 => Some(Self::Ended),
            _ => None,
        }
    }
}

/// Local state of one participant agent. Linear, never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AgentState {
    AwaitingVoteSignal,
    HoldingLock,
    Voted,
    AwaitingDecision,
    Committing,
    RollingBack,
    Acknowledged,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vote {
    Pending,
    Yes,
    No,
}

impl Vote {
    #[must_use]
    pub const fn is_yes(self) -> bool {
        matches!(self, Vote::Yes)
    }
}

/// The coordinator's verdict. An undecided transaction has no `Decision` yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Decision {
    Commit,
    Abort,
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Commit => f.write_str("commit"),
            Decision::Abort => f.write_str("abort"),
        }
    }
}

/// What a participant ended up doing with its local work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Commit,
    Rollback,
}

/// Strict AND over the votes: every participant voted, in time, and voted yes.
#[must_use]
pub fn decide(all_voted_in_time: bool, votes: &[bool], participants: usize) -> Decision {
    if all_voted_in_time && votes.len() == participants && votes.iter().all(|&v| v) {
        Decision::Commit
    } else {
        Decision::Abort
    }
}
