use crate::types::{Action, Decision, Identity, TxId};

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutcomeStatus {
    Committed,
    Aborted,
    Failed,
}

/// A per-participant failure that was absorbed into a vote or an ack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
pub enum Failure {
    #[error("voting timed out with {received} of {expected} votes")]
    VotingTimeout { received: usize, expected: usize },

    #[error("{0} voted no")]
    NegativeVote(Identity),

    #[error("{0} did not vote")]
    MissingVote(Identity),

    #[error("completion timed out with {received} of {expected} acks")]
    CompletionTimeout { received: usize, expected: usize },

    #[error("{0} failed to apply the decision")]
    NegativeAck(Identity),

    #[error("{0} did not acknowledge")]
    MissingAck(Identity),

    #[error("participants were still running at the wrap-up deadline")]
    WrapupTimeout,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantReport {
    pub identity: Identity,
    pub vote: Option<bool>,
    pub ack: Option<bool>,
    /// `None` when the participant never reached its completion step.
    pub action: Option<Action>,
}

/// Final report of one transaction.
#[derive(Debug, Clone, Serialize)]
pub struct Outcome {
    pub tx: TxId,
    pub status: OutcomeStatus,
    pub decision: Decision,
    pub reason: String,
    pub votes: Vec<bool>,
    pub acks: Vec<bool>,
    /// Whether the completion phase ended successfully.
    pub ended_cleanly: bool,
    pub failures: Vec<Failure>,
    pub participants: Vec<ParticipantReport>,
}

impl Outcome {
    #[must_use]
    pub fn participant(&self, identity: &Identity) -> Option<&ParticipantReport> {
        self.participants.iter().find(|p| &p.identity == identity)
    }
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Committed => f.write_str("COMMITTED"),
            OutcomeStatus::Aborted => f.write_str("ABORTED"),
            OutcomeStatus::Failed => f.write_str("FAILED"),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.tx, self.status, self.reason)
    }
}

/// Status of a transaction given its decision and how completion went.
#[must_use]
pub const fn outcome_status(decision: Decision, ended_cleanly: bool) -> OutcomeStatus {
    match (decision, ended_cleanly) {
        (Decision::Commit, true) => OutcomeStatus::Committed,
        (Decision::Commit, false) => OutcomeStatus::Failed,
        (Decision::Abort, _) => OutcomeStatus::Aborted,
    }
}

/// Human readable summary of the failures, or of the clean path.
#[must_use]
pub fn describe(decision: Decision, participants: usize, failures: &[Failure]) -> String {
    if failures.is_empty() {
        return match decision {
            Decision::Commit => format!("all {participants} participants voted yes and acknowledged the commit"),
            Decision::Abort => format!("aborted and all {participants} participants rolled back"),
        };
    }
    let details: Vec<String> = failures.iter().map(ToString::to_string).collect();
    format!("{}: {}", decision, details.join("; "))
}
