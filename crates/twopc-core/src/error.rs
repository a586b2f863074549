use crate::types::{Decision, TxId};

/// Why a transaction was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("can not start a transaction without participants")]
    NoParticipants,
    #[error("another transaction is in flight")]
    Busy,
}

/// Coordinator-level failures of `start_transaction`.
///
/// Per-participant problems never show up here, they end up in the outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransactionError {
    #[error(transparent)]
    Admission(#[from] AdmissionError),

    #[error("{tx} interrupted, decision was {decision}")]
    Interrupted { tx: TxId, decision: Decision },
}
