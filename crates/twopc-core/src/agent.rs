//! Participant side of one transaction.
//!
//! An agent is created for a single transaction and walks a linear path:
//! wait for the voting signal, take the transaction lock, vote, wait for the
//! decision, apply it, acknowledge, release the lock. Any failure along the
//! way is folded into a NO vote or a negative ack; nothing unwinds into the
//! coordinator.

use crate::config::CoordinatorConfig;
use crate::gate::GateWait;
use crate::lock::{TransactionLock, TransactionLockGuard};
use crate::resource::Resource;
use crate::transaction::Transaction;
use crate::types::{Action, AgentState, Decision, Identity, Vote};

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, debug_span, warn, Instrument};

/// What an agent did, handed back to the coordinator when it finishes.
#[derive(Debug, Clone)]
pub struct AgentReport {
    pub identity: Identity,
    pub vote: Vote,
    pub decision: Option<Decision>,
    pub action: Option<Action>,
    pub ack: Option<bool>,
    pub state: AgentState,
}

/// Absolute deadlines of one agent, fixed when the transaction starts.
///
/// The decision wait only ends after the coordinator has had its full voting
/// window, so an early voter never gives up on a decision still to come.
#[derive(Debug, Clone, Copy)]
pub struct AgentDeadlines {
    pub vote_by: Instant,
    pub decision_by: Instant,
}

impl AgentDeadlines {
    #[must_use]
    pub fn new(started: Instant, config: &CoordinatorConfig) -> Self {
        let vote_by = started + config.voting_deadline();
        Self { vote_by, decision_by: vote_by + config.decision_deadline() }
    }
}

/// How the agent came by the decision it applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Resolution {
    Delivered(Decision),
    /// Nothing was delivered; the agent aborts on its own.
    Local,
}

pub struct ParticipantAgent<R> {
    identity: Identity,
    resource: R,
    lock: TransactionLock,
    transaction: Arc<Transaction>,
    decision_rx: oneshot::Receiver<Decision>,
    deadlines: AgentDeadlines,
    cancel: CancellationToken,

    state: AgentState,
    vote: Vote,
}

impl<R: Resource> ParticipantAgent<R> {
    #[must_use]
    pub fn new(
        identity: Identity,
        resource: R,
        lock: TransactionLock,
        transaction: Arc<Transaction>,
        decision_rx: oneshot::Receiver<Decision>,
        deadlines: AgentDeadlines,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            identity,
            resource,
            lock,
            transaction,
            decision_rx,
            deadlines,
            cancel,
            state: AgentState::AwaitingVoteSignal,
            vote: Vote::Pending,
        }
    }

    pub async fn run(self) -> AgentReport {
        let span = debug_span!("agent", participant = %self.identity, tx = %self.transaction.id());
        self.drive().instrument(span).await
    }

    async fn drive(mut self) -> AgentReport {
        let mut report = AgentReport {
            identity: self.identity.clone(),
            vote: Vote::Pending,
            decision: None,
            action: None,
            ack: None,
            state: self.state,
        };

        let vote_by = self.deadlines.vote_by;
        match self.transaction.voting_gate().wait_open(vote_by, &self.cancel).await {
            GateWait::Ready => {}
            other => {
                warn!(?other, "no voting signal, leaving without a vote");
                self.transition(AgentState::Done);
                report.state = self.state;
                return report;
            }
        }

        let guard = self.hold_lock(vote_by).await;
        self.cast_vote(guard.is_some()).await;
        report.vote = self.vote;

        let resolution = self.await_decision().await;
        report.decision = Some(match resolution {
            Resolution::Delivered(decision) => decision,
            Resolution::Local => Decision::Abort,
        });

        let (action, ack) = self.apply(resolution).await;
        report.action = Some(action);
        report.ack = Some(ack);

        self.transaction.record_ack(&self.identity, ack);
        self.transition(AgentState::Acknowledged);

        if let Some(guard) = guard {
            guard.release();
        }
        self.transition(AgentState::Done);

        report.state = self.state;
        report
    }

    async fn hold_lock(&mut self, deadline: Instant) -> Option<TransactionLockGuard> {
        match tokio::time::timeout_at(deadline, self.lock.acquire()).await {
            Ok(Ok(guard)) => {
                self.transition(AgentState::HoldingLock);
                Some(guard)
            }
            Ok(Err(err)) => {
                warn!(?err, "failed to acquire transaction lock");
                None
            }
            Err(_) => {
                warn!("timed out acquiring transaction lock");
                None
            }
        }
    }

    async fn cast_vote(&mut self, holding_lock: bool) {
        let vote = if holding_lock {
            match self.resource.prepare().await {
                Ok(()) => Vote::Yes,
                Err(err) => {
                    warn!(?err, "prepare failed");
                    Vote::No
                }
            }
        } else {
            Vote::No
        };

        self.vote = vote;
        debug!(?vote, "vote");
        self.transaction.record_vote(&self.identity, vote.is_yes());
        self.transition(AgentState::Voted);
    }

    /// Anything short of a delivered decision resolves to a local abort.
    async fn await_decision(&mut self) -> Resolution {
        self.transition(AgentState::AwaitingDecision);

        match self.transaction.completion_gate().wait_open(self.deadlines.decision_by, &self.cancel).await {
            GateWait::Ready => match self.decision_rx.try_recv() {
                Ok(decision) => Resolution::Delivered(decision),
                Err(err) => {
                    warn!(?err, "completion gate open without a decision, aborting");
                    Resolution::Local
                }
            },
            other => {
                warn!(?other, "decision not delivered, aborting");
                Resolution::Local
            }
        }
    }

    /// A local abort acks false even after a clean rollback: the
    /// coordinator must not count it as following its decision.
    async fn apply(&mut self, resolution: Resolution) -> (Action, bool) {
        let decision = match resolution {
            Resolution::Delivered(decision) => decision,
            Resolution::Local => {
                self.transition(AgentState::RollingBack);
                if let Err(err) = self.resource.rollback().await {
                    warn!(?err, "rollback failed");
                }
                return (Action::Rollback, false);
            }
        };

        match decision {
            Decision::Commit => {
                self.transition(AgentState::Committing);
                match self.resource.commit().await {
                    Ok(()) => (Action::Commit, true),
                    Err(err) => {
                        // the global decision stands, only this participant reports failure
                        warn!(?err, "commit failed, rolling back locally");
                        self.transition(AgentState::RollingBack);
                        if let Err(err) = self.resource.rollback().await {
                            warn!(?err, "rollback after failed commit failed");
                        }
                        (Action::Rollback, false)
                    }
                }
            }
            Decision::Abort => {
                self.transition(AgentState::RollingBack);
                match self.resource.rollback().await {
                    Ok(()) => (Action::Rollback, true),
                    Err(err) => {
                        warn!(?err, "rollback failed");
                        (Action::Rollback, false)
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: AgentState) {
        debug_assert!(next >= self.state, "agent state moved backwards: {:?} -> {next:?}", self.state);
        debug!(from = ?self.state, to = ?next, "transition");
        self.state = next;
    }
}
