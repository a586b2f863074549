//! Drives one transaction at a time through
//! `Init -> Voting -> Deciding -> Completing -> Ended`.
//!
//! The coordinator owns the only mutable cross-task state of a transaction
//! (the [`Transaction`] ledger and its two gates) and is the only writer of
//! the decision. The decision reaches every agent through its own one-shot
//! slot, filled before the completion gate opens; the gate open is what makes
//! the decision visible.

use crate::agent::{AgentDeadlines, AgentReport, ParticipantAgent};
use crate::cohort::{Cohort, LocalCohort};
use crate::config::CoordinatorConfig;
use crate::error::{AdmissionError, TransactionError};
use crate::gate::GateWait;
use crate::lock::TransactionLock;
use crate::transaction::{Tally, Transaction};
use crate::types::*;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::spawn;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use wgp::WaitGroup;

pub struct TransactionCoordinator<C> {
    cohort: Arc<C>,
    config: CoordinatorConfig,

    admission: Arc<Semaphore>,
    phase: AtomicU8,
    tx_head: TxIdHead,

    shutdown: CancellationToken,
}

impl TransactionCoordinator<LocalCohort> {
    /// A coordinator over `participants` in-process agents with default deadlines.
    #[must_use]
    pub fn with_participants(participants: usize) -> Self {
        Self::new(LocalCohort::new(participants), CoordinatorConfig::default())
    }
}

impl<C: Cohort> TransactionCoordinator<C> {
    #[must_use]
    pub fn new(cohort: C, config: CoordinatorConfig) -> Self {
        Self {
            cohort: Arc::new(cohort),
            config,
            admission: Arc::new(Semaphore::new(1)),
            phase: AtomicU8::new(TxPhase::Init.as_u8()),
            tx_head: TxIdHead::new(),
            shutdown: CancellationToken::new(),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    #[must_use]
    pub fn cohort(&self) -> &C {
        &self.cohort
    }

    /// Cancelling this token interrupts the running transaction, and every later one.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    #[must_use]
    pub fn phase(&self) -> TxPhase {
        TxPhase::from_u8(self.phase.load(Ordering::SeqCst)).unwrap_or(TxPhase::Init)
    }

    /// Whether a transaction holds the admission slot.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.admission.available_permits() == 0
    }

    /// Runs one transaction to its end.
    ///
    /// Fails fast when there are no participants or another transaction is in
    /// flight. Every wait inside is deadline-bound, so this always returns.
    pub async fn start_transaction(&self) -> Result<Outcome, TransactionError> {
        let participants = self.cohort.size();
        if participants == 0 {
            return Err(AdmissionError::NoParticipants.into());
        }

        let permit = Arc::clone(&self.admission).try_acquire_owned().map_err(|_| AdmissionError::Busy)?;

        let tx_id = self.tx_head.gen_next();
        self.phase.store(TxPhase::Init.as_u8(), Ordering::SeqCst);

        let span = info_span!("transaction", tx = %tx_id, participants);
        let result = self.run_transaction(tx_id, participants).instrument(span).await;

        // workers have all terminated at this point
        drop(permit);
        result
    }

    async fn run_transaction(&self, tx_id: TxId, participants: usize) -> Result<Outcome, TransactionError> {
        let started = Instant::now();
        let transaction = Arc::new(Transaction::new(tx_id, participants));
        let cancel = self.shutdown.child_token();
        let waitgroup = WaitGroup::new();

        let (decision_txs, handles) = self.spawn_agents(started, &transaction, &cancel, &waitgroup);

        self.set_phase(TxPhase::Voting);
        info!("voting phase");
        transaction.voting_gate().open();

        let voting = {
            let deadline = started + self.config.voting_deadline();
            transaction.voting_gate().await_completion(deadline, &self.shutdown).await
        };

        self.set_phase(TxPhase::Deciding);
        let votes = transaction.tally();
        let decision = decide(voting.is_ready(), &votes.votes, participants);
        info!(?voting, votes = ?votes.votes, %decision, "voting closed");

        for (index, decision_tx) in decision_txs.into_iter().enumerate() {
            if decision_tx.send(decision).is_err() {
                debug!(participant = %self.cohort.identity(index), "agent left before the decision was pushed");
            }
        }

        self.set_phase(TxPhase::Completing);
        info!(%decision, "completion phase");
        transaction.completion_gate().open();

        let completion = if voting == GateWait::Interrupted {
            GateWait::Interrupted
        } else {
            let deadline = Instant::now() + self.config.completion_deadline();
            transaction.completion_gate().await_completion(deadline, &self.shutdown).await
        };

        // acks arriving after this point do not count
        let acks = transaction.tally();

        let (reports, wrapup_timed_out) = self.wrapup(started, &waitgroup, handles).await;

        self.set_phase(TxPhase::Ended);

        let outcome = self.assemble(tx_id, decision, voting, completion, wrapup_timed_out, &votes, &acks, reports);
        info!(status = %outcome.status, reason = %outcome.reason, "transaction ended");

        if voting == GateWait::Interrupted || completion == GateWait::Interrupted {
            warn!(%decision, "coordinator interrupted");
            return Err(TransactionError::Interrupted { tx: tx_id, decision });
        }

        Ok(outcome)
    }

    fn spawn_agents(
        &self,
        started: Instant,
        transaction: &Arc<Transaction>,
        cancel: &CancellationToken,
        waitgroup: &WaitGroup,
    ) -> (Vec<oneshot::Sender<Decision>>, Vec<JoinHandle<AgentReport>>) {
        let participants = transaction.participants();
        let mut decision_txs = Vec::with_capacity(participants);
        let mut handles = Vec::with_capacity(participants);
        let deadlines = AgentDeadlines::new(started, &self.config);

        for index in 0..participants {
            let (decision_tx, decision_rx) = oneshot::channel();
            let agent = ParticipantAgent::new(
                self.cohort.identity(index),
                self.cohort.resource(index, transaction.id()),
                TransactionLock::new(),
                Arc::clone(transaction),
                decision_rx,
                deadlines,
                cancel.clone(),
            );
            let working = waitgroup.working();
            handles.push(spawn(async move {
                let report = agent.run().await;
                drop(working);
                report
            }));
            decision_txs.push(decision_tx);
        }

        debug!(participants, "agents spawned");
        (decision_txs, handles)
    }

    /// Waits for every agent until the wrap-up deadline, then aborts the rest.
    async fn wrapup(
        &self,
        started: Instant,
        waitgroup: &WaitGroup,
        handles: Vec<JoinHandle<AgentReport>>,
    ) -> (Vec<AgentReport>, bool) {
        let deadline = started + self.config.wrapup_deadline();
        let timed_out = timeout_at(deadline, waitgroup.wait()).await.is_err();
        if timed_out {
            let task_count = waitgroup.count();
            warn!(?task_count, "wrap-up deadline exceeded, aborting remaining agents");
            for handle in &handles {
                handle.abort();
            }
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(err) if err.is_cancelled() => {}
                Err(err) => warn!(?err, "agent task failed"),
            }
        }
        (reports, timed_out)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        tx: TxId,
        decision: Decision,
        voting: GateWait,
        completion: GateWait,
        wrapup_timed_out: bool,
        votes: &Tally,
        acks: &Tally,
        reports: Vec<AgentReport>,
    ) -> Outcome {
        let expected = self.cohort.size();
        let mut failures = Vec::new();

        if voting == GateWait::TimedOut {
            failures.push(Failure::VotingTimeout { received: votes.votes.len(), expected });
        }
        if completion == GateWait::TimedOut {
            failures.push(Failure::CompletionTimeout { received: acks.acks.len(), expected });
        }

        let mut participants = Vec::with_capacity(expected);
        for index in 0..expected {
            let identity = self.cohort.identity(index);
            let vote = votes.replies.get(&identity).copied();
            let ack = acks.acknowledgements.get(&identity).copied();
            let action = reports.iter().find(|r| r.identity == identity).and_then(|r| r.action);

            match vote {
                Some(true) => {}
                Some(false) => failures.push(Failure::NegativeVote(identity.clone())),
                None => failures.push(Failure::MissingVote(identity.clone())),
            }
            match ack {
                Some(true) => {}
                Some(false) => failures.push(Failure::NegativeAck(identity.clone())),
                None => failures.push(Failure::MissingAck(identity.clone())),
            }

            participants.push(ParticipantReport { identity, vote, ack, action });
        }

        if wrapup_timed_out {
            failures.push(Failure::WrapupTimeout);
        }

        let ended_cleanly =
            completion.is_ready() && acks.acks.len() == expected && acks.acks.iter().all(|&ack| ack);

        Outcome {
            tx,
            status: outcome_status(decision, ended_cleanly),
            decision,
            reason: describe(decision, expected, &failures),
            votes: votes.votes.clone(),
            acks: acks.acks.clone(),
            ended_cleanly,
            failures,
            participants,
        }
    }

    fn set_phase(&self, next: TxPhase) {
        let prev = self.phase.fetch_max(next.as_u8(), Ordering::SeqCst);
        debug!(from = ?TxPhase::from_u8(prev), to = ?next, "phase");
    }
}
