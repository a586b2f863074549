#![forbid(unsafe_code)]
#![deny(
    clippy::all,
    clippy::as_conversions,
    clippy::float_arithmetic,
    clippy::must_use_candidate
)]
#![warn(clippy::todo, clippy::dbg_macro)]
//! The remote end of a two-phase commit: votes on request, then applies the
//! coordinator's decision.

pub mod config;

// -----------------------------------------------------------------------------

use self::config::{Config, ParticipantConfig};

use twopc_core::lock::{TransactionLock, TransactionLockGuard};
use twopc_core::resource::{Resource, SimulatedResource};
use twopc_core::types::{Decision, TxId};
use twopc_protocol::cp;
use twopc_protocol::rpc::{self, RpcServerConfig};

use twopc_utils::atomic_flag::AtomicFlag;
use twopc_utils::lock::with_mutex;

use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use fnv::FnvHashMap;
use parking_lot::Mutex as SyncMutex;
use tokio::net::TcpListener;
use tokio::spawn;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use wgp::WaitGroup;

pub struct ParticipantServer {
    config: ParticipantConfig,

    lock: TransactionLock,
    ledger: SyncMutex<Ledger>,
    next_ticket: AtomicU64,

    is_waiting_shutdown: AtomicFlag,
    waitgroup: WaitGroup,
}

#[derive(Default)]
struct Ledger {
    held: FnvHashMap<TxId, Held>,
    /// Transactions decided while nothing was prepared for them, so a vote
    /// still running for one of them must not leave anything behind.
    settled: FnvHashMap<TxId, Instant>,
}

/// A transaction that voted YES and is waiting for its decision.
struct Held {
    guard: TransactionLockGuard,
    resource: SimulatedResource,
    /// Tells this hold apart from a later one under a reused id.
    ticket: u64,
}

impl ParticipantServer {
    #[must_use]
    pub fn new(config: ParticipantConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            lock: TransactionLock::new(),
            ledger: SyncMutex::new(Ledger::default()),
            next_ticket: AtomicU64::new(0),
            is_waiting_shutdown: AtomicFlag::new(false),
            waitgroup: WaitGroup::new(),
        })
    }

    pub async fn run(config: Config) -> Result<()> {
        let server = Self::new(config.participant);

        let listener = {
            let addr = config.server.listen_addr;
            TcpListener::bind(addr).await.with_context(|| format!("failed to bind to {addr}"))?
        };
        info!(addr = ?config.server.listen_addr, "participant listening");

        let task = spawn(Arc::clone(&server).serve(listener, config.rpc_server));

        tokio::signal::ctrl_c().await?;

        task.abort();
        server.shutdown().await;

        Ok(())
    }

    /// Answers requests on `listener` until [`ParticipantServer::shutdown`].
    pub async fn serve(self: Arc<Self>, listener: TcpListener, config: RpcServerConfig) -> Result<()> {
        let working = self.waitgroup.working();
        rpc::serve(self, listener, config, working).await
    }

    /// Stops taking requests, waits for the running ones, then rolls back
    /// every transaction still waiting for a decision.
    pub async fn shutdown(&self) {
        self.is_waiting_shutdown.set(true);

        let task_count = self.waitgroup.count();
        debug!(?task_count, "waiting running tasks");
        self.waitgroup.wait().await;

        let held = with_mutex(&self.ledger, |ledger| mem::take(&mut ledger.held));
        for (tx, Held { guard, mut resource, .. }) in held {
            warn!(?tx, "rolling back undecided transaction on shutdown");
            if let Err(err) = resource.rollback().await {
                warn!(?tx, ?err, "rollback failed");
            }
            guard.release();
        }
    }

    #[must_use]
    pub fn held_count(&self) -> usize {
        with_mutex(&self.ledger, |ledger| ledger.held.len())
    }

    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.lock.is_held()
    }

    async fn handle_vote(self: &Arc<Self>, args: cp::VoteArgs) -> Result<cp::VoteOutput> {
        let tx = args.tx;

        let (repeated, settled) =
            with_mutex(&self.ledger, |ledger| (ledger.held.contains_key(&tx), ledger.settled.contains_key(&tx)));
        if repeated {
            debug!(?tx, "repeated vote request");
            return Ok(cp::VoteOutput { agreed: true });
        }
        if settled {
            warn!(?tx, "voting NO: transaction already decided");
            return Ok(cp::VoteOutput { agreed: false });
        }

        let guard = match self.lock.acquire_timeout(self.config.lock_timeout()).await {
            Ok(guard) => guard,
            Err(err) => {
                warn!(?tx, ?err, "voting NO: lock unavailable");
                return Ok(cp::VoteOutput { agreed: false });
            }
        };

        let mut resource = self.config.resource.clone();
        if let Err(err) = resource.prepare().await {
            warn!(?tx, ?err, "voting NO: prepare failed");
            guard.release();
            return Ok(cp::VoteOutput { agreed: false });
        }

        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
        let held = Held { guard, resource, ticket };

        // the decision may have come and gone while preparing
        let orphan = with_mutex(&self.ledger, |ledger| {
            if ledger.settled.remove(&tx).is_some() {
                Some(held)
            } else {
                ledger.held.insert(tx, held);
                None
            }
        });
        if let Some(Held { guard, mut resource, .. }) = orphan {
            warn!(?tx, "transaction decided during prepare, rolling back");
            if let Err(err) = resource.rollback().await {
                warn!(?tx, ?err, "rollback failed");
            }
            guard.release();
            return Ok(cp::VoteOutput { agreed: false });
        }

        {
            let this = Arc::clone(self);
            let deadline = self.config.decision_deadline();
            spawn(async move {
                sleep(deadline).await;
                this.expire(tx, ticket).await;
            });
        }

        info!(?tx, "voted YES");
        Ok(cp::VoteOutput { agreed: true })
    }

    async fn handle_decide(self: &Arc<Self>, args: cp::DecideArgs) -> Result<cp::DecideOutput> {
        let cp::DecideArgs { tx, decision } = args;

        let prepared = with_mutex(&self.ledger, |ledger| {
            let held = ledger.held.remove(&tx);
            if held.is_none() {
                let keep = self.config.decision_deadline();
                ledger.settled.retain(|_, at| at.elapsed() < keep);
                ledger.settled.insert(tx, Instant::now());
            }
            held
        });

        let Some(Held { guard, mut resource, .. }) = prepared else {
            // nothing prepared: an abort is already in effect, a commit is impossible
            let ack = decision == Decision::Abort;
            warn!(?tx, %decision, ack, "decision for a transaction with no prepared state");
            return Ok(cp::DecideOutput { ack });
        };

        let ack = match decision {
            Decision::Commit => match resource.commit().await {
                Ok(()) => true,
                Err(err) => {
                    warn!(?tx, ?err, "commit failed, rolling back locally");
                    if let Err(err) = resource.rollback().await {
                        warn!(?tx, ?err, "rollback after failed commit failed");
                    }
                    false
                }
            },
            Decision::Abort => match resource.rollback().await {
                Ok(()) => true,
                Err(err) => {
                    warn!(?tx, ?err, "rollback failed");
                    false
                }
            },
        };
        guard.release();

        info!(?tx, %decision, ack, "decision applied");
        Ok(cp::DecideOutput { ack })
    }

    async fn expire(&self, tx: TxId, ticket: u64) {
        let expired = with_mutex(&self.ledger, |ledger| {
            if ledger.held.get(&tx).is_some_and(|h| h.ticket == ticket) {
                ledger.held.remove(&tx)
            } else {
                None
            }
        });
        if let Some(Held { guard, mut resource, .. }) = expired {
            warn!(?tx, "no decision before the deadline, rolling back");
            if let Err(err) = resource.rollback().await {
                warn!(?tx, ?err, "rollback failed");
            }
            guard.release();
        }
    }
}

impl rpc::Service<cp::Args> for ParticipantServer {
    type Output = cp::Output;

    async fn call(self: &Arc<Self>, args: cp::Args) -> Result<cp::Output> {
        match args {
            cp::Args::Vote(args) => self.handle_vote(args).await.map(cp::Output::Vote),
            cp::Args::Decide(args) => self.handle_decide(args).await.map(cp::Output::Decide),
        }
    }

    fn needs_stop(&self) -> bool {
        self.is_waiting_shutdown.get()
    }
}
