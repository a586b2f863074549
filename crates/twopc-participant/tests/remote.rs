use twopc_participant::config::ParticipantConfig;
use twopc_participant::ParticipantServer;

use twopc_core::config::CoordinatorConfig;
use twopc_core::coordinator::TransactionCoordinator;
use twopc_core::resource::SimulatedResource;
use twopc_core::transport::{RemoteCohort, VoteTransport};
use twopc_core::types::{Action, Decision, Failure, HostInfo, Identity, OutcomeStatus, TxId};
use twopc_protocol::rpc::{RpcClientConfig, RpcServerConfig};
use twopc_protocol::transport::TcpVoteTransport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;

struct Running {
    server: Arc<ParticipantServer>,
    endpoint: HostInfo,
    task: JoinHandle<anyhow::Result<()>>,
}

impl Running {
    async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
        self.server.shutdown().await;
    }
}

async fn start(config: ParticipantConfig) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = ParticipantServer::new(config);
    let task = tokio::spawn(Arc::clone(&server).serve(listener, RpcServerConfig::default()));
    Running { server, endpoint: HostInfo::new("127.0.0.1", addr.port()), task }
}

fn healthy() -> ParticipantConfig {
    ParticipantConfig::default()
}

fn failing_prepare() -> ParticipantConfig {
    ParticipantConfig { resource: SimulatedResource { fail_prepare: true, ..Default::default() }, ..Default::default() }
}

fn coordinator(endpoints: Vec<HostInfo>) -> TransactionCoordinator<RemoteCohort<TcpVoteTransport>> {
    let cohort = RemoteCohort::new(endpoints, TcpVoteTransport::new(RpcClientConfig::default())).unwrap();
    TransactionCoordinator::new(cohort, CoordinatorConfig::default())
}

/// A port nothing listens on: bind, read the port, close.
async fn dead_endpoint() -> HostInfo {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    HostInfo::new("127.0.0.1", port)
}

#[tokio::test]
async fn remote_pair_commits() {
    let a = start(healthy()).await;
    let b = start(healthy()).await;

    let coordinator = coordinator(vec![a.endpoint.clone(), b.endpoint.clone()]);
    let outcome = coordinator.start_transaction().await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Committed);
    assert_eq!(outcome.decision, Decision::Commit);
    assert!(outcome.failures.is_empty());
    for endpoint in [&a.endpoint, &b.endpoint] {
        let report = outcome.participant(&Identity::Remote(endpoint.clone())).unwrap();
        assert_eq!(report.ack, Some(true));
        assert_eq!(report.action, Some(Action::Commit));
    }

    // both participants released their locks
    assert_eq!(a.server.held_count(), 0);
    assert!(!a.server.is_locked());
    assert!(!b.server.is_locked());

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn prepare_failure_aborts_everyone() {
    let a = start(healthy()).await;
    let b = start(failing_prepare()).await;

    let coordinator = coordinator(vec![a.endpoint.clone(), b.endpoint.clone()]);
    let outcome = coordinator.start_transaction().await.unwrap();

    assert_eq!(outcome.status, OutcomeStatus::Aborted);
    assert!(outcome.failures.contains(&Failure::NegativeVote(Identity::Remote(b.endpoint.clone()))));

    // a prepared and was rolled back, b never held anything and acks the abort
    let report = outcome.participant(&Identity::Remote(a.endpoint.clone())).unwrap();
    assert_eq!(report.action, Some(Action::Rollback));
    assert_eq!(report.ack, Some(true));
    let report = outcome.participant(&Identity::Remote(b.endpoint.clone())).unwrap();
    assert_eq!(report.ack, Some(true));

    assert!(!a.server.is_locked());
    assert!(!b.server.is_locked());

    a.stop().await;
    b.stop().await;
}

#[tokio::test]
async fn unreachable_participant_aborts() {
    let a = start(healthy()).await;
    let dead = dead_endpoint().await;

    let coordinator = coordinator(vec![a.endpoint.clone(), dead.clone()]);
    let outcome = coordinator.start_transaction().await.unwrap();

    assert_eq!(outcome.decision, Decision::Abort);
    assert_eq!(outcome.status, OutcomeStatus::Aborted);
    let report = outcome.participant(&Identity::Remote(dead)).unwrap();
    assert_eq!(report.ack, Some(false));
    assert!(!a.server.is_locked());

    a.stop().await;
}

#[tokio::test]
async fn decision_without_vote() {
    let a = start(healthy()).await;
    let transport = TcpVoteTransport::default();
    let tx = TxId::from(7);

    assert!(transport.send_decision(&a.endpoint, tx, Decision::Abort).await.unwrap());
    assert!(!transport.send_decision(&a.endpoint, tx, Decision::Commit).await.unwrap());

    a.stop().await;
}

#[tokio::test]
async fn second_transaction_waits_for_the_lock() {
    let config = ParticipantConfig { lock_timeout_us: 100_000, ..Default::default() };
    let a = start(config).await;
    let transport = TcpVoteTransport::default();

    assert!(transport.request_vote(&a.endpoint, TxId::from(1)).await.unwrap());
    // repeating the request for the holder is harmless
    assert!(transport.request_vote(&a.endpoint, TxId::from(1)).await.unwrap());
    assert!(!transport.request_vote(&a.endpoint, TxId::from(2)).await.unwrap());

    assert!(transport.send_decision(&a.endpoint, TxId::from(1), Decision::Commit).await.unwrap());
    assert!(transport.request_vote(&a.endpoint, TxId::from(2)).await.unwrap());
    assert!(transport.send_decision(&a.endpoint, TxId::from(2), Decision::Abort).await.unwrap());

    a.stop().await;
}

#[tokio::test]
async fn undecided_transaction_expires() {
    let config = ParticipantConfig { decision_deadline_us: 50_000, ..Default::default() };
    let a = start(config).await;
    let transport = TcpVoteTransport::default();

    assert!(transport.request_vote(&a.endpoint, TxId::from(1)).await.unwrap());
    assert!(a.server.is_locked());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(a.server.held_count(), 0);
    assert!(!a.server.is_locked());

    // the late commit finds nothing prepared
    assert!(!transport.send_decision(&a.endpoint, TxId::from(1), Decision::Commit).await.unwrap());

    a.stop().await;
}

#[tokio::test]
async fn vote_after_decision_is_refused() {
    let a = start(healthy()).await;
    let transport = TcpVoteTransport::default();
    let tx = TxId::from(9);

    assert!(transport.send_decision(&a.endpoint, tx, Decision::Abort).await.unwrap());
    assert!(!transport.request_vote(&a.endpoint, tx).await.unwrap());
    assert!(!a.server.is_locked());
    assert_eq!(a.server.held_count(), 0);

    a.stop().await;
}

#[tokio::test]
async fn slow_prepare_does_not_outlive_the_abort() {
    let slow = ParticipantConfig {
        resource: SimulatedResource { latency_us: 1_500_000, ..Default::default() },
        ..Default::default()
    };
    let a = start(slow).await;

    // the vote request times out before prepare finishes
    let coordinator = coordinator(vec![a.endpoint.clone()]);
    let outcome = coordinator.start_transaction().await.unwrap();
    assert_eq!(outcome.decision, Decision::Abort);

    // prepare ends, finds the abort, rolls back and lets go of the lock
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(a.server.held_count(), 0);
    assert!(!a.server.is_locked());

    a.stop().await;
}
