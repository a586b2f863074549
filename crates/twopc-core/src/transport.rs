//! Remote participants.
//!
//! In remote mode each agent stands in for a participant reached over a
//! [`VoteTransport`]: preparing means asking for its vote, committing or
//! rolling back means delivering the decision. Tallying and deadlines are the
//! same as for in-process participants.

use crate::cohort::Cohort;
use crate::resource::Resource;
use crate::types::{Decision, HostInfo, Identity, TxId};

use std::future::Future;
use std::sync::Arc;

use anyhow::{bail, ensure, Context, Result};
use fnv::FnvHashSet;

/// Request/response exchange with one remote participant.
///
/// Implementations enforce their own timeout. Any error is read by the caller
/// as a NO vote or a negative ack.
pub trait VoteTransport: Send + Sync + 'static {
    fn request_vote(&self, endpoint: &HostInfo, tx: TxId) -> impl Future<Output = Result<bool>> + Send;

    fn send_decision(
        &self,
        endpoint: &HostInfo,
        tx: TxId,
        decision: Decision,
    ) -> impl Future<Output = Result<bool>> + Send;
}

pub struct RemoteCohort<T> {
    endpoints: Vec<HostInfo>,
    transport: Arc<T>,
}

impl<T: VoteTransport> RemoteCohort<T> {
    /// Endpoints key the per-participant tallies, so they must be distinct.
    pub fn new(endpoints: Vec<HostInfo>, transport: T) -> Result<Self> {
        let mut seen = FnvHashSet::default();
        for endpoint in &endpoints {
            ensure!(seen.insert(endpoint), "duplicate participant endpoint {endpoint}");
        }
        Ok(Self { endpoints, transport: Arc::new(transport) })
    }
}

impl<T: VoteTransport> Cohort for RemoteCohort<T> {
    type Resource = RemoteResource<T>;

    fn size(&self) -> usize {
        self.endpoints.len()
    }

    fn identity(&self, index: usize) -> Identity {
        Identity::Remote(self.endpoints[index].clone())
    }

    fn resource(&self, index: usize, tx: TxId) -> RemoteResource<T> {
        RemoteResource { transport: Arc::clone(&self.transport), endpoint: self.endpoints[index].clone(), tx }
    }
}

pub struct RemoteResource<T> {
    transport: Arc<T>,
    endpoint: HostInfo,
    tx: TxId,
}

impl<T: VoteTransport> RemoteResource<T> {
    async fn deliver(&self, decision: Decision) -> Result<()> {
        let ack = self
            .transport
            .send_decision(&self.endpoint, self.tx, decision)
            .await
            .with_context(|| format!("failed to deliver {decision} to {}", self.endpoint))?;
        if !ack {
            bail!("{} failed to {decision}", self.endpoint);
        }
        Ok(())
    }
}

impl<T: VoteTransport> Resource for RemoteResource<T> {
    async fn prepare(&mut self) -> Result<()> {
        let agreed = self
            .transport
            .request_vote(&self.endpoint, self.tx)
            .await
            .with_context(|| format!("failed to request vote from {}", self.endpoint))?;
        if !agreed {
            bail!("{} voted no", self.endpoint);
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<()> {
        self.deliver(Decision::Commit).await
    }

    async fn rollback(&mut self) -> Result<()> {
        self.deliver(Decision::Abort).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::CoordinatorConfig;
    use crate::coordinator::TransactionCoordinator;
    use crate::types::{Action, Failure, OutcomeStatus};

    use anyhow::anyhow;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct FakeTransport {
        refuse: Vec<u16>,
        unreachable: Vec<u16>,
        delivered: Mutex<Vec<(u16, Decision)>>,
    }

    impl VoteTransport for FakeTransport {
        async fn request_vote(&self, endpoint: &HostInfo, _: TxId) -> Result<bool> {
            if self.unreachable.contains(&endpoint.port()) {
                return Err(anyhow!("connection refused"));
            }
            Ok(!self.refuse.contains(&endpoint.port()))
        }

        async fn send_decision(&self, endpoint: &HostInfo, _: TxId, decision: Decision) -> Result<bool> {
            if self.unreachable.contains(&endpoint.port()) {
                return Err(anyhow!("connection refused"));
            }
            self.delivered.lock().push((endpoint.port(), decision));
            Ok(true)
        }
    }

    fn endpoints() -> Vec<HostInfo> {
        vec![HostInfo::new("localhost", 8080), HostInfo::new("localhost", 8081)]
    }

    #[test]
    fn duplicate_endpoints_rejected() {
        let endpoints = vec![HostInfo::new("localhost", 8080), HostInfo::new("localhost", 8080)];
        assert!(RemoteCohort::new(endpoints, FakeTransport::default()).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn remote_commit() {
        let cohort = RemoteCohort::new(endpoints(), FakeTransport::default()).unwrap();
        let coordinator = TransactionCoordinator::new(cohort, CoordinatorConfig::default());

        let outcome = coordinator.start_transaction().await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Committed);

        let mut delivered = coordinator.cohort().transport.delivered.lock().clone();
        delivered.sort_by_key(|(port, _)| *port);
        assert_eq!(delivered, vec![(8080, Decision::Commit), (8081, Decision::Commit)]);
    }

    #[tokio::test(start_paused = true)]
    async fn remote_refusal_aborts_everyone() {
        let transport = FakeTransport { refuse: vec![8081], ..Default::default() };
        let cohort = RemoteCohort::new(endpoints(), transport).unwrap();
        let coordinator = TransactionCoordinator::new(cohort, CoordinatorConfig::default());

        let outcome = coordinator.start_transaction().await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Aborted);
        let refused = Identity::Remote(HostInfo::new("localhost", 8081));
        assert!(outcome.failures.contains(&Failure::NegativeVote(refused)));
        for p in &outcome.participants {
            assert_eq!(p.action, Some(Action::Rollback));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn transport_failure_is_a_no_vote() {
        let transport = FakeTransport { unreachable: vec![8080], ..Default::default() };
        let cohort = RemoteCohort::new(endpoints(), transport).unwrap();
        let coordinator = TransactionCoordinator::new(cohort, CoordinatorConfig::default());

        let outcome = coordinator.start_transaction().await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Aborted);
        assert_eq!(outcome.votes.iter().filter(|v| !**v).count(), 1);

        let unreachable = Identity::Remote(HostInfo::new("localhost", 8080));
        assert_eq!(outcome.participant(&unreachable).unwrap().ack, Some(false));
    }
}
