//! State shared between the coordinator and the agents of one transaction.

use crate::gate::PhaseGate;
use crate::types::{Identity, TxId};

use twopc_utils::lock::with_mutex;

use fnv::FnvHashMap;
use parking_lot::Mutex;

pub struct Transaction {
    id: TxId,
    participants: usize,
    voting: PhaseGate,
    completion: PhaseGate,
    ledger: Mutex<Ledger>,
}

#[derive(Default)]
struct Ledger {
    votes: Vec<bool>,
    acks: Vec<bool>,
    replies: FnvHashMap<Identity, bool>,
    acknowledgements: FnvHashMap<Identity, bool>,
}

/// A consistent copy of the ledger.
#[derive(Debug, Clone, Default)]
pub struct Tally {
    pub votes: Vec<bool>,
    pub acks: Vec<bool>,
    pub replies: FnvHashMap<Identity, bool>,
    pub acknowledgements: FnvHashMap<Identity, bool>,
}

impl Transaction {
    #[must_use]
    pub fn new(id: TxId, participants: usize) -> Self {
        Self {
            id,
            participants,
            voting: PhaseGate::new("voting", participants),
            completion: PhaseGate::new("completion", participants),
            ledger: Mutex::new(Ledger::default()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> TxId {
        self.id
    }

    #[must_use]
    pub const fn participants(&self) -> usize {
        self.participants
    }

    #[must_use]
    pub const fn voting_gate(&self) -> &PhaseGate {
        &self.voting
    }

    #[must_use]
    pub const fn completion_gate(&self) -> &PhaseGate {
        &self.completion
    }

    /// Appends a vote and arrives at the voting gate as one step, so the gate
    /// never completes before the vote is visible.
    ///
    /// A second vote from the same participant is dropped.
    pub fn record_vote(&self, who: &Identity, yes: bool) -> bool {
        with_mutex(&self.ledger, |ledger| {
            if ledger.replies.contains_key(who) || ledger.votes.len() >= self.participants {
                return false;
            }
            ledger.votes.push(yes);
            ledger.replies.insert(who.clone(), yes);
            self.voting.arrive();
            true
        })
    }

    /// Same discipline as [`Transaction::record_vote`], for the completion gate.
    pub fn record_ack(&self, who: &Identity, ack: bool) -> bool {
        with_mutex(&self.ledger, |ledger| {
            if ledger.acknowledgements.contains_key(who) || ledger.acks.len() >= self.participants {
                return false;
            }
            ledger.acks.push(ack);
            ledger.acknowledgements.insert(who.clone(), ack);
            self.completion.arrive();
            true
        })
    }

    #[must_use]
    pub fn tally(&self) -> Tally {
        with_mutex(&self.ledger, |ledger| Tally {
            votes: ledger.votes.clone(),
            acks: ledger.acks.clone(),
            replies: ledger.replies.clone(),
            acknowledgements: ledger.acknowledgements.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    #[test]
    fn votes_and_gate_move_together() {
        let tx = Transaction::new(TxId::from(1), 2);
        assert!(tx.record_vote(&Identity::Local(0), true));
        assert_eq!(tx.voting_gate().arrived(), 1);
        assert!(!tx.record_vote(&Identity::Local(0), false));
        assert_eq!(tx.voting_gate().arrived(), 1);

        assert!(tx.record_vote(&Identity::Local(1), false));
        assert!(tx.voting_gate().is_complete());

        let tally = tx.tally();
        assert_eq!(tally.votes, vec![true, false]);
        assert_eq!(tally.replies.get(&Identity::Local(1)), Some(&false));
        assert!(tally.acks.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acks() {
        let n = 32;
        let tx = Arc::new(Transaction::new(TxId::from(1), n));
        let handles: Vec<_> = (0..n)
            .map(|i| {
                let tx = Arc::clone(&tx);
                tokio::spawn(async move { tx.record_ack(&Identity::Local(i), i % 2 == 0) })
            })
            .collect();
        for h in handles {
            assert!(h.await.unwrap());
        }

        let tally = tx.tally();
        assert_eq!(tally.acks.len(), n);
        assert_eq!(tally.acknowledgements.len(), n);
        assert!(tx.completion_gate().is_complete());
    }
}
