use crate::types::HostInfo;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(u64);

impl From<u64> for TxId {
    #[inline]
    #[track_caller]
    fn from(val: u64) -> Self {
        assert!(val != 0, "Zero TxId is reserved");
        Self(val)
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx-{}", self.0)
    }
}

/// Source of transaction ids for one coordinator.
pub struct TxIdHead(AtomicU64);

impl TxIdHead {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    #[track_caller]
    pub fn gen_next(&self) -> TxId {
        let prev = self.0.fetch_add(1, Ordering::Relaxed);
        TxId(prev.checked_add(1).expect("TxId overflow"))
    }
}

impl Default for TxIdHead {
    fn default() -> Self {
        Self::new()
    }
}

/// Who a vote or acknowledgement came from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Identity {
    Local(usize),
    Remote(HostInfo),
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Local(index) => write!(f, "participant-{index}"),
            Identity::Remote(host) => write!(f, "{host}"),
        }
    }
}
