use crate::resource::{Resource, SimulatedResource};
use crate::types::{Identity, TxId};

use fnv::FnvHashMap;

/// The set of participants a coordinator drives.
///
/// A fresh resource is requested for every participant of every transaction,
/// so nothing carries over between transactions.
pub trait Cohort: Send + Sync + 'static {
    type Resource: Resource;

    fn size(&self) -> usize;

    fn identity(&self, index: usize) -> Identity;

    fn resource(&self, index: usize, tx: TxId) -> Self::Resource;
}

/// In-process participants backed by [`SimulatedResource`]s.
#[derive(Debug, Clone, Default)]
pub struct LocalCohort {
    participants: usize,
    template: SimulatedResource,
    overrides: FnvHashMap<usize, SimulatedResource>,
}

impl LocalCohort {
    #[must_use]
    pub fn new(participants: usize) -> Self {
        Self { participants, template: SimulatedResource::default(), overrides: FnvHashMap::default() }
    }

    /// Gives participant `index` its own behaviour instead of the default one.
    #[must_use]
    pub fn with_override(mut self, index: usize, resource: SimulatedResource) -> Self {
        self.overrides.insert(index, resource);
        self
    }
}

impl Cohort for LocalCohort {
    type Resource = SimulatedResource;

    fn size(&self) -> usize {
        self.participants
    }

    fn identity(&self, index: usize) -> Identity {
        Identity::Local(index)
    }

    fn resource(&self, index: usize, _: TxId) -> SimulatedResource {
        self.overrides.get(&index).unwrap_or(&self.template).clone()
    }
}
