use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Deadlines of one transaction, in microseconds.
///
/// Changing them only moves the point where a timeout fires; the decision
/// logic is the same for every setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[non_exhaustive]
pub struct CoordinatorConfig {
    /// How long the coordinator waits for all votes.
    pub voting_deadline_us: u64,
    /// How long the coordinator waits for all acks once the decision is out.
    pub completion_deadline_us: u64,
    /// Bound on the whole transaction, counted from admission.
    pub wrapup_deadline_us: u64,
    /// How long an agent waits for a signal from the coordinator.
    pub decision_deadline_us: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            voting_deadline_us: 1_000_000,
            completion_deadline_us: 3_000_000,
            wrapup_deadline_us: 10_000_000,
            decision_deadline_us: 5_000_000,
        }
    }
}

impl CoordinatorConfig {
    #[must_use]
    pub const fn voting_deadline(&self) -> Duration {
        Duration::from_micros(self.voting_deadline_us)
    }

    #[must_use]
    pub const fn completion_deadline(&self) -> Duration {
        Duration::from_micros(self.completion_deadline_us)
    }

    #[must_use]
    pub const fn wrapup_deadline(&self) -> Duration {
        Duration::from_micros(self.wrapup_deadline_us)
    }

    #[must_use]
    pub const fn decision_deadline(&self) -> Duration {
        Duration::from_micros(self.decision_deadline_us)
    }

    #[must_use]
    pub const fn with_voting_deadline(mut self, d: Duration) -> Self {
        self.voting_deadline_us = duration_us(d);
        self
    }

    #[must_use]
    pub const fn with_completion_deadline(mut self, d: Duration) -> Self {
        self.completion_deadline_us = duration_us(d);
        self
    }

    #[must_use]
    pub const fn with_wrapup_deadline(mut self, d: Duration) -> Self {
        self.wrapup_deadline_us = duration_us(d);
        self
    }

    #[must_use]
    pub const fn with_decision_deadline(mut self, d: Duration) -> Self {
        self.decision_deadline_us = duration_us(d);
        self
    }
}

#[allow(clippy::as_conversions)]
const fn duration_us(d: Duration) -> u64 {
    let us = d.as_micros();
    if us > u64::MAX as u128 {
        u64::MAX
    } else {
        us as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.voting_deadline(), Duration::from_secs(1));
        assert_eq!(config.completion_deadline(), Duration::from_secs(3));
        assert_eq!(config.wrapup_deadline(), Duration::from_secs(10));
        assert_eq!(config.decision_deadline(), Duration::from_secs(5));
    }

    #[test]
    fn partial_override() {
        let config: CoordinatorConfig = serde_json::from_str(r#"{"voting_deadline_us": 250000}"#).unwrap();
        assert_eq!(config.voting_deadline(), Duration::from_millis(250));
        assert_eq!(config.completion_deadline(), Duration::from_secs(3));
    }

    #[test]
    fn builder() {
        let config = CoordinatorConfig::default().with_completion_deadline(Duration::from_millis(20));
        assert_eq!(config.completion_deadline_us, 20_000);
        assert_eq!(config.voting_deadline(), Duration::from_secs(1));
    }
}
