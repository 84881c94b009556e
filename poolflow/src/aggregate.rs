//! Joining node-pool outcomes into one result.
//!
//! Every failure is kept. Instance ids of successful pools are collected even
//! when siblings fail, and any pool that never reported counts as failed.

use std::collections::{HashMap, HashSet};

use crate::errors::{CompositeFailure, NodePoolError, NodePoolFailure};
use crate::model::TaskOutcome;

/// Collects the outcomes of one fan-out.
#[derive(Debug)]
pub struct OutcomeAggregator {
    expected: Vec<String>,
    reported: HashSet<String>,
    failures: CompositeFailure,
    instance_ids: Vec<String>,
}

impl OutcomeAggregator {
    /// Creates an aggregator expecting one outcome per named node pool.
    #[must_use]
    pub fn new(expected: Vec<String>) -> Self {
        Self {
            expected,
            reported: HashSet::new(),
            failures: CompositeFailure::new(),
            instance_ids: Vec::new(),
        }
    }

    /// Records one outcome.
    pub fn record(&mut self, outcome: TaskOutcome) {
        self.reported.insert(outcome.node_pool().to_string());
        match outcome {
            TaskOutcome::Ready { instance_ids, .. } => self.instance_ids.extend(instance_ids),
            TaskOutcome::Failed(failure) => self.failures.push(failure),
        }
    }

    /// Records every outcome from an iterator.
    pub fn record_all(&mut self, outcomes: impl IntoIterator<Item = TaskOutcome>) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    /// Returns true if any failure has been recorded so far.
    #[cfg(test)]
    fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Returns how many expected pools have reported.
    #[cfg(test)]
    fn reported(&self) -> usize {
        self.expected
            .iter()
            .filter(|name| self.reported.contains(*name))
            .count()
    }

    /// Instance ids collected from successful pools so far.
    #[cfg(test)]
    fn instance_ids(&self) -> &[String] {
        &self.instance_ids
    }

    /// Finishes aggregation.
    ///
    /// Returns every collected instance id if no pool failed, otherwise all
    /// failures ordered by the pools' declaration order.
    pub fn finish(self) -> Result<Vec<String>, CompositeFailure> {
        let Self {
            expected,
            reported,
            mut failures,
            instance_ids,
        } = self;

        for name in &expected {
            if !reported.contains(name) {
                failures.push(NodePoolFailure::new(name.clone(), NodePoolError::Unreported));
            }
        }

        let position: HashMap<&str, usize> = expected
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();
        failures.sort_by_key(|f| position.get(f.node_pool.as_str()).copied().unwrap_or(usize::MAX));

        failures.into_result().map(|()| instance_ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{GatewayError, GatewayOperation};
    use pretty_assertions::assert_eq;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_string()).collect()
    }

    fn ready(pool: &str, ids: &[&str]) -> TaskOutcome {
        TaskOutcome::Ready {
            node_pool: pool.to_string(),
            instance_ids: names(ids),
        }
    }

    fn failed(pool: &str, code: &str) -> TaskOutcome {
        TaskOutcome::Failed(NodePoolFailure::new(
            pool,
            NodePoolError::gateway(
                GatewayOperation::CreateScalingGroup,
                GatewayError::api(code, "injected"),
            ),
        ))
    }

    #[test]
    fn test_no_pools_is_success() {
        let aggregator = OutcomeAggregator::new(Vec::new());
        assert_eq!(aggregator.finish().unwrap(), Vec::<String>::new());
    }

    #[test]
    fn test_all_ready_concatenates_ids() {
        let mut aggregator = OutcomeAggregator::new(names(&["a", "b"]));
        aggregator.record(ready("b", &["i-3"]));
        aggregator.record(ready("a", &["i-1", "i-2"]));

        assert_eq!(aggregator.reported(), 2);
        assert_eq!(aggregator.finish().unwrap(), names(&["i-3", "i-1", "i-2"]));
    }

    #[test]
    fn test_every_failure_is_kept_in_declaration_order() {
        let mut aggregator = OutcomeAggregator::new(names(&["a", "b", "c"]));
        aggregator.record_all([failed("c", "Throttling"), ready("b", &["i-1"]), failed("a", "QuotaExceeded")]);

        assert!(aggregator.has_failures());
        assert_eq!(aggregator.instance_ids(), &names(&["i-1"])[..]);

        let composite = aggregator.finish().unwrap_err();
        assert_eq!(composite.node_pools(), vec!["a", "c"]);
        assert!(composite.to_string().contains("QuotaExceeded"));
        assert!(composite.to_string().contains("Throttling"));
    }

    #[test]
    fn test_missing_report_becomes_failure() {
        let mut aggregator = OutcomeAggregator::new(names(&["a", "b"]));
        aggregator.record(ready("a", &["i-1"]));
        assert_eq!(aggregator.reported(), 1);

        let composite = aggregator.finish().unwrap_err();
        assert_eq!(composite.node_pools(), vec!["b"]);
        assert!(matches!(
            composite.iter().next().map(|f| &f.cause),
            Some(NodePoolError::Unreported)
        ));
    }
}
