//! Task group that collects exactly one report per spawned task.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::sync::mpsc;
use tracing::Instrument;

/// What a spawned task reported.
#[derive(Debug)]
pub struct Report<T> {
    /// The name the task was spawned with.
    pub name: String,
    /// The task's output, or the panic message if it panicked.
    pub result: Result<T, String>,
}

/// A group of named tasks reporting over one channel.
///
/// Tasks are never cancelled: a failing or panicking task does not affect its
/// siblings, and `join` waits for all of them.
pub struct OutcomeGroup<T> {
    sender: mpsc::UnboundedSender<Report<T>>,
    receiver: mpsc::UnboundedReceiver<Report<T>>,
    names: Vec<String>,
}

impl<T: Send + 'static> OutcomeGroup<T> {
    /// Creates an empty group.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver,
            names: Vec::new(),
        }
    }

    /// Spawns a task in the group.
    ///
    /// The task reports once when it finishes, including when it panics.
    pub fn spawn<Fut>(&mut self, name: impl Into<String>, task: Fut)
    where
        Fut: Future<Output = T> + Send + 'static,
    {
        let name = name.into();
        let sender = self.sender.clone();
        let span = tracing::info_span!("task", name = %name);
        self.names.push(name.clone());

        tokio::spawn(
            async move {
                let result = AssertUnwindSafe(task)
                    .catch_unwind()
                    .await
                    .map_err(panic_message);
                // The receiver only goes away if the group was dropped without joining.
                let _ = sender.send(Report { name, result });
            }
            .instrument(span),
        );
    }

    /// Returns the names of the spawned tasks, in spawn order.
    #[cfg(test)]
    fn names(&self) -> &[String] {
        &self.names
    }

    /// Returns the number of spawned tasks.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if nothing was spawned.
    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Waits until every task has reported.
    ///
    /// Reports arrive in completion order. If a task is torn down without
    /// reporting (runtime shutdown), fewer reports than tasks are returned
    /// rather than waiting forever.
    pub async fn join(self) -> Vec<Report<T>> {
        let Self {
            sender,
            mut receiver,
            names,
        } = self;
        drop(sender);

        let mut reports = Vec::with_capacity(names.len());
        while reports.len() < names.len() {
            match receiver.recv().await {
                Some(report) => reports.push(report),
                None => break,
            }
        }
        reports
    }
}

impl<T: Send + 'static> Default for OutcomeGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for OutcomeGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutcomeGroup")
            .field("tasks", &self.names)
            .finish_non_exhaustive()
    }
}

pub(super) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_empty_group_joins_immediately() {
        let group: OutcomeGroup<()> = OutcomeGroup::new();
        assert!(group.is_empty());
        assert!(group.join().await.is_empty());
    }

    #[tokio::test]
    async fn test_every_task_reports_once() {
        let mut group = OutcomeGroup::new();
        for i in 0..8u64 {
            group.spawn(format!("task-{i}"), async move {
                tokio::time::sleep(Duration::from_millis(8 - i)).await;
                i
            });
        }
        assert_eq!(group.len(), 8);
        assert_eq!(group.names()[0], "task-0");

        let reports = group.join().await;
        assert_eq!(reports.len(), 8);

        let mut values: Vec<u64> = reports.into_iter().map(|r| r.result.unwrap()).collect();
        values.sort_unstable();
        assert_eq!(values, (0..8).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_panic_is_reported_not_lost() {
        let mut group = OutcomeGroup::new();
        group.spawn("ok", async { 1 });
        group.spawn("boom", async {
            if true {
                panic!("scaling group exploded");
            }
            2
        });

        let reports = group.join().await;
        assert_eq!(reports.len(), 2);

        let boom = reports.iter().find(|r| r.name == "boom").unwrap();
        assert_eq!(boom.result.as_ref().unwrap_err(), "scaling group exploded");
        let ok = reports.iter().find(|r| r.name == "ok").unwrap();
        assert_eq!(ok.result.as_ref().unwrap(), &1);
    }

    #[tokio::test]
    async fn test_failure_does_not_cancel_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let mut group = OutcomeGroup::new();

        group.spawn("fails-fast", async { Err::<(), _>("quota exceeded") });
        for i in 0..3 {
            let finished = finished.clone();
            group.spawn(format!("slow-{i}"), async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
        }

        let reports = group.join().await;
        assert_eq!(reports.len(), 4);
        assert_eq!(finished.load(Ordering::SeqCst), 3);
    }
}
