// ── Request coalescing ──
//
// Folds bursts of bias deltas into one registry call per entity per quiet
// period. Each entity gets its own lane task; lanes never overlap calls
// for the same entity and never wait on each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, trace, warn};

use crate::backend::Registry;
use crate::error::CoreError;
use crate::model::EntityId;

/// Totals smaller than this are treated as "no change" and skipped.
const NEGLIGIBLE_DELTA: f64 = 1e-9;

/// Result of one coalesced adjust call.
#[derive(Debug, Clone, PartialEq)]
pub enum AdjustOutcome {
    Applied {
        entity_id: EntityId,
        delta: f64,
        bias: f64,
    },
    Failed {
        entity_id: EntityId,
        delta: f64,
        error: CoreError,
    },
}

impl AdjustOutcome {
    pub fn entity_id(&self) -> &EntityId {
        match self {
            Self::Applied { entity_id, .. } | Self::Failed { entity_id, .. } => entity_id,
        }
    }
}

/// Where lanes report their outcomes.
pub type OutcomeSink = Arc<dyn Fn(AdjustOutcome) + Send + Sync>;

struct Lane {
    tx: mpsc::UnboundedSender<f64>,
    cancel: CancellationToken,
    /// Fires once the lane task has returned.
    finished: CancellationToken,
}

/// Per-entity debounce-and-sum in front of [`Registry::adjust`].
///
/// A lane with nothing queued for one quiet period retires; the next
/// delta for that entity starts a fresh lane, which waits for its
/// predecessor so calls never overlap.
pub struct RequestCoalescer {
    registry: Arc<dyn Registry>,
    quiet: Duration,
    tracker: TaskTracker,
    cancel: CancellationToken,
    lanes: HashMap<EntityId, Lane>,
    sink: OutcomeSink,
}

impl RequestCoalescer {
    /// Lanes are spawned on `tracker` and stop when `cancel` fires.
    pub fn new(
        registry: Arc<dyn Registry>,
        quiet: Duration,
        tracker: TaskTracker,
        cancel: CancellationToken,
        sink: OutcomeSink,
    ) -> Self {
        Self {
            registry,
            quiet,
            tracker,
            cancel,
            lanes: HashMap::new(),
            sink,
        }
    }

    /// Queue `delta` for `entity_id`, starting its lane if none is open.
    pub fn submit(&mut self, entity_id: &EntityId, delta: f64) {
        let delivered = self
            .lanes
            .get(entity_id)
            .map(|lane| lane.tx.send(delta).is_ok());
        if delivered == Some(true) {
            return;
        }

        let predecessor = self.lanes.remove(entity_id).map(|lane| lane.finished);
        self.lanes.retain(|_, lane| !lane.tx.is_closed());

        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(delta);
        let cancel = self.cancel.child_token();
        let finished = CancellationToken::new();
        let task = LaneTask {
            entity_id: entity_id.clone(),
            rx,
            registry: Arc::clone(&self.registry),
            quiet: self.quiet,
            cancel: cancel.clone(),
            sink: Arc::clone(&self.sink),
            predecessor,
        };
        self.tracker.spawn(task.run(finished.clone()));
        self.lanes.insert(
            entity_id.clone(),
            Lane {
                tx,
                cancel,
                finished,
            },
        );
    }

    /// Stop the lane for `entity_id`. A call already in flight finishes,
    /// but its outcome is not reported.
    pub fn cancel(&mut self, entity_id: &EntityId) {
        if let Some(lane) = self.lanes.remove(entity_id) {
            lane.cancel.cancel();
            debug!(%entity_id, "adjust lane cancelled");
        }
    }

    pub fn has_lane(&self, entity_id: &EntityId) -> bool {
        self.lanes
            .get(entity_id)
            .is_some_and(|lane| !lane.tx.is_closed())
    }

    /// Lanes that still accept deltas.
    pub fn lane_count(&self) -> usize {
        self.lanes
            .values()
            .filter(|lane| !lane.tx.is_closed())
            .count()
    }
}

impl Drop for RequestCoalescer {
    fn drop(&mut self) {
        for lane in self.lanes.values() {
            lane.cancel.cancel();
        }
    }
}

struct LaneTask {
    entity_id: EntityId,
    rx: mpsc::UnboundedReceiver<f64>,
    registry: Arc<dyn Registry>,
    quiet: Duration,
    cancel: CancellationToken,
    sink: OutcomeSink,
    predecessor: Option<CancellationToken>,
}

impl LaneTask {
    async fn run(mut self, finished: CancellationToken) {
        let _finished = finished.drop_guard();

        if let Some(previous) = self.predecessor.take() {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return,
                () = previous.cancelled() => {}
            }
        }

        while let Some(first) = self.next_delta().await {
            let Some(total) = self.accumulate(first).await else {
                return;
            };
            if total.abs() < NEGLIGIBLE_DELTA {
                debug!(entity_id = %self.entity_id, "deltas cancelled out, skipping adjust");
                continue;
            }
            if !self.call(total).await {
                return;
            }
        }
        trace!(entity_id = %self.entity_id, "adjust lane retired");
    }

    /// First delta of the next cycle. `None` when cancelled or idle.
    async fn next_delta(&mut self) -> Option<f64> {
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => None,
            delta = self.rx.recv() => delta,
            () = tokio::time::sleep(self.quiet) => {
                // Later submits go to a new lane; anything that landed
                // before the close is still ours.
                self.rx.close();
                self.rx.try_recv().ok()
            }
        }
    }

    /// Sum deltas until the quiet period passes. `None` when cancelled.
    async fn accumulate(&mut self, first: f64) -> Option<f64> {
        let mut total = first;
        let deadline = Instant::now() + self.quiet;
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return None,
                () = tokio::time::sleep_until(deadline) => return Some(total),
                delta = self.rx.recv() => match delta {
                    Some(delta) => total += delta,
                    None => return Some(total),
                },
            }
        }
    }

    /// Issue one adjust and report it. `false` once the lane is cancelled.
    async fn call(&self, total: f64) -> bool {
        let entity_id = &self.entity_id;
        debug!(%entity_id, delta = total, "issuing adjust");
        let result = self.registry.adjust(entity_id, total).await;
        if self.cancel.is_cancelled() {
            debug!(%entity_id, "adjust result discarded");
            return false;
        }

        let outcome = match result {
            Ok(bias) => AdjustOutcome::Applied {
                entity_id: entity_id.clone(),
                delta: total,
                bias,
            },
            Err(error) => {
                warn!(%entity_id, delta = total, error = %error, "adjust failed");
                AdjustOutcome::Failed {
                    entity_id: entity_id.clone(),
                    delta: total,
                    error,
                }
            }
        };
        (self.sink)(outcome);
        true
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::RegistryOp;
    use crate::model::{Entity, NewEntity};

    const QUIET: Duration = Duration::from_millis(150);

    #[derive(Default)]
    struct FakeRegistry {
        calls: Mutex<Vec<(EntityId, f64)>>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        latency: Duration,
        fail: bool,
    }

    #[async_trait]
    impl Registry for FakeRegistry {
        async fn list(&self) -> Result<Vec<Entity>, CoreError> {
            Ok(Vec::new())
        }

        async fn add(&self, _entity: &NewEntity) -> Result<Entity, CoreError> {
            Err(CoreError::Disconnected)
        }

        async fn delete(&self, _id: &EntityId) -> Result<(), CoreError> {
            Ok(())
        }

        async fn adjust(&self, id: &EntityId, delta: f64) -> Result<f64, CoreError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            self.calls.lock().unwrap().push((id.clone(), delta));
            tokio::time::sleep(self.latency).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail {
                return Err(CoreError::RegistryCallFailed {
                    op: RegistryOp::Adjust,
                    message: "boom".into(),
                    status: Some(500),
                });
            }
            Ok(delta * 10.0)
        }
    }

    fn coalescer(
        registry: Arc<FakeRegistry>,
    ) -> (RequestCoalescer, mpsc::UnboundedReceiver<AdjustOutcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink: OutcomeSink = Arc::new(move |outcome| {
            let _ = tx.send(outcome);
        });
        let coalescer = RequestCoalescer::new(
            registry,
            QUIET,
            TaskTracker::new(),
            CancellationToken::new(),
            sink,
        );
        (coalescer, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_collapses_into_one_call() {
        let registry = Arc::new(FakeRegistry::default());
        let (mut coalescer, mut outcomes) = coalescer(Arc::clone(&registry));
        let id = EntityId::from("s1");

        coalescer.submit(&id, 1.0);
        coalescer.submit(&id, 2.0);
        coalescer.submit(&id, -0.5);

        let outcome = outcomes.recv().await.unwrap();
        assert_eq!(
            outcome,
            AdjustOutcome::Applied {
                entity_id: id.clone(),
                delta: 2.5,
                bias: 25.0
            }
        );
        assert_eq!(*registry.calls.lock().unwrap(), vec![(id, 2.5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn entities_have_independent_lanes() {
        let registry = Arc::new(FakeRegistry::default());
        let (mut coalescer, mut outcomes) = coalescer(Arc::clone(&registry));

        coalescer.submit(&"a".into(), 1.0);
        coalescer.submit(&"b".into(), 3.0);
        coalescer.submit(&"a".into(), 1.0);

        let mut seen = vec![outcomes.recv().await.unwrap(), outcomes.recv().await.unwrap()];
        seen.sort_by(|x, y| x.entity_id().cmp(y.entity_id()));

        assert!(matches!(&seen[0], AdjustOutcome::Applied { delta, .. } if (*delta - 2.0).abs() < 1e-9));
        assert!(matches!(&seen[1], AdjustOutcome::Applied { delta, .. } if (*delta - 3.0).abs() < 1e-9));
        assert_eq!(coalescer.lane_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn calls_never_overlap_for_one_entity() {
        let registry = Arc::new(FakeRegistry {
            latency: Duration::from_millis(500),
            ..FakeRegistry::default()
        });
        let (mut coalescer, mut outcomes) = coalescer(Arc::clone(&registry));
        let id = EntityId::from("s1");

        coalescer.submit(&id, 1.0);
        // Lands while the first call is in flight.
        tokio::time::sleep(Duration::from_millis(300)).await;
        coalescer.submit(&id, 4.0);

        outcomes.recv().await.unwrap();
        outcomes.recv().await.unwrap();

        assert_eq!(registry.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(
            *registry.calls.lock().unwrap(),
            vec![(id.clone(), 1.0), (id, 4.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn zero_total_issues_no_call() {
        let registry = Arc::new(FakeRegistry::default());
        let (mut coalescer, mut outcomes) = coalescer(Arc::clone(&registry));
        let id = EntityId::from("s1");

        coalescer.submit(&id, 0.5);
        coalescer.submit(&id, -0.5);
        tokio::time::sleep(QUIET * 4).await;

        assert!(outcomes.try_recv().is_err());
        assert!(registry.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn failures_are_reported() {
        let registry = Arc::new(FakeRegistry {
            fail: true,
            ..FakeRegistry::default()
        });
        let (mut coalescer, mut outcomes) = coalescer(registry);

        coalescer.submit(&"s1".into(), 1.0);
        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, AdjustOutcome::Failed { delta, .. } if (delta - 1.0).abs() < 1e-9));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_lane_retires_and_reopens_on_demand() {
        let registry = Arc::new(FakeRegistry::default());
        let (mut coalescer, mut outcomes) = coalescer(Arc::clone(&registry));
        let id = EntityId::from("s1");

        coalescer.submit(&id, 1.0);
        outcomes.recv().await.unwrap();
        tokio::time::sleep(QUIET * 2).await;
        assert_eq!(coalescer.lane_count(), 0);
        assert!(!coalescer.has_lane(&id));

        coalescer.submit(&id, 2.0);
        assert!(coalescer.has_lane(&id));
        let outcome = outcomes.recv().await.unwrap();
        assert!(matches!(outcome, AdjustOutcome::Applied { delta, .. } if (delta - 2.0).abs() < 1e-9));
        assert_eq!(
            *registry.calls.lock().unwrap(),
            vec![(id.clone(), 1.0), (id, 2.0)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn replacement_lane_waits_for_its_predecessor() {
        let registry = Arc::new(FakeRegistry {
            latency: Duration::from_millis(500),
            ..FakeRegistry::default()
        });
        let (mut coalescer, _outcomes) = coalescer(Arc::clone(&registry));
        let id = EntityId::from("s1");

        coalescer.submit(&id, 1.0);
        // Quiet period over, first call in flight.
        tokio::time::sleep(Duration::from_millis(200)).await;
        // Force a second lane while the first is still busy.
        let (closed_tx, _) = mpsc::unbounded_channel();
        coalescer.lanes.get_mut(&id).unwrap().tx = closed_tx;
        coalescer.submit(&id, 3.0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(registry.max_in_flight.load(Ordering::SeqCst), 1);
        assert_eq!(registry.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_lane_reports_nothing() {
        let registry = Arc::new(FakeRegistry {
            latency: Duration::from_millis(200),
            ..FakeRegistry::default()
        });
        let (mut coalescer, mut outcomes) = coalescer(Arc::clone(&registry));
        let id = EntityId::from("s1");

        coalescer.submit(&id, 1.0);
        // Quiet period over, call in flight.
        tokio::time::sleep(Duration::from_millis(200)).await;
        coalescer.cancel(&id);
        assert!(!coalescer.has_lane(&id));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(outcomes.try_recv().is_err());
        assert_eq!(registry.calls.lock().unwrap().len(), 1);
    }
}
