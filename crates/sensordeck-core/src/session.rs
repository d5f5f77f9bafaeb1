// ── Session controller ──
//
// Owns the console lifecycle: one runtime task holds every piece of
// mutable console state (cards, series, filter, live session) and reacts
// to three inputs: bus commands, results from its own sub-activities, and
// the frame clock. Sub-activities never touch that state; they report back
// through an internal channel, tagged with the session id they belong to.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use indexmap::IndexSet;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::action::{ActionBus, Command, CommandReceiver};
use crate::backend::Backends;
use crate::coalesce::{AdjustOutcome, OutcomeSink, RequestCoalescer};
use crate::config::ConsoleConfig;
use crate::error::CoreError;
use crate::filter::IntervalSet;
use crate::ingest::{EventIngestor, IngestEvent, IngestStream};
use crate::model::{AddForm, Entity, EntityId, Reading, SensorKind, SeriesPoint};
use crate::registry::EntityRegistry;
use crate::series::BoundedSeries;
use crate::stream::EntityStream;
use crate::view::{self, Notification, NotificationKind, ViewUpdate};

const NOTIFICATION_CHANNEL_SIZE: usize = 256;

// ── Observable state ─────────────────────────────────────────────────

/// Persistent status indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ConnectionStatus {
    Connecting,
    Online,
    Reconnecting,
    Offline,
}

/// Lifecycle of the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum SessionState {
    Idle,
    /// Waiting for the first reload to settle and the stream to open.
    Connecting,
    Active,
    /// Sub-activities are being torn down.
    Draining,
}

/// State readable from outside the runtime.
struct Shared {
    registry: Arc<EntityRegistry>,
    status: watch::Sender<ConnectionStatus>,
    state: watch::Sender<SessionState>,
    session_id: watch::Sender<u64>,
    filter: watch::Sender<String>,
    notifications: broadcast::Sender<Notification>,
}

// ── SessionController ────────────────────────────────────────────────

/// Handle to a running console engine.
///
/// Cheaply cloneable. Every mutating method just publishes a [`Command`]
/// on the [`ActionBus`]; the runtime applies commands in arrival order.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<ControllerInner>,
}

struct ControllerInner {
    bus: ActionBus,
    shared: Arc<Shared>,
    view_rx: Mutex<Option<mpsc::UnboundedReceiver<ViewUpdate>>>,
    cancel: CancellationToken,
    runtime: Mutex<Option<JoinHandle<()>>>,
}

impl SessionController {
    /// Spawn the runtime. Starts `Idle`; publish [`Command::Connect`] to
    /// open a session.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: &ConsoleConfig, backends: Backends) -> Self {
        let filter = initial_filter(config, &backends);

        let (status, _) = watch::channel(ConnectionStatus::Offline);
        let (state, _) = watch::channel(SessionState::Idle);
        let (session_id, _) = watch::channel(0);
        let (filter_tx, _) = watch::channel(filter.clone());
        let (notifications, _) = broadcast::channel(NOTIFICATION_CHANNEL_SIZE);
        let shared = Arc::new(Shared {
            registry: Arc::new(EntityRegistry::new()),
            status,
            state,
            session_id,
            filter: filter_tx,
            notifications,
        });

        let bus = ActionBus::new();
        let commands = bus.subscribe();
        let (view_tx, view_rx) = mpsc::unbounded_channel();
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();

        let runtime = SessionRuntime {
            shared: Arc::clone(&shared),
            ingestor: EventIngestor::new(Arc::clone(&backends.events)),
            backends,
            window: config.window,
            compact_floor: config.compact_floor,
            coalesce_quiet: config.coalesce_quiet,
            filter: IntervalSet::parse(&filter),
            filter_expr: filter,
            hidden: HashSet::new(),
            next_id: 0,
            live: None,
            draining: None,
            cards: HashMap::new(),
            dirty: IndexSet::new(),
            root: cancel.clone(),
            finalizers: TaskTracker::new(),
            internal_tx,
            view_tx,
        };
        let handle = tokio::spawn(runtime.run(commands, internal_rx, config.frame_interval));

        Self {
            inner: Arc::new(ControllerInner {
                bus,
                shared,
                view_rx: Mutex::new(Some(view_rx)),
                cancel,
                runtime: Mutex::new(Some(handle)),
            }),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn bus(&self) -> &ActionBus {
        &self.inner.bus
    }

    pub fn publish(&self, command: Command) -> bool {
        self.inner.bus.publish(command)
    }

    pub fn connect(&self) {
        self.publish(Command::Connect);
    }

    pub fn disconnect(&self) {
        self.publish(Command::Disconnect);
    }

    pub fn reload(&self) {
        self.publish(Command::Reload);
    }

    pub fn add(&self, form: AddForm) {
        self.publish(Command::Add(form));
    }

    pub fn delete(&self, entity_id: EntityId) {
        self.publish(Command::Delete(entity_id));
    }

    pub fn adjust(&self, entity_id: EntityId, delta: f64) {
        self.publish(Command::Adjust { entity_id, delta });
    }

    pub fn apply_filter(&self, expr: impl Into<String>) {
        self.publish(Command::ApplyFilter(expr.into()));
    }

    pub fn set_kind_visible(&self, kind: SensorKind, visible: bool) {
        self.publish(Command::SetKindVisible { kind, visible });
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        *self.inner.shared.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.shared.status.subscribe()
    }

    pub fn state(&self) -> SessionState {
        *self.inner.shared.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.shared.state.subscribe()
    }

    /// Id of the most recently started session (0 before the first).
    pub fn session_id(&self) -> u64 {
        *self.inner.shared.session_id.borrow()
    }

    /// The filter expression the next session will use.
    pub fn current_filter(&self) -> String {
        self.inner.shared.filter.borrow().clone()
    }

    pub fn subscribe_filter(&self) -> watch::Receiver<String> {
        self.inner.shared.filter.subscribe()
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<Notification> {
        self.inner.shared.notifications.subscribe()
    }

    /// Take the rendering stream. Only the first caller gets it.
    pub async fn take_view_updates(&self) -> Option<mpsc::UnboundedReceiver<ViewUpdate>> {
        self.inner.view_rx.lock().await.take()
    }

    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.inner.shared.registry
    }

    pub fn entities(&self) -> EntityStream<Entity> {
        self.inner.shared.registry.subscribe()
    }

    /// Stop the runtime, tearing down any live session first.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        if let Some(handle) = self.inner.runtime.lock().await.take() {
            let _ = handle.await;
        }
    }
}

fn initial_filter(config: &ConsoleConfig, backends: &Backends) -> String {
    match backends.preferences.load() {
        Ok(Some(saved)) => return saved,
        Ok(None) => {}
        Err(e) => warn!(error = %e, "could not read saved device filter"),
    }
    config.initial_filter.clone().unwrap_or_default()
}

// ── Runtime ──────────────────────────────────────────────────────────

struct Internal {
    session_id: u64,
    event: SessionEvent,
}

enum SessionEvent {
    Ingest(IngestEvent),
    IngestEnded,
    Reloaded(Result<Vec<Entity>, CoreError>),
    Added(Result<Entity, CoreError>),
    Deleted {
        entity_id: EntityId,
        result: Result<(), CoreError>,
    },
    Adjusted(AdjustOutcome),
    Finalized {
        superseded: bool,
    },
}

/// Sub-activities of one session, sharing one cancellation signal.
struct Live {
    id: u64,
    cancel: CancellationToken,
    tracker: TaskTracker,
    coalescer: RequestCoalescer,
    reload_settled: bool,
    transport_open: bool,
}

impl Live {
    fn spawn_call<F>(&self, tx: &mpsc::UnboundedSender<Internal>, call: F)
    where
        F: Future<Output = SessionEvent> + Send + 'static,
    {
        let tx = tx.clone();
        let session_id = self.id;
        let cancel = self.cancel.clone();
        self.tracker.spawn(async move {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                event = call => event,
            };
            let _ = tx.send(Internal { session_id, event });
        });
    }
}

struct Card {
    kind: SensorKind,
    device_id: String,
    series: BoundedSeries,
}

struct SessionRuntime {
    shared: Arc<Shared>,
    backends: Backends,
    ingestor: EventIngestor,
    window: Duration,
    compact_floor: usize,
    coalesce_quiet: Duration,
    filter: IntervalSet,
    filter_expr: String,
    hidden: HashSet<SensorKind>,
    next_id: u64,
    live: Option<Live>,
    /// Session being torn down by an explicit disconnect.
    draining: Option<u64>,
    cards: HashMap<EntityId, Card>,
    /// Cards with new points since the last frame, in first-touched order.
    dirty: IndexSet<EntityId>,
    root: CancellationToken,
    /// Waiters that report `Finalized` for ended sessions.
    finalizers: TaskTracker,
    internal_tx: mpsc::UnboundedSender<Internal>,
    view_tx: mpsc::UnboundedSender<ViewUpdate>,
}

impl SessionRuntime {
    async fn run(
        mut self,
        mut commands: CommandReceiver,
        mut internal_rx: mpsc::UnboundedReceiver<Internal>,
        frame_interval: Duration,
    ) {
        let mut frame = tokio::time::interval(frame_interval);
        frame.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let root = self.root.clone();

        loop {
            tokio::select! {
                biased;
                () = root.cancelled() => break,
                Some(msg) = internal_rx.recv() => self.handle_internal(msg),
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    self.handle_command(command);
                }
                _ = frame.tick() => self.flush_frame(),
            }
        }

        self.shutdown(&mut internal_rx).await;
    }

    /// Every session started so far gets its `SessionEnded` before the
    /// runtime returns.
    async fn shutdown(&mut self, internal_rx: &mut mpsc::UnboundedReceiver<Internal>) {
        if let Some(live) = self.live.take() {
            let Live {
                id,
                cancel,
                tracker,
                coalescer,
                ..
            } = live;
            cancel.cancel();
            drop(coalescer);
            tracker.close();
            tracker.wait().await;
            self.notify(Notification::info(
                NotificationKind::SessionEnded {
                    session_id: id,
                    superseded: false,
                },
                format!("session {id} ended"),
            ));
        }

        self.finalizers.close();
        self.finalizers.wait().await;
        while let Ok(Internal { session_id, event }) = internal_rx.try_recv() {
            if let SessionEvent::Finalized { superseded } = event {
                self.on_finalized(session_id, superseded);
            }
        }

        self.set_state(SessionState::Idle);
        self.set_status(ConnectionStatus::Offline);
        debug!("session runtime stopped");
    }

    // ── Commands ─────────────────────────────────────────────────────

    fn handle_command(&mut self, command: Command) {
        trace!(?command, "command");
        match command {
            Command::Connect => self.start_session(),
            Command::Disconnect => self.disconnect(),
            Command::ApplyFilter(expr) => self.apply_filter(expr),
            Command::SetKindVisible { kind, visible } => self.set_kind_visible(kind, visible),
            Command::Reload => {
                if let Some(live) = self.connected("reload") {
                    let registry = Arc::clone(&self.backends.registry);
                    live.spawn_call(&self.internal_tx, async move {
                        SessionEvent::Reloaded(registry.list().await)
                    });
                }
            }
            Command::Add(form) => self.add(&form),
            Command::Delete(entity_id) => self.delete(entity_id),
            Command::Adjust { entity_id, delta } => self.adjust(&entity_id, delta),
        }
    }

    /// The live session, or a `NotConnected` notification.
    fn connected(&self, what: &str) -> Option<&Live> {
        if self.live.is_none() {
            self.notify(Notification::warning(
                NotificationKind::NotConnected,
                format!("cannot {what}: {}", CoreError::Disconnected),
            ));
        }
        self.live.as_ref()
    }

    fn start_session(&mut self) {
        if self.filter.is_empty() {
            let err = CoreError::FilterRejected {
                expr: self.filter_expr.clone(),
            };
            self.notify(Notification::from_error(NotificationKind::FilterRejected, &err));
            return;
        }

        if let Some(old) = self.live.take() {
            debug!(session_id = old.id, "superseding session");
            self.finish(old, true);
        }
        self.draining = None;

        self.next_id += 1;
        let id = self.next_id;
        self.shared.session_id.send_replace(id);
        self.shared.registry.clear_blocked();
        self.prune_cards_outside_filter();

        let cancel = self.root.child_token();
        let tracker = TaskTracker::new();
        let sink: OutcomeSink = {
            let tx = self.internal_tx.clone();
            Arc::new(move |outcome| {
                let _ = tx.send(Internal {
                    session_id: id,
                    event: SessionEvent::Adjusted(outcome),
                });
            })
        };
        let coalescer = RequestCoalescer::new(
            Arc::clone(&self.backends.registry),
            self.coalesce_quiet,
            tracker.clone(),
            cancel.clone(),
            sink,
        );
        let live = Live {
            id,
            cancel: cancel.clone(),
            tracker,
            coalescer,
            reload_settled: false,
            transport_open: false,
        };

        self.set_state(SessionState::Connecting);
        self.set_status(ConnectionStatus::Connecting);

        let registry = Arc::clone(&self.backends.registry);
        live.spawn_call(&self.internal_tx, async move {
            SessionEvent::Reloaded(registry.list().await)
        });

        let stream = self.ingestor.open(&self.filter);
        live.tracker
            .spawn(pump_events(id, stream, cancel, self.internal_tx.clone()));

        self.live = Some(live);
        info!(session_id = id, filter = %self.filter, "session started");
    }

    fn disconnect(&mut self) {
        let Some(live) = self.live.take() else {
            debug!("disconnect while idle");
            return;
        };
        self.draining = Some(live.id);
        self.set_state(SessionState::Draining);
        self.finish(live, false);
    }

    /// Fire the session's cancellation and report `Finalized` once every
    /// sub-activity has returned.
    fn finish(&self, live: Live, superseded: bool) {
        let Live {
            id,
            cancel,
            tracker,
            coalescer,
            ..
        } = live;
        cancel.cancel();
        drop(coalescer);
        tracker.close();

        let tx = self.internal_tx.clone();
        self.finalizers.spawn(async move {
            tracker.wait().await;
            let _ = tx.send(Internal {
                session_id: id,
                event: SessionEvent::Finalized { superseded },
            });
        });
    }

    fn apply_filter(&mut self, expr: String) {
        let parsed = IntervalSet::parse(&expr);
        if parsed.is_empty() {
            let err = CoreError::FilterRejected { expr };
            self.notify(Notification::from_error(NotificationKind::FilterRejected, &err));
            return;
        }

        if let Err(e) = self.backends.preferences.save(&expr) {
            warn!(error = %e, "device filter not persisted");
            self.notify(Notification::from_error(
                NotificationKind::PreferenceSaveFailed,
                &e,
            ));
        }

        self.notify(Notification::info(
            NotificationKind::FilterApplied,
            format!("device filter set to {parsed}"),
        ));
        self.filter = parsed;
        self.shared.filter.send_replace(expr.clone());
        self.filter_expr = expr;
        self.start_session();
    }

    fn set_kind_visible(&mut self, kind: SensorKind, visible: bool) {
        let changed = if visible {
            self.hidden.remove(&kind)
        } else {
            self.hidden.insert(kind)
        };
        if !changed {
            return;
        }
        if visible {
            for (id, card) in &self.cards {
                if card.kind == kind {
                    self.dirty.insert(id.clone());
                }
            }
        }
        self.emit(ViewUpdate::KindFilter { kind, visible });
    }

    fn add(&self, form: &AddForm) {
        if self.connected("add sensor").is_none() {
            return;
        }
        let entity = match form.validate() {
            Ok(entity) => entity,
            Err(e) => {
                let err = CoreError::from(e);
                self.notify(Notification::from_error(
                    NotificationKind::ValidationFailed,
                    &err,
                ));
                return;
            }
        };

        let registry = Arc::clone(&self.backends.registry);
        if let Some(live) = self.live.as_ref() {
            live.spawn_call(&self.internal_tx, async move {
                SessionEvent::Added(registry.add(&entity).await)
            });
        }
    }

    fn delete(&self, entity_id: EntityId) {
        if self.connected("delete sensor").is_none() {
            return;
        }
        // Blocked before the call goes out.
        if !self.shared.registry.block(&entity_id) {
            debug!(%entity_id, "delete already pending");
            return;
        }

        let registry = Arc::clone(&self.backends.registry);
        if let Some(live) = self.live.as_ref() {
            live.spawn_call(&self.internal_tx, async move {
                let result = registry.delete(&entity_id).await;
                SessionEvent::Deleted { entity_id, result }
            });
        }
    }

    fn adjust(&mut self, entity_id: &EntityId, delta: f64) {
        if self.connected("adjust bias").is_none() {
            return;
        }
        if !delta.is_finite() || self.shared.registry.is_blocked(entity_id) {
            debug!(%entity_id, delta, "adjust ignored");
            return;
        }

        if let Some(bias) = self.shared.registry.nudge_bias(entity_id, delta) {
            self.emit(ViewUpdate::Bias {
                entity_id: entity_id.clone(),
                bias,
                confirmed: false,
            });
        }
        if let Some(live) = self.live.as_mut() {
            live.coalescer.submit(entity_id, delta);
        }
    }

    // ── Sub-activity results ─────────────────────────────────────────

    fn handle_internal(&mut self, msg: Internal) {
        let Internal { session_id, event } = msg;

        if let SessionEvent::Finalized { superseded } = event {
            self.on_finalized(session_id, superseded);
            return;
        }
        if self.live.as_ref().is_none_or(|live| live.id != session_id) {
            trace!(session_id, "discarding result from ended session");
            return;
        }

        match event {
            SessionEvent::Ingest(event) => self.on_ingest(event),
            SessionEvent::IngestEnded => {
                warn!(session_id, "event stream gave up");
                if let Some(live) = self.live.as_mut() {
                    live.transport_open = false;
                }
                self.set_status(ConnectionStatus::Offline);
            }
            SessionEvent::Reloaded(result) => self.on_reloaded(result),
            SessionEvent::Added(result) => self.on_added(result),
            SessionEvent::Deleted { entity_id, result } => self.on_deleted(entity_id, result),
            SessionEvent::Adjusted(outcome) => self.on_adjusted(outcome),
            SessionEvent::Finalized { .. } => {}
        }
    }

    fn on_finalized(&mut self, session_id: u64, superseded: bool) {
        debug!(session_id, superseded, "session finalized");
        self.notify(Notification::info(
            NotificationKind::SessionEnded {
                session_id,
                superseded,
            },
            format!("session {session_id} ended"),
        ));

        if self.live.is_none() && self.draining == Some(session_id) {
            self.draining = None;
            self.set_state(SessionState::Idle);
            self.set_status(ConnectionStatus::Offline);
        }
    }

    fn on_ingest(&mut self, event: IngestEvent) {
        match event {
            IngestEvent::Opened => {
                if let Some(live) = self.live.as_mut() {
                    live.transport_open = true;
                }
                if self.state() == SessionState::Active {
                    self.set_status(ConnectionStatus::Online);
                } else {
                    self.maybe_activate();
                }
            }
            IngestEvent::TransportError(reason) => {
                debug!(%reason, "event stream interrupted");
                if let Some(live) = self.live.as_mut() {
                    live.transport_open = false;
                }
                if self.state() == SessionState::Active {
                    self.set_status(ConnectionStatus::Reconnecting);
                }
            }
            IngestEvent::DecodeFailed { payload, error } => {
                warn!(error = %error, payload = %payload, "dropping malformed reading");
                self.notify(Notification::warning(
                    NotificationKind::DecodeFailed,
                    error.to_string(),
                ));
            }
            IngestEvent::Reading(reading) => self.on_reading(&reading),
        }
    }

    fn on_reading(&mut self, reading: &Reading) {
        if !self.filter.contains(&reading.device_id) {
            trace!(device_id = %reading.device_id, "reading outside filter");
            return;
        }
        let registry = &self.shared.registry;
        if registry.is_blocked(&reading.entity_id) {
            trace!(entity_id = %reading.entity_id, "reading for blocked sensor");
            return;
        }
        registry.observe(reading);

        if !self.cards.contains_key(&reading.entity_id) {
            self.create_card(reading);
        }
        if self.hidden.contains(&reading.kind) {
            return;
        }

        let Some(card) = self.cards.get_mut(&reading.entity_id) else {
            return;
        };
        card.series.append(SeriesPoint {
            t: reading.observed_at,
            v: card.kind.normalize(reading.value),
        });
        self.dirty.insert(reading.entity_id.clone());
        self.emit(ViewUpdate::Log {
            entity_id: reading.entity_id.clone(),
            line: view::reading_line(reading),
        });
    }

    fn create_card(&mut self, reading: &Reading) {
        let entity = self.shared.registry.get(&reading.entity_id);
        self.cards.insert(
            reading.entity_id.clone(),
            Card {
                kind: reading.kind,
                device_id: reading.device_id.clone(),
                series: BoundedSeries::with_compact_floor(self.window, self.compact_floor),
            },
        );
        debug!(entity_id = %reading.entity_id, kind = %reading.kind, "card created");

        self.emit(ViewUpdate::CardCreated {
            entity_id: reading.entity_id.clone(),
            kind: reading.kind,
            device_id: reading.device_id.clone(),
            name: entity
                .as_ref()
                .map(|e| e.name.clone())
                .unwrap_or_default(),
        });
        if let Some(entity) = entity {
            self.emit(ViewUpdate::CardMeta { entity });
        }
        self.emit(ViewUpdate::Log {
            entity_id: reading.entity_id.clone(),
            line: view::card_created_line(),
        });
    }

    fn on_reloaded(&mut self, result: Result<Vec<Entity>, CoreError>) {
        match result {
            Ok(entities) => {
                let summary = self.shared.registry.replace_all(entities);
                debug!(
                    added = summary.added.len(),
                    updated = summary.updated.len(),
                    removed = summary.removed.len(),
                    "registry reloaded"
                );
                for id in self.cards.keys() {
                    if let Some(entity) = self.shared.registry.get(id) {
                        let _ = self.view_tx.send(ViewUpdate::CardMeta { entity });
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "registry reload failed");
                self.notify(Notification::from_error(
                    NotificationKind::RegistryCallFailed,
                    &e,
                ));
            }
        }

        if let Some(live) = self.live.as_mut() {
            live.reload_settled = true;
        }
        self.maybe_activate();
    }

    fn on_added(&mut self, result: Result<Entity, CoreError>) {
        match result {
            Ok(entity) => {
                info!(entity_id = %entity.id, "sensor added");
                self.notify(
                    Notification::info(
                        NotificationKind::AddSucceeded,
                        format!("sensor {} added", entity.display_name()),
                    )
                    .for_entity(entity.id.clone()),
                );
                let registry = Arc::clone(&self.backends.registry);
                if let Some(live) = self.live.as_ref() {
                    live.spawn_call(&self.internal_tx, async move {
                        SessionEvent::Reloaded(registry.list().await)
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "add failed");
                self.notify(Notification::from_error(NotificationKind::AddFailed, &e));
            }
        }
    }

    fn on_deleted(&mut self, entity_id: EntityId, result: Result<(), CoreError>) {
        match result {
            Ok(()) => {
                info!(%entity_id, "sensor deleted");
                self.shared.registry.remove(&entity_id);
                if let Some(live) = self.live.as_mut() {
                    live.coalescer.cancel(&entity_id);
                }
                self.dirty.shift_remove(&entity_id);
                if self.cards.remove(&entity_id).is_some() {
                    self.emit(ViewUpdate::CardRemoved {
                        entity_id: entity_id.clone(),
                    });
                }
                self.notify(
                    Notification::info(
                        NotificationKind::DeleteSucceeded,
                        format!("sensor {entity_id} deleted"),
                    )
                    .for_entity(entity_id),
                );
            }
            Err(e) => {
                warn!(%entity_id, error = %e, "delete failed");
                self.shared.registry.unblock(&entity_id);
                if self.cards.contains_key(&entity_id) {
                    self.emit(ViewUpdate::Log {
                        entity_id: entity_id.clone(),
                        line: view::delete_failed_line(&e),
                    });
                }
                self.notify(
                    Notification::from_error(NotificationKind::DeleteFailed, &e)
                        .for_entity(entity_id),
                );
            }
        }
    }

    fn on_adjusted(&mut self, outcome: AdjustOutcome) {
        match outcome {
            AdjustOutcome::Applied {
                entity_id,
                delta,
                bias,
            } => {
                self.shared.registry.set_bias(&entity_id, bias);
                self.emit(ViewUpdate::Bias {
                    entity_id: entity_id.clone(),
                    bias,
                    confirmed: true,
                });
                if self.cards.contains_key(&entity_id) {
                    self.emit(ViewUpdate::Log {
                        entity_id,
                        line: view::adjust_line(delta, bias),
                    });
                }
            }
            AdjustOutcome::Failed {
                entity_id,
                delta,
                error,
            } => {
                if self.cards.contains_key(&entity_id) {
                    self.emit(ViewUpdate::Log {
                        entity_id: entity_id.clone(),
                        line: view::adjust_failed_line(delta, &error),
                    });
                }
                self.notify(
                    Notification::from_error(NotificationKind::AdjustFailed, &error)
                        .for_entity(entity_id),
                );
            }
        }
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn maybe_activate(&mut self) {
        let ready = self
            .live
            .as_ref()
            .is_some_and(|live| live.reload_settled && live.transport_open);
        if ready && self.state() == SessionState::Connecting {
            self.set_state(SessionState::Active);
            self.set_status(ConnectionStatus::Online);
            info!(session_id = self.next_id, "session active");
        }
    }

    fn prune_cards_outside_filter(&mut self) {
        let filter = &self.filter;
        let outside: Vec<EntityId> = self
            .cards
            .iter()
            .filter(|(_, card)| !filter.contains(&card.device_id))
            .map(|(id, _)| id.clone())
            .collect();
        for entity_id in outside {
            self.cards.remove(&entity_id);
            self.dirty.shift_remove(&entity_id);
            self.emit(ViewUpdate::CardRemoved { entity_id });
        }
    }

    /// Emit one `Redraw` per card touched since the last frame.
    fn flush_frame(&mut self) {
        for entity_id in self.dirty.drain(..) {
            let Some(card) = self.cards.get(&entity_id) else {
                continue;
            };
            let Some(now) = card.series.last().map(|p| p.t) else {
                continue;
            };
            let points: Arc<[SeriesPoint]> = card.series.window(now).copied().collect();
            let _ = self.view_tx.send(ViewUpdate::Redraw {
                entity_id,
                kind: card.kind,
                points,
            });
        }
    }

    fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    fn set_state(&self, state: SessionState) {
        self.shared.state.send_if_modified(|current| {
            let changed = *current != state;
            *current = state;
            changed
        });
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.shared.status.send_if_modified(|current| {
            let changed = *current != status;
            *current = status;
            changed
        });
    }

    fn emit(&self, update: ViewUpdate) {
        let _ = self.view_tx.send(update);
    }

    fn notify(&self, notification: Notification) {
        debug!(%notification, "notification");
        let _ = self.shared.notifications.send(notification);
    }
}

/// Forward ingest events to the runtime until cancelled.
async fn pump_events(
    session_id: u64,
    mut stream: IngestStream,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<Internal>,
) {
    loop {
        let event = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            event = stream.next() => event,
        };
        let event = match event {
            Some(event) => SessionEvent::Ingest(event),
            None => {
                let _ = tx.send(Internal {
                    session_id,
                    event: SessionEvent::IngestEnded,
                });
                break;
            }
        };
        if tx.send(Internal { session_id, event }).is_err() {
            break;
        }
    }
    stream.close();
}
