// ── In-memory entity registry ──
//
// Projection of the remote registry: last-known metadata per sensor plus
// the set of sensors with a delete in flight. Concurrent readers get O(1)
// lookups; subscribers get push-based snapshots via `watch`.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use tokio::sync::watch;

use crate::model::{Entity, EntityId, Reading};
use crate::stream::{EntityStream, Snapshot};

/// Result of an authoritative reload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplaceSummary {
    pub added: Vec<EntityId>,
    pub updated: Vec<EntityId>,
    pub removed: Vec<EntityId>,
}

/// Reactive map of entity id → last-known [`Entity`].
pub struct EntityRegistry {
    by_id: DashMap<EntityId, Arc<Entity>>,
    /// Sensors whose delete call has not resolved yet (or succeeded).
    blocked: DashSet<EntityId>,
    snapshot: watch::Sender<Snapshot<Entity>>,
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl EntityRegistry {
    pub fn new() -> Self {
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            by_id: DashMap::new(),
            blocked: DashSet::new(),
            snapshot,
        }
    }

    // ── Projection updates ───────────────────────────────────────────

    /// Replace the whole map with a registry snapshot.
    ///
    /// Entities missing from `incoming` are pruned. A bias the registry did
    /// not report keeps its last local value.
    pub fn replace_all(&self, incoming: Vec<Entity>) -> ReplaceSummary {
        let mut summary = ReplaceSummary::default();
        let mut seen = Vec::with_capacity(incoming.len());

        for mut entity in incoming {
            let id = entity.id.clone();
            match self.by_id.get(&id).map(|r| Arc::clone(r.value())) {
                Some(existing) => {
                    if entity.bias.is_none() {
                        entity.bias = existing.bias;
                    }
                    if *existing != entity {
                        summary.updated.push(id.clone());
                    }
                }
                None => summary.added.push(id.clone()),
            }
            self.by_id.insert(id.clone(), Arc::new(entity));
            seen.push(id);
        }

        let stale: Vec<EntityId> = self
            .by_id
            .iter()
            .filter(|r| !seen.contains(r.key()))
            .map(|r| r.key().clone())
            .collect();
        for id in stale {
            self.by_id.remove(&id);
            summary.removed.push(id);
        }

        self.rebuild_snapshot();
        summary
    }

    /// Insert or replace one entity. Returns `true` if it was new.
    pub fn upsert(&self, entity: Entity) -> bool {
        let is_new = self
            .by_id
            .insert(entity.id.clone(), Arc::new(entity))
            .is_none();
        self.rebuild_snapshot();
        is_new
    }

    /// Record a sensor first seen on the live stream. Known sensors are
    /// left untouched. Returns `true` if a placeholder was created.
    pub fn observe(&self, reading: &Reading) -> bool {
        if self.by_id.contains_key(&reading.entity_id) {
            return false;
        }
        self.upsert(Entity::observed(reading))
    }

    pub fn remove(&self, id: &EntityId) -> Option<Arc<Entity>> {
        let removed = self.by_id.remove(id).map(|(_, v)| v);
        if removed.is_some() {
            self.rebuild_snapshot();
        }
        removed
    }

    /// Set the bias of a known entity, returning the updated record.
    pub fn set_bias(&self, id: &EntityId, bias: f64) -> Option<Arc<Entity>> {
        let updated = {
            let mut slot = self.by_id.get_mut(id)?;
            let mut entity = Entity::clone(slot.value());
            entity.bias = Some(bias);
            let updated = Arc::new(entity);
            *slot.value_mut() = Arc::clone(&updated);
            updated
        };
        self.rebuild_snapshot();
        Some(updated)
    }

    /// Shift the local bias by `delta` ahead of the registry's answer.
    /// Returns the new local bias.
    pub fn nudge_bias(&self, id: &EntityId, delta: f64) -> Option<f64> {
        let current = self.get(id)?.bias.unwrap_or(0.0);
        let next = current + delta;
        self.set_bias(id, next).map(|_| next)
    }

    // ── Lookups ──────────────────────────────────────────────────────

    pub fn get(&self, id: &EntityId) -> Option<Arc<Entity>> {
        self.by_id.get(id).map(|r| Arc::clone(r.value()))
    }

    pub fn contains(&self, id: &EntityId) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Current snapshot, sorted by entity id.
    pub fn snapshot(&self) -> Snapshot<Entity> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> EntityStream<Entity> {
        EntityStream::new(self.snapshot.subscribe())
    }

    // ── Blocked set ──────────────────────────────────────────────────

    /// Stop materializing `id`. Returns `false` if it was already blocked.
    pub fn block(&self, id: &EntityId) -> bool {
        self.blocked.insert(id.clone())
    }

    pub fn unblock(&self, id: &EntityId) -> bool {
        self.blocked.remove(id).is_some()
    }

    pub fn is_blocked(&self, id: &EntityId) -> bool {
        self.blocked.contains(id)
    }

    pub fn clear_blocked(&self) {
        self.blocked.clear();
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn rebuild_snapshot(&self) {
        let mut values: Vec<Arc<Entity>> =
            self.by_id.iter().map(|r| Arc::clone(r.value())).collect();
        values.sort_by(|a, b| a.id.cmp(&b.id));
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
    }
}
