//! In-memory target repository.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{EntityKind, Lookup, TargetEntity, TargetError, TargetId, TargetRepository, TargetResult};

#[derive(Default)]
struct State {
    next_id: TargetId,
    entities: BTreeMap<TargetId, TargetEntity>,
    index: HashMap<(EntityKind, Lookup), TargetId>,
}

impl State {
    fn keys(entity: &TargetEntity) -> Vec<Lookup> {
        let mut keys = Vec::with_capacity(3);
        if let Some(k) = entity.natural_key() {
            keys.push(Lookup::NaturalKey(k.to_string()));
        }
        if let Some(s) = entity.slug() {
            keys.push(Lookup::Slug(s.to_string()));
        }
        if let Some(l) = entity.legacy_key() {
            keys.push(Lookup::Legacy(l.to_string()));
        }
        keys
    }

    /// Natural keys and slugs are unique; legacy keys are first-wins.
    fn check_unique(&self, entity: &TargetEntity, except: Option<TargetId>) -> TargetResult<()> {
        let kind = entity.kind();
        for key in Self::keys(entity) {
            let (field, value) = match &key {
                Lookup::NaturalKey(v) => ("natural key", v),
                Lookup::Slug(v) => ("slug", v),
                Lookup::Legacy(_) => continue,
            };
            if let Some(existing) = self.index.get(&(kind, key.clone())) {
                if Some(*existing) != except {
                    return Err(TargetError::Conflict {
                        kind,
                        field,
                        value: value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn index_entity(&mut self, id: TargetId, entity: &TargetEntity) {
        let kind = entity.kind();
        for key in Self::keys(entity) {
            self.index.entry((kind, key)).or_insert(id);
        }
    }

    fn unindex_entity(&mut self, id: TargetId, entity: &TargetEntity) {
        let kind = entity.kind();
        for key in Self::keys(entity) {
            let slot = (kind, key);
            if self.index.get(&slot) == Some(&id) {
                self.index.remove(&slot);
            }
        }
    }
}

/// Target repository held entirely in memory.
///
/// Used by tests and as the dry-run shadow, where ids start at a high base
/// so they can never be mistaken for persisted ones.
#[derive(Clone)]
pub struct MemoryTargetRepository {
    state: Arc<RwLock<State>>,
}

impl Default for MemoryTargetRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTargetRepository {
    pub fn new() -> Self {
        Self::with_id_base(1)
    }

    /// Ids are assigned sequentially starting at `base`.
    pub fn with_id_base(base: TargetId) -> Self {
        Self {
            state: Arc::new(RwLock::new(State {
                next_id: base,
                ..Default::default()
            })),
        }
    }

    /// Store an entity under an id chosen by the caller, replacing any
    /// previous value. Used for dry-run copies of persisted entities.
    pub async fn put(&self, id: TargetId, entity: TargetEntity) {
        let mut state = self.state.write().await;
        if let Some(previous) = state.entities.remove(&id) {
            state.unindex_entity(id, &previous);
        }
        state.index_entity(id, &entity);
        state.entities.insert(id, entity);
    }

    pub async fn contains(&self, id: TargetId) -> bool {
        self.state.read().await.entities.contains_key(&id)
    }

    /// Every entity of a kind, in id order.
    pub async fn all(&self, kind: EntityKind) -> Vec<(TargetId, TargetEntity)> {
        self.state
            .read()
            .await
            .entities
            .iter()
            .filter(|(_, e)| e.kind() == kind)
            .map(|(id, e)| (*id, e.clone()))
            .collect()
    }

    /// Number of entities of a kind created here, not counting [`put`](Self::put) copies
    /// below the id base.
    pub async fn count_from(&self, kind: EntityKind, min_id: TargetId) -> u64 {
        self.state
            .read()
            .await
            .entities
            .iter()
            .filter(|(id, e)| **id >= min_id && e.kind() == kind)
            .count() as u64
    }
}

#[async_trait]
impl TargetRepository for MemoryTargetRepository {
    async fn find(&self, kind: EntityKind, lookup: &Lookup) -> TargetResult<Option<TargetId>> {
        Ok(self
            .state
            .read()
            .await
            .index
            .get(&(kind, lookup.clone()))
            .copied())
    }

    async fn get(&self, kind: EntityKind, id: TargetId) -> TargetResult<Option<TargetEntity>> {
        Ok(self
            .state
            .read()
            .await
            .entities
            .get(&id)
            .filter(|e| e.kind() == kind)
            .cloned())
    }

    async fn create(&self, entity: &TargetEntity) -> TargetResult<TargetId> {
        let mut state = self.state.write().await;
        state.check_unique(entity, None)?;

        let id = state.next_id;
        state.next_id += 1;
        state.index_entity(id, entity);
        state.entities.insert(id, entity.clone());
        Ok(id)
    }

    async fn create_with_children(
        &self,
        parent: &TargetEntity,
        children: &[TargetEntity],
    ) -> TargetResult<(TargetId, Vec<TargetId>)> {
        let mut state = self.state.write().await;
        let first_id = state.next_id;
        let mut ids: Vec<TargetId> = Vec::with_capacity(children.len() + 1);
        let mut failure = None;

        for entity in std::iter::once(parent).chain(children) {
            let mut entity = entity.clone();
            if let Some(&parent_id) = ids.first() {
                entity.attach_to(parent_id);
            }
            if let Err(e) = state.check_unique(&entity, None) {
                failure = Some(e);
                break;
            }
            let id = state.next_id;
            state.next_id += 1;
            state.index_entity(id, &entity);
            state.entities.insert(id, entity);
            ids.push(id);
        }

        if let Some(e) = failure {
            for id in ids {
                if let Some(entity) = state.entities.remove(&id) {
                    state.unindex_entity(id, &entity);
                }
            }
            state.next_id = first_id;
            return Err(e);
        }
        let parent_id = ids.remove(0);
        Ok((parent_id, ids))
    }

    async fn update(&self, id: TargetId, entity: &TargetEntity) -> TargetResult<()> {
        let mut state = self.state.write().await;
        let kind = entity.kind();
        let previous = match state.entities.get(&id) {
            Some(existing) if existing.kind() != kind => {
                return Err(TargetError::KindMismatch(existing.kind()))
            }
            Some(existing) => existing.clone(),
            None => return Err(TargetError::NotFound { kind, id }),
        };
        state.check_unique(entity, Some(id))?;

        state.unindex_entity(id, &previous);
        state.index_entity(id, entity);
        state.entities.insert(id, entity.clone());
        Ok(())
    }

    async fn count(&self, kind: EntityKind) -> TargetResult<u64> {
        Ok(self
            .state
            .read()
            .await
            .entities
            .values()
            .filter(|e| e.kind() == kind)
            .count() as u64)
    }
}
