//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use community_migrate::importers::default_registry;
use community_migrate::mapping::MemoryMappingStore;
use community_migrate::source::{MemorySource, SourceRecord};
use community_migrate::target::{
    EntityKind, Lookup, MemoryTargetRepository, TargetEntity, TargetError, TargetId,
    TargetRepository, TargetResult,
};
use community_migrate::{Backends, Orchestrator, Reporter};

pub fn row(value: Value) -> SourceRecord {
    match value {
        Value::Object(map) => SourceRecord::from_map(map),
        other => panic!("row fixture must be an object, got {}", other),
    }
}

/// Reporter that discards everything.
pub struct QuietReporter;

impl Reporter for QuietReporter {
    fn info(&self, _message: &str) {}
    fn error(&self, _message: &str) {}
    fn progress(&self, _total: u64) {}
    fn advance(&self) {}
}

pub struct MemoryBackends {
    pub backends: Backends,
    pub target: Arc<MemoryTargetRepository>,
    pub mappings: Arc<MemoryMappingStore>,
}

pub fn memory_backends(source: MemorySource) -> MemoryBackends {
    let target = Arc::new(MemoryTargetRepository::new());
    let mappings = Arc::new(MemoryMappingStore::new());
    let backends = Backends::new(Arc::new(source), target.clone(), mappings.clone());
    MemoryBackends {
        backends,
        target,
        mappings,
    }
}

/// Target that refuses the first price it is asked to write, the way a
/// database drops a connection halfway through a record.
pub struct PriceFailingTarget {
    inner: Arc<MemoryTargetRepository>,
    armed: AtomicBool,
}

impl PriceFailingTarget {
    pub fn new(inner: Arc<MemoryTargetRepository>) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(true),
        }
    }

    fn refuse<'a>(&self, mut entities: impl Iterator<Item = &'a TargetEntity>) -> TargetResult<()> {
        let has_price = entities.any(|e| e.kind() == EntityKind::Price);
        if has_price && self.armed.swap(false, Ordering::SeqCst) {
            return Err(TargetError::Connection("price write refused".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetRepository for PriceFailingTarget {
    async fn find(&self, kind: EntityKind, lookup: &Lookup) -> TargetResult<Option<TargetId>> {
        self.inner.find(kind, lookup).await
    }

    async fn get(&self, kind: EntityKind, id: TargetId) -> TargetResult<Option<TargetEntity>> {
        self.inner.get(kind, id).await
    }

    async fn create(&self, entity: &TargetEntity) -> TargetResult<TargetId> {
        self.refuse(std::iter::once(entity))?;
        self.inner.create(entity).await
    }

    async fn create_with_children(
        &self,
        parent: &TargetEntity,
        children: &[TargetEntity],
    ) -> TargetResult<(TargetId, Vec<TargetId>)> {
        self.refuse(children.iter())?;
        self.inner.create_with_children(parent, children).await
    }

    async fn update(&self, id: TargetId, entity: &TargetEntity) -> TargetResult<()> {
        self.inner.update(id, entity).await
    }

    async fn count(&self, kind: EntityKind) -> TargetResult<u64> {
        self.inner.count(kind).await
    }
}

pub fn orchestrator() -> Orchestrator {
    Orchestrator::new(default_registry().unwrap())
}

/// A small community covering every entity type.
///
/// Expected outcomes of a full run:
/// - users: 2 migrated, 1 skipped (bad email); user 3 is unapproved
/// - groups: 1 migrated, 1 skipped (owner not migrated)
/// - forums: 1 category and 2 forums, forum 3 nested under forum 2
/// - topics: 2 migrated; posts: 3 migrated, 1 skipped (empty body)
/// - blogs: 1 migrated; comments: 2 migrated, one of them a guest comment
/// - product_categories: 2; products: 1; subscriptions: 1; orders: 1
pub async fn community_source() -> MemorySource {
    let source = MemorySource::new();
    source
        .insert_all(
            "users",
            [
                row(json!({"id": 1, "email": "Alice@Example.com", "username": "alice", "approved": 1, "group_id": 1})),
                row(json!({"id": 2, "email": "bob@example.com", "username": "bob", "approved": 1})),
                row(json!({"id": 3, "email": "carol@example.com", "username": "carol", "approved": 0})),
                row(json!({"id": 4, "email": "not-an-email", "username": "dave", "approved": 1})),
            ],
        )
        .await;
    source
        .insert_all(
            "groups",
            [
                row(json!({"id": 1, "user_id": 1, "title": "Rustaceans", "privacy": "public"})),
                row(json!({"id": 2, "user_id": 3, "title": "Ghosts", "privacy": "private"})),
            ],
        )
        .await;
    source
        .insert_all(
            "forums",
            [
                row(json!({"id": 1, "type": "category", "title": "General", "position": 1})),
                row(json!({"id": 2, "type": "forum", "title": "Announcements", "parent_id": 1})),
                row(json!({"id": 3, "type": "forum", "title": "Releases", "parent_id": 2})),
            ],
        )
        .await;
    source
        .insert_all(
            "forum_topics",
            [
                row(json!({"id": 1, "forum_id": 2, "user_id": 1, "title": "Welcome", "approved": 1})),
                row(json!({"id": 2, "forum_id": 3, "user_id": 2, "title": "1.0 is out", "approved": 1})),
                row(json!({"id": 3, "forum_id": 2, "user_id": 2, "title": "Spam", "approved": 0})),
            ],
        )
        .await;
    source
        .insert_all(
            "forum_posts",
            [
                row(json!({"id": 1, "topic_id": 1, "user_id": 1, "body": "Hello everyone", "approved": 1})),
                row(json!({"id": 2, "topic_id": 1, "user_id": 2, "body": "Hi!", "approved": 1})),
                row(json!({"id": 3, "topic_id": 2, "user_id": 2, "body": "Ship it", "approved": 1})),
                row(json!({"id": 4, "topic_id": 1, "user_id": 1, "body": "   ", "approved": 1})),
            ],
        )
        .await;
    source
        .insert_all(
            "blogs",
            [
                row(json!({"id": 1, "user_id": 1, "title": "Hello World", "body": "First post", "draft": 0})),
                row(json!({"id": 2, "user_id": 2, "title": "Unfinished", "body": "...", "draft": 1})),
            ],
        )
        .await;
    source
        .insert_all(
            "comments",
            [
                row(json!({"id": 1, "resource_type": "blog", "resource_id": 1, "user_id": 2, "body": "Nice"})),
                row(json!({"id": 2, "resource_type": "blog", "resource_id": 1, "user_id": 99, "name": "Visitor", "body": "Great read"})),
                row(json!({"id": 3, "resource_type": "photo", "resource_id": 1, "user_id": 2, "body": "Cute"})),
            ],
        )
        .await;
    source
        .insert_all(
            "product_categories",
            [
                row(json!({"id": 1, "title": "Books"})),
                row(json!({"id": 2, "title": "Paperbacks", "parent_id": 1})),
            ],
        )
        .await;
    source
        .insert(
            "products",
            row(json!({
                "id": 1, "sku": "BK-1", "title": "Rust Book", "category_id": 2, "enabled": 1,
                "cost": "{\"USD\":{\"amount\":10}}"
            })),
        )
        .await;
    source
        .insert(
            "subscription_packages",
            row(json!({"id": 1, "title": "Gold", "enabled": 1, "group_id": 1, "renewal": {"USD": 5}})),
        )
        .await;
    source
        .insert(
            "orders",
            row(json!({"id": 1, "user_id": 1, "status": "completed", "currency": "usd"})),
        )
        .await;
    source
        .insert_all(
            "order_items",
            [
                row(json!({"id": 1, "order_id": 1, "product_id": 1, "title": "Rust Book", "quantity": 1, "price": "10.00"})),
                row(json!({"id": 2, "order_id": 1, "product_id": 1, "product_type": "subscription", "price": 5})),
            ],
        )
        .await;
    source
}
