//! Write gateway that turns persistence off for dry runs.

use std::sync::Arc;

use async_trait::async_trait;

use super::{
    EntityKind, Lookup, MemoryTargetRepository, TargetEntity, TargetError, TargetId,
    TargetRepository, TargetResult,
};

/// First id handed out by the dry-run shadow.
pub const DRY_RUN_ID_BASE: TargetId = 1 << 40;

/// The repository importers talk to during a run.
///
/// In a real run every call goes straight to the underlying repository. In a
/// dry run writes land in an in-memory shadow instead, and reads see the
/// shadow layered over the real data, so every skip/migrate/fail decision is
/// made exactly as it would be for real.
#[derive(Clone)]
pub struct TargetGateway {
    inner: Arc<dyn TargetRepository>,
    shadow: Option<MemoryTargetRepository>,
}

impl TargetGateway {
    pub fn live(inner: Arc<dyn TargetRepository>) -> Self {
        Self {
            inner,
            shadow: None,
        }
    }

    pub fn dry_run(inner: Arc<dyn TargetRepository>) -> Self {
        Self {
            inner,
            shadow: Some(MemoryTargetRepository::with_id_base(DRY_RUN_ID_BASE)),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.shadow.is_some()
    }

    /// Conflicts with persisted data must surface in dry runs too.
    async fn check_persisted_unique(&self, entity: &TargetEntity) -> TargetResult<()> {
        let kind = entity.kind();
        if let Some(key) = entity.natural_key() {
            if self
                .inner
                .find(kind, &Lookup::NaturalKey(key.to_string()))
                .await?
                .is_some()
            {
                return Err(TargetError::Conflict {
                    kind,
                    field: "natural key",
                    value: key.to_string(),
                });
            }
        }
        if let Some(slug) = entity.slug() {
            if self
                .inner
                .find(kind, &Lookup::Slug(slug.to_string()))
                .await?
                .is_some()
            {
                return Err(TargetError::Conflict {
                    kind,
                    field: "slug",
                    value: slug.to_string(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl TargetRepository for TargetGateway {
    async fn find(&self, kind: EntityKind, lookup: &Lookup) -> TargetResult<Option<TargetId>> {
        if let Some(shadow) = &self.shadow {
            if let Some(id) = shadow.find(kind, lookup).await? {
                return Ok(Some(id));
            }
        }
        self.inner.find(kind, lookup).await
    }

    async fn get(&self, kind: EntityKind, id: TargetId) -> TargetResult<Option<TargetEntity>> {
        if let Some(shadow) = &self.shadow {
            if shadow.contains(id).await {
                return shadow.get(kind, id).await;
            }
        }
        self.inner.get(kind, id).await
    }

    async fn create(&self, entity: &TargetEntity) -> TargetResult<TargetId> {
        match &self.shadow {
            None => self.inner.create(entity).await,
            Some(shadow) => {
                self.check_persisted_unique(entity).await?;
                shadow.create(entity).await
            }
        }
    }

    async fn create_with_children(
        &self,
        parent: &TargetEntity,
        children: &[TargetEntity],
    ) -> TargetResult<(TargetId, Vec<TargetId>)> {
        match &self.shadow {
            None => self.inner.create_with_children(parent, children).await,
            Some(shadow) => {
                for entity in std::iter::once(parent).chain(children) {
                    self.check_persisted_unique(entity).await?;
                }
                shadow.create_with_children(parent, children).await
            }
        }
    }

    async fn update(&self, id: TargetId, entity: &TargetEntity) -> TargetResult<()> {
        let Some(shadow) = &self.shadow else {
            return self.inner.update(id, entity).await;
        };

        if shadow.contains(id).await {
            return shadow.update(id, entity).await;
        }
        let kind = entity.kind();
        if self.inner.get(kind, id).await?.is_none() {
            return Err(TargetError::NotFound { kind, id });
        }
        shadow.put(id, entity.clone()).await;
        Ok(())
    }

    async fn count(&self, kind: EntityKind) -> TargetResult<u64> {
        let persisted = self.inner.count(kind).await?;
        match &self.shadow {
            None => Ok(persisted),
            Some(shadow) => Ok(persisted + shadow.count_from(kind, DRY_RUN_ID_BASE).await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::models::{BlogPost, TargetEntity};

    fn blog(slug: &str) -> TargetEntity {
        TargetEntity::BlogPost(BlogPost {
            legacy_key: None,
            author_id: 1,
            title: slug.to_string(),
            slug: slug.to_string(),
            body: "body".to_string(),
            cover_image: None,
            comment_count: 0,
            published_at: None,
        })
    }

    #[tokio::test]
    async fn test_dry_run_writes_stay_in_shadow() {
        let real = Arc::new(MemoryTargetRepository::new());
        let persisted = real.create(&blog("existing")).await.unwrap();

        let gateway = TargetGateway::dry_run(real.clone());
        let id = gateway.create(&blog("fresh")).await.unwrap();
        assert!(id >= DRY_RUN_ID_BASE);

        // Visible through the gateway, absent from the real store.
        assert_eq!(
            gateway
                .find(EntityKind::BlogPost, &Lookup::Slug("fresh".into()))
                .await
                .unwrap(),
            Some(id)
        );
        assert_eq!(real.count(EntityKind::BlogPost).await.unwrap(), 1);
        assert_eq!(gateway.count(EntityKind::BlogPost).await.unwrap(), 2);

        // Updating a persisted entity only changes the shadow copy.
        let mut changed = blog("existing");
        if let TargetEntity::BlogPost(b) = &mut changed {
            b.comment_count = 3;
        }
        gateway.update(persisted, &changed).await.unwrap();
        assert_eq!(
            gateway.get(EntityKind::BlogPost, persisted).await.unwrap(),
            Some(changed)
        );
        assert_eq!(
            real.get(EntityKind::BlogPost, persisted).await.unwrap(),
            Some(blog("existing"))
        );
        assert_eq!(gateway.count(EntityKind::BlogPost).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_dry_run_reports_conflicts_with_persisted_rows() {
        let real = Arc::new(MemoryTargetRepository::new());
        real.create(&blog("taken")).await.unwrap();

        let gateway = TargetGateway::dry_run(real);
        assert!(matches!(
            gateway.create(&blog("taken")).await,
            Err(TargetError::Conflict { .. })
        ));
    }
}
