//! Diesel-backed target repository.
//!
//! Entities are stored as JSON documents in a single `entities` table with
//! the lookup columns (kind, legacy key, natural key, slug) broken out and
//! indexed. Uniqueness of natural keys and slugs is enforced by the database.

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::sql;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::BigInt;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::models::{EntityRecord, NewEntity};
use super::pool::{SqliteConn, SqlitePool};
use crate::schema::entities;
use crate::target::{
    EntityKind, Lookup, TargetEntity, TargetError, TargetId, TargetRepository, TargetResult,
};

/// Target repository over the SQLite target database.
#[derive(Clone)]
pub struct DieselTargetRepository {
    pool: SqlitePool,
}

impl DieselTargetRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Translate unique index violations into [`TargetError::Conflict`].
    fn write_error(e: DieselError, entity: &TargetEntity) -> TargetError {
        if let DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) = &e {
            let (field, value) = if info.message().contains("slug") {
                ("slug", entity.slug())
            } else {
                ("natural key", entity.natural_key())
            };
            return TargetError::Conflict {
                kind: entity.kind(),
                field,
                value: value.unwrap_or_default().to_string(),
            };
        }
        TargetError::Database(e)
    }

    async fn insert(conn: &mut SqliteConn, entity: &TargetEntity) -> TargetResult<TargetId> {
        let data = serde_json::to_string(entity)?;
        let now = Utc::now().to_rfc3339();

        diesel::insert_into(entities::table)
            .values(NewEntity {
                kind: entity.kind().as_str(),
                legacy_key: entity.legacy_key(),
                natural_key: entity.natural_key(),
                slug: entity.slug(),
                data: &data,
                created_at: &now,
                updated_at: &now,
            })
            .execute(conn)
            .await
            .map_err(|e| Self::write_error(e, entity))?;

        let id = diesel::select(sql::<BigInt>("last_insert_rowid()"))
            .get_result::<i64>(conn)
            .await?;
        Ok(id)
    }

    fn decode(record: EntityRecord) -> TargetResult<TargetEntity> {
        Ok(serde_json::from_str(&record.data)?)
    }
}

#[async_trait]
impl TargetRepository for DieselTargetRepository {
    async fn find(&self, kind: EntityKind, lookup: &Lookup) -> TargetResult<Option<TargetId>> {
        let mut conn = self.pool.get().await?;
        let query = entities::table
            .filter(entities::kind.eq(kind.as_str()))
            .select(entities::id)
            .order(entities::id.asc())
            .into_boxed();

        let query = match lookup {
            Lookup::NaturalKey(v) => query.filter(entities::natural_key.eq(v.clone())),
            Lookup::Legacy(v) => query.filter(entities::legacy_key.eq(v.clone())),
            Lookup::Slug(v) => query.filter(entities::slug.eq(v.clone())),
        };

        Ok(query.first::<i64>(&mut conn).await.optional()?)
    }

    async fn get(&self, kind: EntityKind, id: TargetId) -> TargetResult<Option<TargetEntity>> {
        let mut conn = self.pool.get().await?;
        let record = entities::table
            .filter(entities::id.eq(id))
            .filter(entities::kind.eq(kind.as_str()))
            .select(EntityRecord::as_select())
            .first(&mut conn)
            .await
            .optional()?;

        record.map(Self::decode).transpose()
    }

    async fn create(&self, entity: &TargetEntity) -> TargetResult<TargetId> {
        let mut conn = self.pool.get().await?;
        Self::insert(&mut conn, entity).await
    }

    async fn create_with_children(
        &self,
        parent: &TargetEntity,
        children: &[TargetEntity],
    ) -> TargetResult<(TargetId, Vec<TargetId>)> {
        let mut conn = self.pool.get().await?;

        conn.transaction(|conn| {
            Box::pin(async move {
                let parent_id = Self::insert(conn, parent).await?;
                let mut child_ids = Vec::with_capacity(children.len());
                for child in children {
                    let mut child = child.clone();
                    child.attach_to(parent_id);
                    child_ids.push(Self::insert(conn, &child).await?);
                }
                Ok::<_, TargetError>((parent_id, child_ids))
            })
        })
        .await
    }

    async fn update(&self, id: TargetId, entity: &TargetEntity) -> TargetResult<()> {
        let kind = entity.kind();
        let data = serde_json::to_string(entity)?;
        let now = Utc::now().to_rfc3339();
        let mut conn = self.pool.get().await?;

        let affected = diesel::update(
            entities::table
                .filter(entities::id.eq(id))
                .filter(entities::kind.eq(kind.as_str())),
        )
        .set((
            entities::legacy_key.eq(entity.legacy_key()),
            entities::natural_key.eq(entity.natural_key()),
            entities::slug.eq(entity.slug()),
            entities::data.eq(&data),
            entities::updated_at.eq(&now),
        ))
        .execute(&mut conn)
        .await
        .map_err(|e| Self::write_error(e, entity))?;

        if affected == 0 {
            return Err(TargetError::NotFound { kind, id });
        }
        Ok(())
    }

    async fn count(&self, kind: EntityKind) -> TargetResult<u64> {
        let mut conn = self.pool.get().await?;
        let count: i64 = entities::table
            .filter(entities::kind.eq(kind.as_str()))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count.max(0) as u64)
    }
}
