//! Diesel row types.

use diesel::prelude::*;

use crate::schema;

/// Entity row from the database.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::entities)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntityRecord {
    pub id: i64,
    pub kind: String,
    pub legacy_key: Option<String>,
    pub natural_key: Option<String>,
    pub slug: Option<String>,
    pub data: String,
    pub created_at: String,
    pub updated_at: String,
}

/// New entity for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::entities)]
pub struct NewEntity<'a> {
    pub kind: &'a str,
    pub legacy_key: Option<&'a str>,
    pub natural_key: Option<&'a str>,
    pub slug: Option<&'a str>,
    pub data: &'a str,
    pub created_at: &'a str,
    pub updated_at: &'a str,
}

/// Mapping entry for insertion or replacement.
#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = schema::migration_mappings)]
pub struct NewMapping {
    pub key: String,
    pub target_id: i64,
    pub expires_at: i64,
}

#[derive(Insertable, Debug)]
#[diesel(table_name = schema::storage_meta)]
pub struct NewStorageMeta<'a> {
    pub key: &'a str,
    pub value: &'a str,
}
