// Diesel table definitions for the target database.
// Kept in sync with src/repository/schema_sqlite.sql by hand.

diesel::table! {
    entities (id) {
        id -> BigInt,
        kind -> Text,
        legacy_key -> Nullable<Text>,
        natural_key -> Nullable<Text>,
        slug -> Nullable<Text>,
        data -> Text,
        created_at -> Text,
        updated_at -> Text,
    }
}

diesel::table! {
    migration_mappings (key) {
        key -> Text,
        target_id -> BigInt,
        expires_at -> BigInt,
    }
}

diesel::table! {
    storage_meta (key) {
        key -> Text,
        value -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(entities, migration_mappings, storage_meta);
