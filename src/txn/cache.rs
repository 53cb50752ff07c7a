use crate::error::OvsdbError;
use crate::kv::key::{DataKey, KeyCodec, COMMENT_TABLE};
use crate::kv::{KvOpResponse, KvTxnResponse};
use crate::row::Row;
use crate::schema::SchemaRegistry;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

pub type TableCache = BTreeMap<String, Row>;
pub type DatabaseCache = BTreeMap<String, TableCache>;

/// Transaction-local snapshot of backend rows: database → table → uuid →
/// row. Levels are created lazily; the whole cache is dropped at transaction
/// end.
#[derive(Debug, Default)]
pub struct Cache {
    databases: BTreeMap<String, DatabaseCache>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, database: &str, table: &str) -> Option<&TableCache> {
        self.databases.get(database).and_then(|db| db.get(table))
    }

    pub fn table_mut(&mut self, database: &str, table: &str) -> &mut TableCache {
        self.databases
            .entry(database.to_string())
            .or_default()
            .entry(table.to_string())
            .or_default()
    }

    /// Returns the row for `key`, creating an empty one on first reference.
    pub fn row_mut(&mut self, key: &DataKey) -> &mut Row {
        self.table_mut(&key.database, &key.table)
            .entry(key.uuid.clone())
            .or_default()
    }

    pub fn set_row(&mut self, key: &DataKey, row: Row) {
        self.table_mut(&key.database, &key.table)
            .insert(key.uuid.clone(), row);
    }

    /// Walks every range response of a submitted backend transaction and
    /// assigns the parsed rows by key. Comment keys are skipped; they hold
    /// raw strings, not rows.
    pub fn ingest(
        &mut self,
        codec: &KeyCodec,
        response: &KvTxnResponse,
    ) -> Result<(), OvsdbError> {
        for op_response in &response.responses {
            let KvOpResponse::Range { pairs } = op_response else {
                continue;
            };
            for pair in pairs {
                let key = codec.parse(&pair.key)?;
                if key.table == COMMENT_TABLE {
                    continue;
                }
                let raw: Json = serde_json::from_slice(&pair.value).map_err(|err| {
                    warn!(key = %pair.key, error = %err, "backend value is not valid JSON");
                    OvsdbError::Internal
                })?;
                let Json::Object(map) = raw else {
                    warn!(key = %pair.key, "backend value is not a JSON object");
                    return Err(OvsdbError::Internal);
                };
                let row = Row::from_wire(&map).map_err(|err| {
                    warn!(key = %pair.key, error = %err, "backend row failed to parse");
                    OvsdbError::Internal
                })?;
                *self.row_mut(&key) = row;
            }
        }
        Ok(())
    }

    /// Re-types every cached row through its table schema. Runs after each
    /// backend round-trip; failure means backend/schema drift.
    pub fn unmarshal(&mut self, schemas: &SchemaRegistry) -> Result<(), OvsdbError> {
        for (database, tables) in &mut self.databases {
            for (table, rows) in tables {
                for row in rows.values_mut() {
                    schemas.unmarshal_row(database, table, row).map_err(|err| {
                        warn!(database = %database, table = %table, error = %err,
                            "cached row failed schema unmarshal");
                        OvsdbError::ReferentialIntegrity
                    })?;
                }
            }
        }
        Ok(())
    }

    /// Asserts that every cached row satisfies its table schema and that its
    /// `_uuid` column matches its cache key.
    pub fn validate(&self, schemas: &SchemaRegistry) -> Result<(), OvsdbError> {
        for (database, tables) in &self.databases {
            for (table, rows) in tables {
                for (uuid, row) in rows {
                    schemas.validate_row(database, table, row).map_err(|err| {
                        warn!(database = %database, table = %table, error = %err,
                            "cached row failed schema validation");
                        OvsdbError::ReferentialIntegrity
                    })?;
                    if let Some(row_uuid) = row.uuid() {
                        let key_uuid = Uuid::parse_str(uuid).ok();
                        if key_uuid != Some(row_uuid) {
                            warn!(database = %database, table = %table, key = %uuid,
                                row_uuid = %row_uuid, "row _uuid does not match its key");
                            return Err(OvsdbError::ReferentialIntegrity);
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Cache;
    use crate::kv::key::{DataKey, KeyCodec};
    use crate::kv::{KvOpResponse, KvPair, KvTxnResponse};
    use crate::row::Row;
    use crate::schema::{AtomicType, ColumnSchema, DatabaseSchema, SchemaRegistry, TableSchema};
    use crate::value::{Atom, Value};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn registry() -> SchemaRegistry {
        let mut columns = HashMap::new();
        columns.insert("key1".to_string(), ColumnSchema::atomic(AtomicType::String));
        columns.insert(
            "key2".to_string(),
            ColumnSchema::atomic(AtomicType::Integer),
        );
        let mut tables = HashMap::new();
        tables.insert("table1".to_string(), TableSchema { columns });
        let mut registry = SchemaRegistry::new();
        registry.add(DatabaseSchema {
            name: "simple".to_string(),
            version: String::new(),
            tables,
        });
        registry
    }

    fn range_response(pairs: Vec<KvPair>) -> KvTxnResponse {
        KvTxnResponse {
            succeeded: true,
            responses: vec![KvOpResponse::Range { pairs }],
            revision: 1,
        }
    }

    #[test]
    fn ingest_then_unmarshal_retypes_rows() {
        let codec = KeyCodec::new("ovsdb");
        let uuid = Uuid::new_v4();
        let value = serde_json::json!({
            "key1": "val1",
            "key2": 3,
            "_uuid": ["uuid", uuid.to_string()],
        });
        let mut cache = Cache::new();
        cache
            .ingest(
                &codec,
                &range_response(vec![KvPair {
                    key: codec.data_key("simple", "table1", &uuid.to_string()),
                    value: serde_json::to_vec(&value).unwrap(),
                }]),
            )
            .unwrap();
        let registry = registry();
        cache.unmarshal(&registry).unwrap();
        cache.validate(&registry).unwrap();

        let table = cache.table("simple", "table1").unwrap();
        let row = table.get(&uuid.to_string()).unwrap();
        assert_eq!(row.get("key2"), Some(&Value::Atom(Atom::Integer(3))));
        assert_eq!(row.uuid(), Some(uuid));
    }

    #[test]
    fn mismatched_row_uuid_fails_validation() {
        let registry = registry();
        let mut cache = Cache::new();
        let key = DataKey {
            database: "simple".to_string(),
            table: "table1".to_string(),
            uuid: Uuid::new_v4().to_string(),
        };
        let mut row = Row::new();
        row.set_uuid(Uuid::new_v4());
        cache.set_row(&key, row);
        assert!(cache.validate(&registry).is_err());
    }

    #[test]
    fn row_mut_creates_lazily_and_aliases() {
        let mut cache = Cache::new();
        let key = DataKey {
            database: "simple".to_string(),
            table: "table1".to_string(),
            uuid: "u1".to_string(),
        };
        cache
            .row_mut(&key)
            .insert("key1", Value::Atom(Atom::Str("a".into())));
        assert_eq!(
            cache.row_mut(&key).get("key1"),
            Some(&Value::Atom(Atom::Str("a".into())))
        );
    }
}
