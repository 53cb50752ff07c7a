pub mod column;

pub use column::{AtomicType, BaseType, Cardinality, ColumnKind, ColumnSchema};

use crate::error::OvsdbError;
use crate::row::Row;
use crate::value::{Atom, Value, COL_UUID, COL_VERSION};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: HashMap<String, ColumnSchema>,
}

impl TableSchema {
    pub fn lookup_column(&self, column: &str) -> Result<&ColumnSchema, OvsdbError> {
        self.columns.get(column).ok_or_else(|| {
            warn!(column, "schema does not contain column");
            OvsdbError::ConstraintViolation
        })
    }

    /// Re-types every present column through its schema. The reserved
    /// `_uuid` and `_version` columns are UUID-typed and schema-less.
    pub fn unmarshal_row(&self, row: &mut Row) -> Result<(), OvsdbError> {
        let reserved = BaseType::new(AtomicType::Uuid);
        for (column, value) in row.iter_mut() {
            let current = value.clone();
            *value = match column.as_str() {
                COL_UUID | COL_VERSION => match current {
                    Value::Atom(atom) => Value::Atom(reserved.retype_atom(atom)?),
                    _ => return Err(OvsdbError::ConstraintViolation),
                },
                name => self.lookup_column(name)?.retype(current)?,
            };
        }
        Ok(())
    }

    /// Checks every present column against its schema; missing columns are
    /// not an error. Unknown columns are.
    pub fn validate_row(&self, row: &Row) -> Result<(), OvsdbError> {
        for (column, value) in row.iter() {
            match column.as_str() {
                COL_UUID | COL_VERSION => match value {
                    Value::Atom(Atom::Uuid(_)) => {}
                    _ => return Err(OvsdbError::ConstraintViolation),
                },
                name => self.lookup_column(name)?.validate(value)?,
            }
        }
        Ok(())
    }

    /// Fills columns absent from the row with their type defaults.
    pub fn default_row(&self, row: &mut Row) {
        for (name, column) in &self.columns {
            if !row.contains(name) {
                row.insert(name.clone(), column.default_value());
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSchema {
    pub name: String,
    #[serde(default)]
    pub version: String,
    pub tables: HashMap<String, TableSchema>,
}

/// Registry of database schemas. Populated at startup, then shared
/// read-only across transactions.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    databases: HashMap<String, DatabaseSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, schema: DatabaseSchema) {
        self.databases.insert(schema.name.clone(), schema);
    }

    pub fn database(&self, name: &str) -> Result<&DatabaseSchema, OvsdbError> {
        self.databases.get(name).ok_or_else(|| {
            warn!(database = name, "unknown database");
            OvsdbError::ConstraintViolation
        })
    }

    pub fn table(&self, database: &str, table: &str) -> Result<&TableSchema, OvsdbError> {
        self.database(database)?.tables.get(table).ok_or_else(|| {
            warn!(database, table, "unknown table");
            OvsdbError::ConstraintViolation
        })
    }

    pub fn unmarshal_row(
        &self,
        database: &str,
        table: &str,
        row: &mut Row,
    ) -> Result<(), OvsdbError> {
        self.table(database, table)?.unmarshal_row(row)
    }

    pub fn validate_row(&self, database: &str, table: &str, row: &Row) -> Result<(), OvsdbError> {
        self.table(database, table)?.validate_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::{AtomicType, ColumnSchema, DatabaseSchema, SchemaRegistry, TableSchema};
    use crate::row::Row;
    use crate::value::{Atom, Value};
    use std::collections::HashMap;
    use uuid::Uuid;

    fn simple_registry() -> SchemaRegistry {
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
            version: "0.0.0".to_string(),
            tables,
        });
        registry
    }

    #[test]
    fn default_row_fills_missing_columns() {
        let registry = simple_registry();
        let mut row = Row::new();
        row.insert("key1", Value::Atom(Atom::Str("val1".into())));
        registry
            .table("simple", "table1")
            .unwrap()
            .default_row(&mut row);
        assert_eq!(row.get("key2"), Some(&Value::Atom(Atom::Integer(0))));
        assert_eq!(row.get("key1"), Some(&Value::Atom(Atom::Str("val1".into()))));
    }

    #[test]
    fn validate_rejects_unknown_columns() {
        let registry = simple_registry();
        let mut row = Row::new();
        row.insert("mystery", Value::Atom(Atom::Integer(7)));
        assert!(registry.validate_row("simple", "table1", &row).is_err());
    }

    #[test]
    fn reserved_columns_are_uuid_typed() {
        let registry = simple_registry();
        let mut row = Row::new();
        row.set_uuid(Uuid::nil());
        registry.validate_row("simple", "table1", &row).unwrap();
        row.insert("_uuid", Value::Atom(Atom::Integer(1)));
        assert!(registry.validate_row("simple", "table1", &row).is_err());
    }

    #[test]
    fn unknown_table_is_a_constraint_violation() {
        let registry = simple_registry();
        assert!(registry.table("simple", "nope").is_err());
        assert!(registry.table("nope", "table1").is_err());
    }
}
