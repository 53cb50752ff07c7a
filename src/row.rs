use crate::error::OvsdbError;
use crate::schema::TableSchema;
use crate::txn::named_uuid::NamedUuidMap;
use crate::value::{from_wire_untyped, Atom, Value, COL_UUID, COL_VERSION};
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use tracing::warn;
use uuid::Uuid;

/// A row: an unordered mapping from column name to typed value. Kept sorted
/// internally so wire serialization is deterministic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    pub fn contains(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.columns.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut Value)> {
        self.columns.iter_mut()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        match self.columns.get(COL_UUID) {
            Some(Value::Atom(Atom::Uuid(uuid))) => Some(*uuid),
            _ => None,
        }
    }

    pub fn set_uuid(&mut self, uuid: Uuid) {
        self.columns
            .insert(COL_UUID.to_string(), Value::Atom(Atom::Uuid(uuid)));
    }

    /// Untyped parse of a wire JSON object; schema re-typing happens later.
    pub fn from_wire(map: &Map<String, Json>) -> Result<Self, OvsdbError> {
        let mut row = Row::new();
        for (column, raw) in map {
            row.insert(column.clone(), from_wire_untyped(raw)?);
        }
        Ok(row)
    }

    pub fn to_wire(&self) -> Map<String, Json> {
        self.columns
            .iter()
            .map(|(k, v)| (k.clone(), v.to_wire()))
            .collect()
    }

    /// Deterministic backend value bytes: sorted columns, sorted collection
    /// elements.
    pub fn to_wire_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&Json::Object(self.to_wire())).unwrap_or_default()
    }
}

/// Prepares a client-provided row for the engine: schema unmarshal, then
/// named-UUID resolution, then schema validation. Any failure is a
/// constraint violation.
pub fn prepare(
    table: &TableSchema,
    named: &NamedUuidMap,
    row: &mut Row,
) -> Result<(), OvsdbError> {
    table.unmarshal_row(row).map_err(|err| {
        warn!(error = %err, "row unmarshal failed");
        OvsdbError::ConstraintViolation
    })?;
    named.resolve_row(row).map_err(|err| {
        warn!(error = %err, "named-uuid resolution failed");
        OvsdbError::ConstraintViolation
    })?;
    table.validate_row(row).map_err(|err| {
        warn!(error = %err, "row validation failed");
        OvsdbError::ConstraintViolation
    })?;
    Ok(())
}

/// Applies a prepared update row column-by-column, enforcing column
/// existence, mutability, and the reserved-column guard.
pub fn update(table: &TableSchema, row: &mut Row, update: &Row) -> Result<(), OvsdbError> {
    for (column, value) in update.iter() {
        let column_schema = table.lookup_column(column)?;
        if column == COL_UUID || column == COL_VERSION {
            warn!(column, "refusing update of reserved column");
            return Err(OvsdbError::ConstraintViolation);
        }
        if !column_schema.mutable {
            warn!(column, "refusing update of immutable column");
            return Err(OvsdbError::ConstraintViolation);
        }
        row.insert(column.clone(), value.clone());
    }
    Ok(())
}

/// Reduces a row to the requested columns; no column list keeps the row
/// intact. Requested columns absent from the row are skipped.
pub fn project(row: &Row, columns: Option<&[String]>) -> Row {
    let Some(columns) = columns else {
        return row.clone();
    };
    let mut projected = Row::new();
    for column in columns {
        if let Some(value) = row.get(column) {
            projected.insert(column.clone(), value.clone());
        }
    }
    projected
}

/// Schema-driven row comparison for `wait`: every column of `expected` must
/// be present in `actual` and structurally equal under the column's type.
pub fn rows_equal_by_schema(
    table: &TableSchema,
    expected: &Row,
    actual: &Row,
) -> Result<bool, OvsdbError> {
    for (column, expected_value) in expected.iter() {
        table.lookup_column(column)?;
        let Some(actual_value) = actual.get(column) else {
            return Ok(false);
        };
        if expected_value != actual_value {
            return Ok(false);
        }
    }
    Ok(true)
}
