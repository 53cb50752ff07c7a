use crate::error::OvsdbError;
use crate::row::Row;
use crate::schema::{AtomicType, ColumnKind, ColumnSchema, TableSchema};
use crate::txn::named_uuid::NamedUuidMap;
use crate::value::{from_wire_untyped, unmarshal_uuid, Atom, Value, COL_UUID, COL_VERSION};
use serde_json::Value as Json;
use tracing::warn;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondFunction {
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    Includes,
    Excludes,
}

impl CondFunction {
    pub fn parse(raw: &str) -> Result<Self, OvsdbError> {
        match raw {
            "<" => Ok(CondFunction::Lt),
            "<=" => Ok(CondFunction::Le),
            "==" => Ok(CondFunction::Eq),
            "!=" => Ok(CondFunction::Ne),
            ">=" => Ok(CondFunction::Ge),
            ">" => Ok(CondFunction::Gt),
            "includes" => Ok(CondFunction::Includes),
            "excludes" => Ok(CondFunction::Excludes),
            other => {
                warn!(function = other, "unknown condition function");
                Err(OvsdbError::ConstraintViolation)
            }
        }
    }

    fn is_equality(self) -> bool {
        matches!(self, CondFunction::Eq | CondFunction::Includes)
    }
}

/// Applies an ordered comparison; every function is meaningful.
fn compare_ord<T: PartialOrd>(function: CondFunction, actual: &T, expected: &T) -> bool {
    match function {
        CondFunction::Eq | CondFunction::Includes => actual == expected,
        CondFunction::Ne | CondFunction::Excludes => actual != expected,
        CondFunction::Gt => actual > expected,
        CondFunction::Ge => actual >= expected,
        CondFunction::Lt => actual < expected,
        CondFunction::Le => actual <= expected,
    }
}

/// Equality-only types: ordered functions never match.
fn compare_eq_only(function: CondFunction, equal: bool) -> bool {
    match function {
        CondFunction::Eq | CondFunction::Includes => equal,
        CondFunction::Ne | CondFunction::Excludes => !equal,
        _ => false,
    }
}

/// One compiled `[column, function, value]` triple. The value has been
/// schema-unmarshaled and named-UUID-resolved; `column_schema` is `None` for
/// the schema-less reserved columns.
#[derive(Debug)]
pub struct Condition<'s> {
    pub column: String,
    pub function: CondFunction,
    pub value: Value,
    column_schema: Option<&'s ColumnSchema>,
}

impl<'s> Condition<'s> {
    pub fn compile(
        table: &'s TableSchema,
        named: &NamedUuidMap,
        raw: &Json,
    ) -> Result<Self, OvsdbError> {
        let Json::Array(parts) = raw else {
            warn!("condition is not an array");
            return Err(OvsdbError::Internal);
        };
        if parts.len() != 3 {
            warn!(len = parts.len(), "condition must have exactly 3 elements");
            return Err(OvsdbError::Internal);
        }
        let Json::String(column) = &parts[0] else {
            warn!("condition column is not a string");
            return Err(OvsdbError::Internal);
        };

        let column_schema = match column.as_str() {
            COL_UUID | COL_VERSION => None,
            name => Some(table.lookup_column(name)?),
        };

        let Json::String(function) = &parts[1] else {
            warn!("condition function is not a string");
            return Err(OvsdbError::Internal);
        };
        let function = CondFunction::parse(function)?;

        let value = match column_schema {
            Some(schema) => schema.unmarshal_json(&parts[2]).map_err(|err| {
                warn!(column = %column, error = %err, "failed to unmarshal condition value");
                OvsdbError::Internal
            })?,
            None if column == COL_UUID => Value::Atom(unmarshal_uuid(&parts[2]).map_err(|err| {
                warn!(error = %err, "failed to unmarshal _uuid condition value");
                OvsdbError::Internal
            })?),
            // `_version` comparisons are rejected at evaluation; keep the
            // raw value as-is so compilation mirrors the reserved handling.
            None => from_wire_untyped(&parts[2]).map_err(|err| {
                warn!(error = %err, "failed to parse _version condition value");
                OvsdbError::Internal
            })?,
        };
        let value = named.resolve_value(value).map_err(|err| {
            warn!(column = %column, error = %err, "failed to resolve condition value");
            OvsdbError::Internal
        })?;

        Ok(Condition {
            column: column.clone(),
            function,
            value,
            column_schema,
        })
    }

    /// Whether the condition selects the row. A column absent from the row
    /// never matches; a present column whose shape contradicts the schema is
    /// a constraint violation.
    pub fn matches(&self, row: &Row) -> Result<bool, OvsdbError> {
        if self.column == COL_VERSION {
            warn!("unsupported field comparison: _version");
            return Err(OvsdbError::ConstraintViolation);
        }
        let Some(actual) = row.get(&self.column) else {
            return Ok(false);
        };
        if self.column == COL_UUID {
            return self.compare_uuid(actual);
        }
        let schema = self.column_schema.ok_or(OvsdbError::Internal)?;
        match schema.kind {
            ColumnKind::Integer => self.compare_integer(actual),
            ColumnKind::Real => self.compare_real(actual),
            ColumnKind::Boolean => self.compare_boolean(actual),
            ColumnKind::String => self.compare_string(actual),
            ColumnKind::Uuid => self.compare_uuid(actual),
            ColumnKind::Enum => self.compare_enum(schema, actual),
            ColumnKind::Set => self.compare_set(actual),
            ColumnKind::Map => self.compare_map(actual),
        }
    }

    fn compare_integer(&self, actual: &Value) -> Result<bool, OvsdbError> {
        match (actual.as_atom(), self.value.as_atom()) {
            (Some(Atom::Integer(a)), Some(Atom::Integer(e))) => {
                Ok(compare_ord(self.function, a, e))
            }
            _ => self.type_mismatch(actual),
        }
    }

    fn compare_real(&self, actual: &Value) -> Result<bool, OvsdbError> {
        match (actual.as_atom(), self.value.as_atom()) {
            (Some(Atom::Real(a)), Some(Atom::Real(e))) => Ok(compare_ord(self.function, a, e)),
            _ => self.type_mismatch(actual),
        }
    }

    fn compare_boolean(&self, actual: &Value) -> Result<bool, OvsdbError> {
        match (actual.as_atom(), self.value.as_atom()) {
            (Some(Atom::Boolean(a)), Some(Atom::Boolean(e))) => {
                Ok(compare_eq_only(self.function, a == e))
            }
            _ => self.type_mismatch(actual),
        }
    }

    fn compare_string(&self, actual: &Value) -> Result<bool, OvsdbError> {
        match (actual.as_atom(), self.value.as_atom()) {
            (Some(Atom::Str(a)), Some(Atom::Str(e))) => {
                Ok(compare_eq_only(self.function, a == e))
            }
            _ => self.type_mismatch(actual),
        }
    }

    fn compare_uuid(&self, actual: &Value) -> Result<bool, OvsdbError> {
        match (actual.as_atom(), self.value.as_atom()) {
            (Some(Atom::Uuid(a)), Some(Atom::Uuid(e))) => {
                Ok(compare_eq_only(self.function, a == e))
            }
            _ => self.type_mismatch(actual),
        }
    }

    fn compare_enum(&self, schema: &ColumnSchema, actual: &Value) -> Result<bool, OvsdbError> {
        match schema.key_type()?.kind {
            AtomicType::String => self.compare_string(actual),
            other => {
                warn!(key_type = ?other, "unsupported enum comparison key type");
                Err(OvsdbError::NotSupported)
            }
        }
    }

    fn compare_set(&self, actual: &Value) -> Result<bool, OvsdbError> {
        match (actual.as_set(), self.value.as_set()) {
            (Some(a), Some(e)) => Ok(compare_eq_only(self.function, a == e)),
            _ => self.type_mismatch(actual),
        }
    }

    fn compare_map(&self, actual: &Value) -> Result<bool, OvsdbError> {
        match (actual.as_map(), self.value.as_map()) {
            (Some(a), Some(e)) => Ok(compare_eq_only(self.function, a == e)),
            _ => self.type_mismatch(actual),
        }
    }

    fn type_mismatch(&self, actual: &Value) -> Result<bool, OvsdbError> {
        warn!(column = %self.column, actual = ?actual, expected = ?self.value,
            "condition value type mismatch");
        Err(OvsdbError::ConstraintViolation)
    }
}

/// Conjunction over a `where` clause; a missing clause matches every row.
pub fn row_matches_where(
    table: &TableSchema,
    named: &NamedUuidMap,
    row: &Row,
    where_clause: Option<&[Json]>,
) -> Result<bool, OvsdbError> {
    let Some(conditions) = where_clause else {
        return Ok(true);
    };
    for raw in conditions {
        let condition = Condition::compile(table, named, raw)?;
        if !condition.matches(row)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Fetch-phase fast path: if any conjunct pins `_uuid` with `==` or
/// `includes` to a concrete UUID, that UUID narrows the backend read to a
/// single key. The first such conjunct wins.
pub fn where_uuid_fast_path(
    table: &TableSchema,
    named: &NamedUuidMap,
    where_clause: Option<&[Json]>,
) -> Result<Option<Uuid>, OvsdbError> {
    let Some(conditions) = where_clause else {
        return Ok(None);
    };
    for raw in conditions {
        let condition = Condition::compile(table, named, raw)?;
        if condition.column != COL_UUID || !condition.function.is_equality() {
            continue;
        }
        if let Value::Atom(Atom::Uuid(uuid)) = condition.value {
            return Ok(Some(uuid));
        }
    }
    Ok(None)
}
