use crate::error::OvsdbError;
use crate::row::Row;
use crate::schema::column::{unmarshal_map_delete_operand, validate_map_delete_operand};
use crate::schema::{ColumnKind, ColumnSchema, TableSchema};
use crate::txn::named_uuid::NamedUuidMap;
use crate::value::{Atom, OvsSet, Value, COL_UUID, COL_VERSION};
use serde_json::Value as Json;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutator {
    Sum,
    Difference,
    Product,
    Quotient,
    Remainder,
    Insert,
    Delete,
}

impl Mutator {
    pub fn parse(raw: &str) -> Result<Self, OvsdbError> {
        match raw {
            "+=" => Ok(Mutator::Sum),
            "-=" => Ok(Mutator::Difference),
            "*=" => Ok(Mutator::Product),
            "/=" => Ok(Mutator::Quotient),
            "%=" => Ok(Mutator::Remainder),
            "insert" => Ok(Mutator::Insert),
            "delete" => Ok(Mutator::Delete),
            other => {
                warn!(mutator = other, "unknown mutator");
                Err(OvsdbError::ConstraintViolation)
            }
        }
    }
}

/// One compiled `[column, mutator, value]` triple. The operand has been
/// unmarshaled (mutator-aware for map deletes), named-UUID-resolved, and
/// validated.
#[derive(Debug)]
pub struct Mutation<'s> {
    pub column: String,
    pub mutator: Mutator,
    pub value: Value,
    column_schema: &'s ColumnSchema,
}

impl<'s> Mutation<'s> {
    pub fn compile(
        table: &'s TableSchema,
        named: &NamedUuidMap,
        raw: &Json,
    ) -> Result<Self, OvsdbError> {
        let Json::Array(parts) = raw else {
            warn!("mutation is not an array");
            return Err(OvsdbError::ConstraintViolation);
        };
        if parts.len() != 3 {
            warn!(len = parts.len(), "mutation must have exactly 3 elements");
            return Err(OvsdbError::ConstraintViolation);
        }
        let Json::String(column) = &parts[0] else {
            warn!("mutation column is not a string");
            return Err(OvsdbError::ConstraintViolation);
        };
        let column_schema = table.lookup_column(column)?;

        let Json::String(mutator) = &parts[1] else {
            warn!("mutation mutator is not a string");
            return Err(OvsdbError::ConstraintViolation);
        };
        let mutator = Mutator::parse(mutator)?;

        let map_delete = column_schema.kind == ColumnKind::Map && mutator == Mutator::Delete;
        let unmarshaled = if map_delete {
            unmarshal_map_delete_operand(column_schema, &parts[2])
        } else {
            column_schema.unmarshal_json(&parts[2])
        };
        let value = unmarshaled.map_err(|err| {
            warn!(column = %column, error = %err, "failed to unmarshal mutation value");
            OvsdbError::ConstraintViolation
        })?;

        let value = named.resolve_value(value).map_err(|err| {
            warn!(column = %column, error = %err, "failed to resolve mutation value");
            OvsdbError::ConstraintViolation
        })?;

        let validated = if map_delete {
            validate_map_delete_operand(column_schema, &value)
        } else {
            column_schema.validate(&value)
        };
        validated.map_err(|err| {
            warn!(column = %column, error = %err, "mutation value failed validation");
            OvsdbError::ConstraintViolation
        })?;

        Ok(Mutation {
            column: column.clone(),
            mutator,
            value,
            column_schema,
        })
    }

    /// Applies the mutation in place. Callers work on a copy of the row so a
    /// failing mutation in a group leaves the original untouched.
    pub fn apply(&self, row: &mut Row) -> Result<(), OvsdbError> {
        if self.column == COL_UUID || self.column == COL_VERSION {
            warn!(column = %self.column, "refusing mutation of reserved column");
            return Err(OvsdbError::ConstraintViolation);
        }
        if !self.column_schema.mutable {
            warn!(column = %self.column, "refusing mutation of immutable column");
            return Err(OvsdbError::ConstraintViolation);
        }
        let Some(current) = row.get(&self.column).cloned() else {
            warn!(column = %self.column, "mutation target column missing from row");
            return Err(OvsdbError::ConstraintViolation);
        };
        let mutated = match self.column_schema.kind {
            ColumnKind::Integer => self.mutate_integer(&current)?,
            ColumnKind::Real => self.mutate_real(&current)?,
            ColumnKind::Set => self.mutate_set(&current)?,
            ColumnKind::Map => self.mutate_map(&current)?,
            _ => {
                warn!(column = %self.column, "column type does not support mutation");
                return Err(OvsdbError::ConstraintViolation);
            }
        };
        row.insert(self.column.clone(), mutated);
        Ok(())
    }

    fn mutate_integer(&self, current: &Value) -> Result<Value, OvsdbError> {
        let (Some(Atom::Integer(original)), Some(Atom::Integer(operand))) =
            (current.as_atom(), self.value.as_atom())
        else {
            warn!(column = %self.column, "integer mutation on non-integer value");
            return Err(OvsdbError::ConstraintViolation);
        };
        let mutated = match self.mutator {
            Mutator::Sum => original.checked_add(*operand),
            Mutator::Difference => original.checked_sub(*operand),
            Mutator::Product => original.checked_mul(*operand),
            Mutator::Quotient => {
                if *operand == 0 {
                    warn!(column = %self.column, "integer division by zero");
                    return Err(OvsdbError::DomainError);
                }
                original.checked_div(*operand)
            }
            Mutator::Remainder => {
                if *operand == 0 {
                    warn!(column = %self.column, "integer modulo by zero");
                    return Err(OvsdbError::DomainError);
                }
                original.checked_rem(*operand)
            }
            Mutator::Insert | Mutator::Delete => {
                warn!(column = %self.column, "collection mutator on integer column");
                return Err(OvsdbError::ConstraintViolation);
            }
        };
        mutated.map(|v| Value::Atom(Atom::Integer(v))).ok_or_else(|| {
            warn!(column = %self.column, "integer mutation out of range");
            OvsdbError::RangeError
        })
    }

    fn mutate_real(&self, current: &Value) -> Result<Value, OvsdbError> {
        let (Some(Atom::Real(original)), Some(Atom::Real(operand))) =
            (current.as_atom(), self.value.as_atom())
        else {
            warn!(column = %self.column, "real mutation on non-real value");
            return Err(OvsdbError::ConstraintViolation);
        };
        let mutated = match self.mutator {
            Mutator::Sum => original + operand,
            Mutator::Difference => original - operand,
            Mutator::Product => original * operand,
            Mutator::Quotient => {
                if *operand == 0.0 {
                    warn!(column = %self.column, "real division by zero");
                    return Err(OvsdbError::DomainError);
                }
                original / operand
            }
            // `%=` is integer-only.
            Mutator::Remainder | Mutator::Insert | Mutator::Delete => {
                warn!(column = %self.column, mutator = ?self.mutator,
                    "unsupported mutator on real column");
                return Err(OvsdbError::ConstraintViolation);
            }
        };
        if !mutated.is_finite() {
            warn!(column = %self.column, "real mutation out of range");
            return Err(OvsdbError::RangeError);
        }
        Ok(Value::Atom(Atom::Real(mutated)))
    }

    fn mutate_set(&self, current: &Value) -> Result<Value, OvsdbError> {
        let (Some(original), Some(operand)) = (current.as_set(), self.value.as_set()) else {
            warn!(column = %self.column, "set mutation on non-set value");
            return Err(OvsdbError::ConstraintViolation);
        };
        match self.mutator {
            Mutator::Insert => {
                let mut mutated = original.clone();
                for atom in &operand.0 {
                    if !mutated.contains(atom) {
                        mutated.0.push(atom.clone());
                    }
                }
                Ok(Value::Set(mutated))
            }
            Mutator::Delete => {
                let kept = original
                    .0
                    .iter()
                    .filter(|atom| !operand.contains(atom))
                    .cloned()
                    .collect();
                Ok(Value::Set(OvsSet(kept)))
            }
            _ => {
                warn!(column = %self.column, mutator = ?self.mutator,
                    "unsupported mutator on set column");
                Err(OvsdbError::ConstraintViolation)
            }
        }
    }

    fn mutate_map(&self, current: &Value) -> Result<Value, OvsdbError> {
        let Some(original) = current.as_map() else {
            warn!(column = %self.column, "map mutation on non-map value");
            return Err(OvsdbError::ConstraintViolation);
        };
        match (self.mutator, &self.value) {
            (Mutator::Insert, Value::Map(operand)) => {
                let mut mutated = original.clone();
                for (k, v) in &operand.0 {
                    mutated.insert(k.clone(), v.clone());
                }
                Ok(Value::Map(mutated))
            }
            (Mutator::Delete, Value::Map(operand)) => {
                let mut mutated = original.clone();
                for (k, v) in &operand.0 {
                    if mutated.get(k) == Some(v) {
                        mutated.remove(k);
                    }
                }
                Ok(Value::Map(mutated))
            }
            (Mutator::Delete, Value::Set(keys)) => {
                let mut mutated = original.clone();
                for key in &keys.0 {
                    mutated.remove(key);
                }
                Ok(Value::Map(mutated))
            }
            _ => {
                warn!(column = %self.column, mutator = ?self.mutator,
                    "unsupported mutator on map column");
                Err(OvsdbError::ConstraintViolation)
            }
        }
    }
}

/// Compiles and applies a mutation group to a working copy of the row; the
/// copy replaces the original only if every mutation succeeds and every
/// touched column still satisfies its schema.
pub fn apply_all(
    table: &TableSchema,
    named: &NamedUuidMap,
    row: &mut Row,
    mutations: &[Json],
) -> Result<(), OvsdbError> {
    let mut working = row.clone();
    let mut touched = Vec::with_capacity(mutations.len());
    for raw in mutations {
        let mutation = Mutation::compile(table, named, raw)?;
        mutation.apply(&mut working)?;
        touched.push(mutation.column);
    }
    for column in &touched {
        let column_schema = table.lookup_column(column)?;
        let value = working.get(column).ok_or(OvsdbError::Internal)?;
        column_schema.validate(value).map_err(|err| {
            warn!(column = %column, error = %err, "mutated column failed validation");
            OvsdbError::ConstraintViolation
        })?;
    }
    *row = working;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::apply_all;
    use crate::error::OvsdbError;
    use crate::row::Row;
    use crate::schema::{AtomicType, BaseType, Cardinality, ColumnSchema, TableSchema};
    use crate::txn::named_uuid::NamedUuidMap;
    use crate::value::{Atom, OvsMap, OvsSet, Value};
    use serde_json::json;
    use std::collections::HashMap;

    fn table() -> TableSchema {
        let mut columns = HashMap::new();
        columns.insert(
            "count".to_string(),
            ColumnSchema::atomic(AtomicType::Integer),
        );
        columns.insert("load".to_string(), ColumnSchema::atomic(AtomicType::Real));
        columns.insert(
            "tags".to_string(),
            ColumnSchema::set_of(
                BaseType::new(AtomicType::String),
                0,
                Cardinality::Unlimited,
            ),
        );
        columns.insert(
            "options".to_string(),
            ColumnSchema::map_of(
                BaseType::new(AtomicType::String),
                BaseType::new(AtomicType::String),
                0,
                Cardinality::Unlimited,
            ),
        );
        columns.insert(
            "pinned".to_string(),
            ColumnSchema::atomic(AtomicType::Integer).immutable(),
        );
        TableSchema { columns }
    }

    fn row() -> Row {
        let mut row = Row::new();
        row.insert("count", Value::Atom(Atom::Integer(10)));
        row.insert("load", Value::Atom(Atom::Real(1.5)));
        row.insert(
            "tags",
            Value::Set(OvsSet(vec![Atom::Str("a".into()), Atom::Str("b".into())])),
        );
        row.insert(
            "options",
            Value::Map(OvsMap(vec![
                (Atom::Str("mtu".into()), Atom::Str("1500".into())),
                (Atom::Str("mac".into()), Atom::Str("aa".into())),
            ])),
        );
        row.insert("pinned", Value::Atom(Atom::Integer(0)));
        row
    }

    #[test]
    fn arithmetic_mutators_apply_in_order() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        apply_all(
            &table,
            &named,
            &mut row,
            &[json!(["count", "+=", 5]), json!(["count", "*=", 2])],
        )
        .unwrap();
        assert_eq!(row.get("count"), Some(&Value::Atom(Atom::Integer(30))));
    }

    #[test]
    fn division_by_zero_is_a_domain_error() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        assert_eq!(
            apply_all(&table, &named, &mut row, &[json!(["count", "/=", 0])]),
            Err(OvsdbError::DomainError)
        );
        assert_eq!(
            apply_all(&table, &named, &mut row, &[json!(["count", "%=", 0])]),
            Err(OvsdbError::DomainError)
        );
    }

    #[test]
    fn remainder_is_integer_only() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        assert_eq!(
            apply_all(&table, &named, &mut row, &[json!(["load", "%=", 2.0])]),
            Err(OvsdbError::ConstraintViolation)
        );
    }

    #[test]
    fn overflow_is_a_range_error() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        apply_all(&table, &named, &mut row, &[json!(["count", "+=", i64::MAX - 10])]).unwrap();
        assert_eq!(
            apply_all(&table, &named, &mut row, &[json!(["count", "+=", 1])]),
            Err(OvsdbError::RangeError)
        );
    }

    #[test]
    fn failed_group_leaves_the_row_untouched() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        let before = row.clone();
        let result = apply_all(
            &table,
            &named,
            &mut row,
            &[json!(["count", "+=", 1]), json!(["count", "/=", 0])],
        );
        assert!(result.is_err());
        assert_eq!(row, before);
    }

    #[test]
    fn set_insert_unions_and_delete_subtracts() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        apply_all(
            &table,
            &named,
            &mut row,
            &[json!(["tags", "insert", ["set", ["b", "c"]]])],
        )
        .unwrap();
        let tags = row.get("tags").unwrap().as_set().unwrap();
        assert_eq!(tags.len(), 3);

        apply_all(
            &table,
            &named,
            &mut row,
            &[json!(["tags", "delete", ["set", ["a", "zz"]]])],
        )
        .unwrap();
        let tags = row.get("tags").unwrap().as_set().unwrap();
        assert_eq!(tags.len(), 2);
        assert!(!tags.contains(&Atom::Str("a".into())));
    }

    #[test]
    fn map_insert_overwrites_and_delete_requires_equal_value() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        apply_all(
            &table,
            &named,
            &mut row,
            &[json!(["options", "insert", ["map", [["mtu", "9000"]]]])],
        )
        .unwrap();
        let options = row.get("options").unwrap().as_map().unwrap();
        assert_eq!(
            options.get(&Atom::Str("mtu".into())),
            Some(&Atom::Str("9000".into()))
        );

        // value mismatch: entry is kept
        apply_all(
            &table,
            &named,
            &mut row,
            &[json!(["options", "delete", ["map", [["mtu", "1500"]]]])],
        )
        .unwrap();
        assert!(row
            .get("options")
            .unwrap()
            .as_map()
            .unwrap()
            .get(&Atom::Str("mtu".into()))
            .is_some());

        // delete by key set
        apply_all(
            &table,
            &named,
            &mut row,
            &[json!(["options", "delete", ["set", ["mtu", "mac"]]])],
        )
        .unwrap();
        assert!(row.get("options").unwrap().as_map().unwrap().is_empty());
    }

    #[test]
    fn immutable_and_reserved_columns_refuse_mutation() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = row();
        assert_eq!(
            apply_all(&table, &named, &mut row, &[json!(["pinned", "+=", 1])]),
            Err(OvsdbError::ConstraintViolation)
        );
        assert_eq!(
            apply_all(&table, &named, &mut row, &[json!(["_uuid", "+=", 1])]),
            Err(OvsdbError::ConstraintViolation)
        );
    }

    #[test]
    fn missing_target_column_is_a_constraint_violation() {
        let table = table();
        let named = NamedUuidMap::default();
        let mut row = Row::new();
        assert_eq!(
            apply_all(&table, &named, &mut row, &[json!(["count", "+=", 1])]),
            Err(OvsdbError::ConstraintViolation)
        );
    }
}
