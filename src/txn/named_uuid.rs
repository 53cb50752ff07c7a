use crate::error::OvsdbError;
use crate::row::Row;
use crate::value::{Atom, OvsMap, OvsSet, Value};
use std::collections::HashMap;
use tracing::{debug, warn};
use uuid::Uuid;

/// Per-transaction mapping from `uuid-name` to a concrete UUID. Populated by
/// `insert` pre-phases; read wherever client values are resolved. Names are
/// unique within one transaction.
#[derive(Debug, Default)]
pub struct NamedUuidMap {
    names: HashMap<String, Uuid>,
}

impl NamedUuidMap {
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn reserve(&mut self, name: &str, uuid: Uuid) -> Result<(), OvsdbError> {
        if self.names.contains_key(name) {
            warn!(name, "duplicate uuid-name");
            return Err(OvsdbError::DuplicateUuidName);
        }
        debug!(name, uuid = %uuid, "reserving named-uuid");
        self.names.insert(name.to_string(), uuid);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Uuid, OvsdbError> {
        self.names.get(name).copied().ok_or_else(|| {
            warn!(name, "unknown uuid-name");
            OvsdbError::ConstraintViolation
        })
    }

    pub fn resolve_atom(&self, atom: Atom) -> Result<Atom, OvsdbError> {
        match atom {
            Atom::Named(name) => self.get(&name).map(Atom::Uuid),
            other => Ok(other),
        }
    }

    /// Rewrites every named-uuid occurrence nested in the value.
    pub fn resolve_value(&self, value: Value) -> Result<Value, OvsdbError> {
        match value {
            Value::Atom(atom) => self.resolve_atom(atom).map(Value::Atom),
            Value::Set(set) => {
                let elems = set
                    .0
                    .into_iter()
                    .map(|a| self.resolve_atom(a))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Set(OvsSet(elems)))
            }
            Value::Map(map) => {
                let mut resolved = OvsMap::default();
                for (k, v) in map.0 {
                    resolved.insert(k, self.resolve_atom(v)?);
                }
                Ok(Value::Map(resolved))
            }
        }
    }

    pub fn resolve_row(&self, row: &mut Row) -> Result<(), OvsdbError> {
        for (_, value) in row.iter_mut() {
            *value = self.resolve_value(value.clone())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::NamedUuidMap;
    use crate::error::OvsdbError;
    use crate::value::{Atom, OvsMap, Value};
    use uuid::Uuid;

    #[test]
    fn reuse_of_a_name_fails() {
        let mut named = NamedUuidMap::default();
        named.reserve("a", Uuid::new_v4()).unwrap();
        assert_eq!(
            named.reserve("a", Uuid::new_v4()),
            Err(OvsdbError::DuplicateUuidName)
        );
    }

    #[test]
    fn map_values_are_resolved_but_keys_are_not() {
        let mut named = NamedUuidMap::default();
        let uuid = Uuid::new_v4();
        named.reserve("row_a", uuid).unwrap();
        let value = Value::Map(OvsMap(vec![(
            Atom::Str("peer".into()),
            Atom::Named("row_a".into()),
        )]));
        let resolved = named.resolve_value(value).unwrap();
        let map = resolved.as_map().unwrap();
        assert_eq!(map.get(&Atom::Str("peer".into())), Some(&Atom::Uuid(uuid)));
    }

    #[test]
    fn unknown_name_is_a_constraint_violation() {
        let named = NamedUuidMap::default();
        assert_eq!(
            named.resolve_atom(Atom::Named("ghost".into())),
            Err(OvsdbError::ConstraintViolation)
        );
    }
}
