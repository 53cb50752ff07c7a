use crate::error::OvsdbError;
use serde_json::{json, Value as Json};
use std::cmp::Ordering;
use uuid::Uuid;

pub const COL_UUID: &str = "_uuid";
pub const COL_VERSION: &str = "_version";

/// Atomic row value. `Named` is a per-transaction `named-uuid` placeholder
/// and is illegal in any row written to the backend.
#[derive(Debug, Clone)]
pub enum Atom {
    Integer(i64),
    Real(f64),
    Boolean(bool),
    Str(String),
    Uuid(Uuid),
    Named(String),
}

impl Atom {
    fn kind_rank(&self) -> u8 {
        match self {
            Atom::Boolean(_) => 0,
            Atom::Integer(_) => 1,
            Atom::Real(_) => 2,
            Atom::Str(_) => 3,
            Atom::Uuid(_) => 4,
            Atom::Named(_) => 5,
        }
    }

    pub fn to_wire(&self) -> Json {
        match self {
            Atom::Integer(v) => Json::from(*v),
            Atom::Real(v) => serde_json::Number::from_f64(*v)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Atom::Boolean(v) => Json::Bool(*v),
            Atom::Str(s) => Json::String(s.clone()),
            Atom::Uuid(u) => json!(["uuid", u.to_string()]),
            Atom::Named(n) => json!(["named-uuid", n]),
        }
    }
}

impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Atom {}

impl PartialOrd for Atom {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Atom {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }
        match (self, other) {
            (Atom::Boolean(a), Atom::Boolean(b)) => a.cmp(b),
            (Atom::Integer(a), Atom::Integer(b)) => a.cmp(b),
            (Atom::Real(a), Atom::Real(b)) => a.total_cmp(b),
            (Atom::Str(a), Atom::Str(b)) => a.cmp(b),
            (Atom::Uuid(a), Atom::Uuid(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Atom::Named(a), Atom::Named(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// Unordered multiset of atoms. Equality is two-sided inclusion by
/// structural equality; duplicates are ignored.
#[derive(Debug, Clone, Default)]
pub struct OvsSet(pub Vec<Atom>);

impl OvsSet {
    pub fn contains(&self, atom: &Atom) -> bool {
        self.0.iter().any(|a| a == atom)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for OvsSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.iter().all(|a| other.contains(a)) && other.0.iter().all(|a| self.contains(a))
    }
}

impl Eq for OvsSet {}

/// Map from atom keys to atom values. Equality is two-sided inclusion with
/// structural value equality; key order is irrelevant.
#[derive(Debug, Clone, Default)]
pub struct OvsMap(pub Vec<(Atom, Atom)>);

impl OvsMap {
    pub fn get(&self, key: &Atom) -> Option<&Atom> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Inserts an entry, overwriting any existing value for the key.
    pub fn insert(&mut self, key: Atom, value: Atom) {
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            self.0.push((key, value));
        }
    }

    pub fn remove(&mut self, key: &Atom) {
        self.0.retain(|(k, _)| k != key);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl PartialEq for OvsMap {
    fn eq(&self, other: &Self) -> bool {
        self.0.iter().all(|(k, v)| other.get(k) == Some(v))
            && other.0.iter().all(|(k, v)| self.get(k) == Some(v))
    }
}

impl Eq for OvsMap {}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Atom(Atom),
    Set(OvsSet),
    Map(OvsMap),
}

impl Value {
    pub fn as_atom(&self) -> Option<&Atom> {
        match self {
            Value::Atom(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_set(&self) -> Option<&OvsSet> {
        match self {
            Value::Set(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&OvsMap> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// OVSDB wire JSON. Sets and maps are emitted sorted so that rows
    /// serialize deterministically.
    pub fn to_wire(&self) -> Json {
        match self {
            Value::Atom(a) => a.to_wire(),
            Value::Set(s) => {
                let mut elems = s.0.clone();
                elems.sort();
                elems.dedup();
                json!(["set", elems.iter().map(Atom::to_wire).collect::<Vec<_>>()])
            }
            Value::Map(m) => {
                let mut entries = m.0.clone();
                entries.sort_by(|(a, _), (b, _)| a.cmp(b));
                json!([
                    "map",
                    entries
                        .iter()
                        .map(|(k, v)| json!([k.to_wire(), v.to_wire()]))
                        .collect::<Vec<_>>()
                ])
            }
        }
    }
}

/// Parses an atom from its wire form: a JSON scalar or a tagged
/// `["uuid", …]` / `["named-uuid", …]` pair.
pub fn atom_from_wire(raw: &Json) -> Result<Atom, OvsdbError> {
    match raw {
        Json::Bool(b) => Ok(Atom::Boolean(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Atom::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Atom::Real(f))
            } else {
                Err(OvsdbError::ConstraintViolation)
            }
        }
        Json::String(s) => Ok(Atom::Str(s.clone())),
        Json::Array(pair) if pair.len() == 2 => match (&pair[0], &pair[1]) {
            (Json::String(tag), Json::String(v)) if tag == "uuid" => Uuid::parse_str(v)
                .map(Atom::Uuid)
                .map_err(|_| OvsdbError::ConstraintViolation),
            (Json::String(tag), Json::String(v)) if tag == "named-uuid" => {
                Ok(Atom::Named(v.clone()))
            }
            _ => Err(OvsdbError::ConstraintViolation),
        },
        _ => Err(OvsdbError::ConstraintViolation),
    }
}

/// Best-effort wire JSON parse without a column schema, used when rows come
/// back from the backend. The schema-driven retype pass runs afterwards.
pub fn from_wire_untyped(raw: &Json) -> Result<Value, OvsdbError> {
    if let Json::Array(arr) = raw {
        if arr.len() != 2 {
            return Err(OvsdbError::ConstraintViolation);
        }
        let Json::String(tag) = &arr[0] else {
            return Err(OvsdbError::ConstraintViolation);
        };
        match tag.as_str() {
            "set" => {
                let Json::Array(elems) = &arr[1] else {
                    return Err(OvsdbError::ConstraintViolation);
                };
                let atoms = elems
                    .iter()
                    .map(atom_from_wire)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::Set(OvsSet(atoms)))
            }
            "map" => {
                let Json::Array(entries) = &arr[1] else {
                    return Err(OvsdbError::ConstraintViolation);
                };
                let mut map = OvsMap::default();
                for entry in entries {
                    let Json::Array(kv) = entry else {
                        return Err(OvsdbError::ConstraintViolation);
                    };
                    if kv.len() != 2 {
                        return Err(OvsdbError::ConstraintViolation);
                    }
                    map.insert(atom_from_wire(&kv[0])?, atom_from_wire(&kv[1])?);
                }
                Ok(Value::Map(map))
            }
            "uuid" | "named-uuid" => atom_from_wire(raw).map(Value::Atom),
            _ => Err(OvsdbError::ConstraintViolation),
        }
    } else {
        atom_from_wire(raw).map(Value::Atom)
    }
}

/// Parses a UUID reference: the tagged pair form, or a bare string holding a
/// canonical UUID. Produces `Atom::Uuid` or `Atom::Named`.
pub fn unmarshal_uuid(raw: &Json) -> Result<Atom, OvsdbError> {
    match raw {
        Json::String(s) => Uuid::parse_str(s)
            .map(Atom::Uuid)
            .map_err(|_| OvsdbError::ConstraintViolation),
        Json::Array(_) => match atom_from_wire(raw)? {
            a @ (Atom::Uuid(_) | Atom::Named(_)) => Ok(a),
            _ => Err(OvsdbError::ConstraintViolation),
        },
        _ => Err(OvsdbError::ConstraintViolation),
    }
}

#[cfg(test)]
mod tests {
    use super::{atom_from_wire, from_wire_untyped, Atom, OvsMap, OvsSet, Value};
    use proptest::prelude::*;
    use serde_json::json;
    use uuid::Uuid;

    fn arb_atom() -> impl Strategy<Value = Atom> {
        prop_oneof![
            any::<bool>().prop_map(Atom::Boolean),
            any::<i64>().prop_map(Atom::Integer),
            any::<f64>()
                .prop_filter("finite float only", |v| v.is_finite())
                .prop_map(Atom::Real),
            "\\PC{0,16}".prop_map(Atom::Str),
            prop::array::uniform16(any::<u8>()).prop_map(|b| Atom::Uuid(Uuid::from_bytes(b))),
        ]
    }

    proptest! {
        #[test]
        fn set_equality_is_reflexive(elems in prop::collection::vec(arb_atom(), 0..8)) {
            let set = OvsSet(elems);
            prop_assert_eq!(&set, &set);
        }

        #[test]
        fn set_equality_ignores_order_and_duplicates(
            elems in prop::collection::vec(arb_atom(), 0..8),
            seed in any::<usize>(),
        ) {
            let set = OvsSet(elems.clone());
            let mut shuffled = elems.clone();
            if !shuffled.is_empty() {
                let len = shuffled.len();
                shuffled.rotate_left(seed % len);
            }
            if let Some(first) = elems.first() {
                shuffled.push(first.clone());
            }
            prop_assert_eq!(OvsSet(shuffled), set);
        }

        #[test]
        fn atom_ordering_is_total(a in arb_atom(), b in arb_atom(), c in arb_atom()) {
            use std::cmp::Ordering;
            prop_assert_eq!(a.cmp(&a), Ordering::Equal);
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
            if a.cmp(&b) == Ordering::Less && b.cmp(&c) == Ordering::Less {
                prop_assert_eq!(a.cmp(&c), Ordering::Less);
            }
        }
    }

    #[test]
    fn map_equality_ignores_entry_order() {
        let a = OvsMap(vec![
            (Atom::Str("x".into()), Atom::Integer(1)),
            (Atom::Str("y".into()), Atom::Integer(2)),
        ]);
        let b = OvsMap(vec![
            (Atom::Str("y".into()), Atom::Integer(2)),
            (Atom::Str("x".into()), Atom::Integer(1)),
        ]);
        assert_eq!(a, b);
    }

    #[test]
    fn map_equality_requires_both_directions() {
        let a = OvsMap(vec![(Atom::Str("x".into()), Atom::Integer(1))]);
        let b = OvsMap(vec![
            (Atom::Str("x".into()), Atom::Integer(1)),
            (Atom::Str("y".into()), Atom::Integer(2)),
        ]);
        assert_ne!(a, b);
        assert_ne!(b, a);
    }

    #[test]
    fn wire_roundtrip_preserves_tagged_forms() {
        let uuid = Uuid::parse_str("36bef046-7da7-43a5-905a-c17899216fcb").unwrap();
        let value = Value::Set(OvsSet(vec![Atom::Uuid(uuid), Atom::Str("a".into())]));
        let wire = value.to_wire();
        assert_eq!(from_wire_untyped(&wire).unwrap(), value);
    }

    #[test]
    fn wire_set_serialization_is_deterministic() {
        let a = Value::Set(OvsSet(vec![Atom::Str("b".into()), Atom::Str("a".into())]));
        let b = Value::Set(OvsSet(vec![Atom::Str("a".into()), Atom::Str("b".into())]));
        assert_eq!(a.to_wire(), b.to_wire());
    }

    #[test]
    fn atom_parse_rejects_malformed_pairs() {
        assert!(atom_from_wire(&json!(["uuid", "not-a-uuid"])).is_err());
        assert!(atom_from_wire(&json!(["wat", "x"])).is_err());
        assert!(atom_from_wire(&json!([1, 2, 3])).is_err());
    }
}
