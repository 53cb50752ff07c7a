use crate::error::OvsdbError;
use crate::value::{from_wire_untyped, Atom, OvsMap, OvsSet, Value};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value as Json;
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AtomicType {
    Integer,
    Real,
    Boolean,
    String,
    Uuid,
}

/// Base type of a set element, map key, or map value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseType {
    #[serde(rename = "type")]
    pub kind: AtomicType,
    /// Allowed members for enum-constrained base types, in wire form
    /// (`["set", [...]]` or a bare scalar).
    #[serde(default, rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Json>,
}

impl BaseType {
    pub fn new(kind: AtomicType) -> Self {
        Self {
            kind,
            enum_values: None,
        }
    }

    fn enum_members(&self) -> Result<Option<Vec<Atom>>, OvsdbError> {
        let Some(raw) = &self.enum_values else {
            return Ok(None);
        };
        match from_wire_untyped(raw)? {
            Value::Set(set) => Ok(Some(set.0)),
            Value::Atom(atom) => Ok(Some(vec![atom])),
            Value::Map(_) => Err(OvsdbError::ConstraintViolation),
        }
    }

    /// Coerces an untyped atom into this base type. Integer/real coercion is
    /// applied both ways where lossless; strings holding canonical UUIDs are
    /// accepted for UUID bases.
    pub fn retype_atom(&self, atom: Atom) -> Result<Atom, OvsdbError> {
        match (self.kind, atom) {
            (AtomicType::Integer, Atom::Integer(i)) => Ok(Atom::Integer(i)),
            (AtomicType::Integer, Atom::Real(f))
                if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 =>
            {
                Ok(Atom::Integer(f as i64))
            }
            (AtomicType::Real, Atom::Real(f)) => Ok(Atom::Real(f)),
            (AtomicType::Real, Atom::Integer(i)) => Ok(Atom::Real(i as f64)),
            (AtomicType::Boolean, Atom::Boolean(b)) => Ok(Atom::Boolean(b)),
            (AtomicType::String, Atom::Str(s)) => Ok(Atom::Str(s)),
            (AtomicType::Uuid, a @ (Atom::Uuid(_) | Atom::Named(_))) => Ok(a),
            (AtomicType::Uuid, Atom::Str(s)) => Uuid::parse_str(&s)
                .map(Atom::Uuid)
                .map_err(|_| OvsdbError::ConstraintViolation),
            _ => Err(OvsdbError::ConstraintViolation),
        }
    }

    pub fn validate_atom(&self, atom: &Atom) -> Result<(), OvsdbError> {
        let ok = match (self.kind, atom) {
            (AtomicType::Integer, Atom::Integer(_)) => true,
            (AtomicType::Real, Atom::Real(f)) => f.is_finite(),
            (AtomicType::Boolean, Atom::Boolean(_)) => true,
            (AtomicType::String, Atom::Str(_)) => true,
            (AtomicType::Uuid, Atom::Uuid(_)) => true,
            // Unresolved named-uuids are illegal once validation runs.
            _ => false,
        };
        if !ok {
            return Err(OvsdbError::ConstraintViolation);
        }
        if let Some(members) = self.enum_members()? {
            if !members.iter().any(|m| m == atom) {
                return Err(OvsdbError::ConstraintViolation);
            }
        }
        Ok(())
    }

    pub fn default_atom(&self) -> Atom {
        match self.kind {
            AtomicType::Integer => Atom::Integer(0),
            AtomicType::Real => Atom::Real(0.0),
            AtomicType::Boolean => Atom::Boolean(false),
            AtomicType::String => Atom::Str(String::new()),
            AtomicType::Uuid => Atom::Uuid(Uuid::nil()),
        }
    }
}

/// Upper cardinality bound of a set or map column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    Fixed(u64),
    Unlimited,
}

impl Default for Cardinality {
    fn default() -> Self {
        Cardinality::Fixed(1)
    }
}

impl Serialize for Cardinality {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Cardinality::Fixed(n) => serializer.serialize_u64(*n),
            Cardinality::Unlimited => serializer.serialize_str("unlimited"),
        }
    }
}

impl<'de> Deserialize<'de> for Cardinality {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CardinalityVisitor;

        impl<'de> Visitor<'de> for CardinalityVisitor {
            type Value = Cardinality;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a non-negative integer or the string \"unlimited\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Cardinality, E> {
                Ok(Cardinality::Fixed(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Cardinality, E> {
                u64::try_from(v)
                    .map(Cardinality::Fixed)
                    .map_err(|_| E::custom("negative cardinality"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Cardinality, E> {
                if v == "unlimited" {
                    Ok(Cardinality::Unlimited)
                } else {
                    Err(E::custom("expected \"unlimited\""))
                }
            }
        }

        deserializer.deserialize_any(CardinalityVisitor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Integer,
    Real,
    Boolean,
    String,
    Uuid,
    Enum,
    Set,
    Map,
}

fn default_min() -> u64 {
    1
}

fn default_mutable() -> bool {
    true
}

/// Column schema: type tag, nested base types for collections, cardinality
/// bounds, and a mutability flag (mutable unless declared otherwise).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnSchema {
    #[serde(rename = "type")]
    pub kind: ColumnKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<BaseType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<BaseType>,
    #[serde(default = "default_min")]
    pub min: u64,
    #[serde(default)]
    pub max: Cardinality,
    #[serde(default = "default_mutable")]
    pub mutable: bool,
}

impl ColumnSchema {
    pub fn atomic(atomic: AtomicType) -> Self {
        let kind = match atomic {
            AtomicType::Integer => ColumnKind::Integer,
            AtomicType::Real => ColumnKind::Real,
            AtomicType::Boolean => ColumnKind::Boolean,
            AtomicType::String => ColumnKind::String,
            AtomicType::Uuid => ColumnKind::Uuid,
        };
        Self {
            kind,
            key: None,
            value: None,
            min: 1,
            max: Cardinality::Fixed(1),
            mutable: true,
        }
    }

    pub fn set_of(key: BaseType, min: u64, max: Cardinality) -> Self {
        Self {
            kind: ColumnKind::Set,
            key: Some(key),
            value: None,
            min,
            max,
            mutable: true,
        }
    }

    pub fn map_of(key: BaseType, value: BaseType, min: u64, max: Cardinality) -> Self {
        Self {
            kind: ColumnKind::Map,
            key: Some(key),
            value: Some(value),
            min,
            max,
            mutable: true,
        }
    }

    pub fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    /// Base type of the column itself (atomic kinds), or of its elements and
    /// keys (enum, set, map).
    pub fn key_type(&self) -> Result<BaseType, OvsdbError> {
        match self.kind {
            ColumnKind::Integer => Ok(BaseType::new(AtomicType::Integer)),
            ColumnKind::Real => Ok(BaseType::new(AtomicType::Real)),
            ColumnKind::Boolean => Ok(BaseType::new(AtomicType::Boolean)),
            ColumnKind::String => Ok(BaseType::new(AtomicType::String)),
            ColumnKind::Uuid => Ok(BaseType::new(AtomicType::Uuid)),
            ColumnKind::Enum | ColumnKind::Set | ColumnKind::Map => {
                self.key.clone().ok_or(OvsdbError::Internal)
            }
        }
    }

    pub fn value_type(&self) -> Result<BaseType, OvsdbError> {
        self.value.clone().ok_or(OvsdbError::Internal)
    }

    /// Wire JSON to typed value for this column.
    pub fn unmarshal_json(&self, raw: &Json) -> Result<Value, OvsdbError> {
        self.retype(from_wire_untyped(raw)?)
    }

    /// Coerces an untyped (or already typed) value into this column's type.
    /// Idempotent on typed values; a bare atom against a set column becomes
    /// a singleton set.
    pub fn retype(&self, value: Value) -> Result<Value, OvsdbError> {
        match self.kind {
            ColumnKind::Set => {
                let key = self.key_type()?;
                match value {
                    Value::Set(set) => {
                        let elems = set
                            .0
                            .into_iter()
                            .map(|a| key.retype_atom(a))
                            .collect::<Result<Vec<_>, _>>()?;
                        Ok(Value::Set(OvsSet(elems)))
                    }
                    Value::Atom(atom) => Ok(Value::Set(OvsSet(vec![key.retype_atom(atom)?]))),
                    Value::Map(_) => Err(OvsdbError::ConstraintViolation),
                }
            }
            ColumnKind::Map => {
                let key = self.key_type()?;
                let val = self.value_type()?;
                match value {
                    Value::Map(map) => {
                        let mut retyped = OvsMap::default();
                        for (k, v) in map.0 {
                            retyped.insert(key.retype_atom(k)?, val.retype_atom(v)?);
                        }
                        Ok(Value::Map(retyped))
                    }
                    _ => Err(OvsdbError::ConstraintViolation),
                }
            }
            _ => {
                let key = self.key_type()?;
                match value {
                    Value::Atom(atom) => Ok(Value::Atom(key.retype_atom(atom)?)),
                    _ => Err(OvsdbError::ConstraintViolation),
                }
            }
        }
    }

    pub fn validate(&self, value: &Value) -> Result<(), OvsdbError> {
        match self.kind {
            ColumnKind::Set => {
                let key = self.key_type()?;
                let Value::Set(set) = value else {
                    return Err(OvsdbError::ConstraintViolation);
                };
                for atom in &set.0 {
                    key.validate_atom(atom)?;
                }
                self.check_cardinality(set.len())
            }
            ColumnKind::Map => {
                let key = self.key_type()?;
                let val = self.value_type()?;
                let Value::Map(map) = value else {
                    return Err(OvsdbError::ConstraintViolation);
                };
                for (k, v) in &map.0 {
                    key.validate_atom(k)?;
                    val.validate_atom(v)?;
                }
                self.check_cardinality(map.len())
            }
            _ => {
                let key = self.key_type()?;
                let Value::Atom(atom) = value else {
                    return Err(OvsdbError::ConstraintViolation);
                };
                key.validate_atom(atom)
            }
        }
    }

    pub fn default_value(&self) -> Value {
        match self.kind {
            ColumnKind::Set => Value::Set(OvsSet::default()),
            ColumnKind::Map => Value::Map(OvsMap::default()),
            _ => Value::Atom(
                self.key_type()
                    .map(|k| k.default_atom())
                    .unwrap_or(Atom::Str(String::new())),
            ),
        }
    }

    fn check_cardinality(&self, len: usize) -> Result<(), OvsdbError> {
        let len = len as u64;
        if len < self.min {
            return Err(OvsdbError::ConstraintViolation);
        }
        match self.max {
            Cardinality::Unlimited => Ok(()),
            Cardinality::Fixed(max) if len <= max => Ok(()),
            Cardinality::Fixed(_) => Err(OvsdbError::ConstraintViolation),
        }
    }
}

/// Parses the operand of a map `delete` mutation, which may be either a map
/// of exact entries or a set of keys.
pub fn unmarshal_map_delete_operand(
    column: &ColumnSchema,
    raw: &Json,
) -> Result<Value, OvsdbError> {
    debug_assert_eq!(column.kind, ColumnKind::Map);
    match from_wire_untyped(raw)? {
        v @ Value::Map(_) => column.retype(v),
        Value::Set(set) => {
            let key = column.key_type()?;
            let keys = set
                .0
                .into_iter()
                .map(|a| key.retype_atom(a))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Set(OvsSet(keys)))
        }
        Value::Atom(atom) => {
            let key = column.key_type()?;
            Ok(Value::Set(OvsSet(vec![key.retype_atom(atom)?])))
        }
    }
}

/// Validates a map `delete` operand: map operands validate against the
/// column, key-set operands validate elementwise against the key base type
/// (the column's own cardinality bounds do not apply to an operand).
pub fn validate_map_delete_operand(
    column: &ColumnSchema,
    operand: &Value,
) -> Result<(), OvsdbError> {
    match operand {
        Value::Map(map) => {
            let key = column.key_type()?;
            let val = column.value_type()?;
            for (k, v) in &map.0 {
                key.validate_atom(k)?;
                val.validate_atom(v)?;
            }
            Ok(())
        }
        Value::Set(set) => {
            let key = column.key_type()?;
            for atom in &set.0 {
                key.validate_atom(atom)?;
            }
            Ok(())
        }
        Value::Atom(_) => Err(OvsdbError::ConstraintViolation),
    }
}

#[cfg(test)]
mod tests {
    use super::{AtomicType, BaseType, Cardinality, ColumnSchema};
    use crate::value::{Atom, Value};
    use serde_json::json;

    #[test]
    fn integer_column_coerces_whole_reals() {
        let column = ColumnSchema::atomic(AtomicType::Integer);
        let value = column.unmarshal_json(&json!(2.0)).unwrap();
        assert_eq!(value, Value::Atom(Atom::Integer(2)));
        assert!(column.unmarshal_json(&json!(2.5)).is_err());
    }

    #[test]
    fn set_column_accepts_bare_scalar_as_singleton() {
        let column = ColumnSchema::set_of(
            BaseType::new(AtomicType::String),
            0,
            Cardinality::Unlimited,
        );
        let value = column.unmarshal_json(&json!("lone")).unwrap();
        let set = value.as_set().unwrap();
        assert_eq!(set.len(), 1);
        assert!(set.contains(&Atom::Str("lone".into())));
    }

    #[test]
    fn map_cardinality_is_enforced() {
        let column = ColumnSchema::map_of(
            BaseType::new(AtomicType::String),
            BaseType::new(AtomicType::String),
            1,
            Cardinality::Fixed(1),
        );
        let empty = column.unmarshal_json(&json!(["map", []])).unwrap();
        assert!(column.validate(&empty).is_err());
        let one = column
            .unmarshal_json(&json!(["map", [["k", "v"]]]))
            .unwrap();
        column.validate(&one).unwrap();
    }

    #[test]
    fn enum_membership_is_checked() {
        let mut base = BaseType::new(AtomicType::String);
        base.enum_values = Some(json!(["set", ["up", "down"]]));
        base.validate_atom(&Atom::Str("up".into())).unwrap();
        assert!(base.validate_atom(&Atom::Str("sideways".into())).is_err());
    }

    #[test]
    fn named_uuid_survives_retype_but_fails_validate() {
        let column = ColumnSchema::atomic(AtomicType::Uuid);
        let value = column
            .unmarshal_json(&json!(["named-uuid", "row_a"]))
            .unwrap();
        assert_eq!(value, Value::Atom(Atom::Named("row_a".into())));
        assert!(column.validate(&value).is_err());
    }

    #[test]
    fn cardinality_deserializes_unlimited() {
        let card: Cardinality = serde_json::from_value(json!("unlimited")).unwrap();
        assert_eq!(card, Cardinality::Unlimited);
        let card: Cardinality = serde_json::from_value(json!(4)).unwrap();
        assert_eq!(card, Cardinality::Fixed(4));
    }

    #[test]
    fn defaults_match_type_zeros() {
        assert_eq!(
            ColumnSchema::atomic(AtomicType::Integer).default_value(),
            Value::Atom(Atom::Integer(0))
        );
        assert_eq!(
            ColumnSchema::atomic(AtomicType::String).default_value(),
            Value::Atom(Atom::Str(String::new()))
        );
    }
}
