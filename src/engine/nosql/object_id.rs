//! Document identifiers
//!
//! Identifiers are BSON ObjectIds. In stored documents they appear in
//! relaxed extended JSON, `{"$oid": "<24 hex>"}`, and callers see the bare
//! hex string.

use bson::oid::ObjectId;
use bson::Bson;
use serde_json::Value;

use crate::engine::error::{QueryError, Result};

const OID_KEY: &str = "$oid";

/// Parse 24 hex characters
pub fn parse_object_id(s: &str) -> Result<ObjectId> {
    ObjectId::parse_str(s).map_err(|_| QueryError::InvalidIdentifier(s.to_string()))
}

/// Extended-JSON form of `oid`
pub fn oid_to_json(oid: ObjectId) -> Value {
    Bson::ObjectId(oid).into_relaxed_extjson()
}

/// Read `{"$oid": "..."}`; anything else is not an ObjectId
pub fn oid_from_json(value: &Value) -> Option<ObjectId> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    map.get(OID_KEY)
        .and_then(Value::as_str)
        .and_then(|hex| ObjectId::parse_str(hex).ok())
}

/// Converts identifiers between the caller's representation and the
/// store's native one
pub trait IdentifierCodec: Send + Sync {
    /// Caller value to native identifier
    fn encode(&self, external: &Value) -> Result<Value>;

    /// Native identifier to caller value. Values that are not native
    /// identifiers come back unchanged.
    fn decode(&self, native: &Value) -> Value;
}

/// Hex strings ↔ extended-JSON ObjectIds
#[derive(Debug, Clone, Copy, Default)]
pub struct ObjectIdCodec;

impl IdentifierCodec for ObjectIdCodec {
    fn encode(&self, external: &Value) -> Result<Value> {
        match external {
            Value::Null => Ok(Value::Null),
            Value::String(s) => Ok(oid_to_json(parse_object_id(s)?)),
            other => oid_from_json(other)
                .map(oid_to_json)
                .ok_or_else(|| QueryError::InvalidIdentifier(other.to_string())),
        }
    }

    fn decode(&self, native: &Value) -> Value {
        match oid_from_json(native) {
            Some(oid) => Value::String(oid.to_hex()),
            None => native.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "5e53bb135b64856045ccb8dc";

    #[test]
    fn test_round_trip() {
        let oid = parse_object_id(ID).unwrap();
        assert_eq!(oid.to_hex(), ID);
        assert_eq!(oid_to_json(oid), json!({"$oid": ID}));
        assert_eq!(oid_from_json(&oid_to_json(oid)), Some(oid));
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            parse_object_id("zzz"),
            Err(QueryError::InvalidIdentifier(_))
        ));
        assert!(parse_object_id("5e53bb135b64856045ccb8dg").is_err());
        assert_eq!(oid_from_json(&json!({"$oid": ID, "x": 1})), None);
        assert_eq!(oid_from_json(&json!(ID)), None);
    }

    #[test]
    fn test_generated_ids_are_distinct() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_hex().len(), 24);
        assert!(oid_from_json(&oid_to_json(a)).is_some());
    }

    #[test]
    fn test_codec() {
        let codec = ObjectIdCodec;
        let native = codec.encode(&json!(ID)).unwrap();
        assert_eq!(native, json!({"$oid": ID}));
        assert_eq!(codec.encode(&native).unwrap(), native);
        assert_eq!(codec.decode(&native), json!(ID));
        assert_eq!(codec.decode(&json!(5)), json!(5));
        assert!(codec.encode(&json!(5)).is_err());
    }
}
