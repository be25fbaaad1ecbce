//! JSON and opaque-token encodings for cursors.
//!
//! Primitive cursors map one-to-one onto JSON. Non-primitive cursors travel as
//! an object tagged with [`CURSOR_TYPE_KEY`]. A user map that itself contains
//! that key is wrapped under the [`ESCAPED_MAP_TAG`] tag so it decodes back to
//! the same map.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::Error as _;
use serde::ser::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::value::{CursorValue, NonPrimitiveKind};
use crate::error::{ErrorCode, ResumableError, Result};

/// Reserved object key marking a tagged non-primitive cursor.
pub const CURSOR_TYPE_KEY: &str = "__cursor_type";

/// Tag for a user map whose keys collide with [`CURSOR_TYPE_KEY`].
pub const ESCAPED_MAP_TAG: &str = "map";

// ═══════════════════════════════════════════════════════════════════════════════
// JSON
// ═══════════════════════════════════════════════════════════════════════════════

/// Convert a cursor to its JSON form.
pub fn to_json(value: &CursorValue) -> Result<Value> {
    let json = match value {
        CursorValue::Null => Value::Null,
        CursorValue::Boolean(b) => Value::Bool(*b),
        CursorValue::Integer(i) => Value::from(*i),
        CursorValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .ok_or_else(|| {
                ResumableError::new(
                    ErrorCode::SerializationError,
                    format!("Cursor float {} has no JSON representation", f),
                )
            })?,
        CursorValue::String(s) => Value::String(s.clone()),
        CursorValue::List(items) => {
            Value::Array(items.iter().map(to_json).collect::<Result<Vec<_>>>()?)
        }
        CursorValue::Map(entries) => {
            let mut map = Map::with_capacity(entries.len());
            for (key, item) in entries {
                map.insert(key.clone(), to_json(item)?);
            }
            if entries.contains_key(CURSOR_TYPE_KEY) {
                let mut escaped = Map::with_capacity(2);
                escaped.insert(CURSOR_TYPE_KEY.to_string(), Value::from(ESCAPED_MAP_TAG));
                escaped.insert("entries".to_string(), Value::Object(map));
                Value::Object(escaped)
            } else {
                Value::Object(map)
            }
        }

        CursorValue::Timestamp(ts) => tagged(
            NonPrimitiveKind::Timestamp,
            json!({ "value": ts.to_rfc3339_opts(SecondsFormat::AutoSi, true) }),
        ),
        CursorValue::Symbol(name) => tagged(NonPrimitiveKind::Symbol, json!({ "value": name })),
        CursorValue::Record { model, id } => {
            tagged(NonPrimitiveKind::Record, json!({ "model": model, "id": id }))
        }
        CursorValue::Uuid(u) => tagged(NonPrimitiveKind::Uuid, json!({ "value": u.to_string() })),
        CursorValue::Tagged { type_name, value } => tagged(
            NonPrimitiveKind::Subclassed,
            json!({ "type_name": type_name, "value": to_json(value)? }),
        ),
        CursorValue::Opaque { type_name, repr } => tagged(
            NonPrimitiveKind::Opaque,
            json!({ "type_name": type_name, "repr": repr }),
        ),
    };

    Ok(json)
}

fn tagged(kind: NonPrimitiveKind, fields: Value) -> Value {
    let mut object = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    object.insert(CURSOR_TYPE_KEY.to_string(), Value::String(kind.as_str().to_string()));
    Value::Object(object)
}

/// Rebuild a cursor from its JSON form.
pub fn from_json(json: &Value) -> Result<CursorValue> {
    let value = match json {
        Value::Null => CursorValue::Null,
        Value::Bool(b) => CursorValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => CursorValue::Integer(i),
            None => CursorValue::Float(n.as_f64().ok_or_else(|| {
                ResumableError::new(
                    ErrorCode::DeserializationError,
                    format!("Cursor number {} is out of range", n),
                )
            })?),
        },
        Value::String(s) => CursorValue::String(s.clone()),
        Value::Array(items) => {
            CursorValue::List(items.iter().map(from_json).collect::<Result<Vec<_>>>()?)
        }
        Value::Object(map) => match map.get(CURSOR_TYPE_KEY) {
            Some(Value::String(tag)) if tag == ESCAPED_MAP_TAG => match map.get("entries") {
                Some(Value::Object(entries)) => plain_map(entries)?,
                _ => {
                    return Err(ResumableError::new(
                        ErrorCode::DeserializationError,
                        "Escaped cursor map is missing its 'entries' object",
                    ))
                }
            },
            Some(kind) => from_tagged(kind, map)?,
            None => plain_map(map)?,
        },
    };

    Ok(value)
}

fn plain_map(map: &Map<String, Value>) -> Result<CursorValue> {
    let mut entries = std::collections::BTreeMap::new();
    for (key, item) in map {
        entries.insert(key.clone(), from_json(item)?);
    }
    Ok(CursorValue::Map(entries))
}

/// Check that `value` has a JSON form without building it.
///
/// Only non-finite floats, at any depth, have none.
pub fn ensure_encodable(value: &CursorValue) -> Result<()> {
    match value {
        CursorValue::Float(f) if !f.is_finite() => Err(ResumableError::new(
            ErrorCode::SerializationError,
            format!("Cursor float {} has no JSON representation", f),
        )),
        CursorValue::List(items) => items.iter().try_for_each(ensure_encodable),
        CursorValue::Map(entries) => entries.values().try_for_each(ensure_encodable),
        CursorValue::Tagged { value, .. } => ensure_encodable(value),
        _ => Ok(()),
    }
}

fn from_tagged(kind: &Value, map: &Map<String, Value>) -> Result<CursorValue> {
    let kind = kind
        .as_str()
        .and_then(NonPrimitiveKind::parse)
        .ok_or_else(|| {
            ResumableError::new(
                ErrorCode::DeserializationError,
                format!("Unknown tagged cursor type: {}", kind),
            )
        })?;

    let field = |name: &str| -> Result<&str> {
        map.get(name).and_then(Value::as_str).ok_or_else(|| {
            ResumableError::new(
                ErrorCode::DeserializationError,
                format!("Tagged {} cursor is missing string field '{}'", kind, name),
            )
        })
    };

    let value = match kind {
        NonPrimitiveKind::Timestamp => {
            let raw = field("value")?;
            let ts = DateTime::parse_from_rfc3339(raw).map_err(|e| {
                ResumableError::with_internal(
                    ErrorCode::DeserializationError,
                    "Invalid timestamp in tagged cursor",
                    e.to_string(),
                )
            })?;
            CursorValue::Timestamp(ts.with_timezone(&Utc))
        }
        NonPrimitiveKind::Symbol => CursorValue::Symbol(field("value")?.to_string()),
        NonPrimitiveKind::Record => CursorValue::Record {
            model: field("model")?.to_string(),
            id: field("id")?.to_string(),
        },
        NonPrimitiveKind::Uuid => {
            let raw = field("value")?;
            let uuid = Uuid::parse_str(raw).map_err(|e| {
                ResumableError::with_internal(
                    ErrorCode::DeserializationError,
                    "Invalid UUID in tagged cursor",
                    e.to_string(),
                )
            })?;
            CursorValue::Uuid(uuid)
        }
        NonPrimitiveKind::Subclassed => CursorValue::Tagged {
            type_name: field("type_name")?.to_string(),
            value: Box::new(from_json(map.get("value").unwrap_or(&Value::Null))?),
        },
        NonPrimitiveKind::Opaque => CursorValue::Opaque {
            type_name: field("type_name")?.to_string(),
            repr: field("repr")?.to_string(),
        },
    };

    Ok(value)
}

/// Serialize a cursor to a compact JSON string.
pub fn to_string(value: &CursorValue) -> Result<String> {
    Ok(serde_json::to_string(&to_json(value)?)?)
}

/// Parse a cursor from a JSON string.
pub fn from_str(raw: &str) -> Result<CursorValue> {
    let json: Value = serde_json::from_str(raw)?;
    from_json(&json)
}

// ═══════════════════════════════════════════════════════════════════════════════
// Opaque Tokens
// ═══════════════════════════════════════════════════════════════════════════════

/// Encode the cursor to an opaque URL-safe token.
pub fn encode_token(value: &CursorValue) -> Result<String> {
    let json = to_string(value)?;
    Ok(URL_SAFE_NO_PAD.encode(json.as_bytes()))
}

/// Decode a cursor from an opaque token.
pub fn decode_token(token: &str) -> Result<CursorValue> {
    let bytes = URL_SAFE_NO_PAD.decode(token.trim())?;

    let json = String::from_utf8(bytes).map_err(|e| {
        ResumableError::with_internal(ErrorCode::InvalidCursor, "Invalid cursor encoding", e.to_string())
    })?;

    from_str(&json).map_err(|e| {
        ResumableError::with_internal(
            ErrorCode::InvalidCursor,
            "Failed to decode cursor token",
            e.to_string(),
        )
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// Serde
// ═══════════════════════════════════════════════════════════════════════════════

impl Serialize for CursorValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        to_json(self)
            .map_err(|e| S::Error::custom(e.user_message().to_string()))?
            .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for CursorValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let json = Value::deserialize(deserializer)?;
        from_json(&json).map_err(|e| D::Error::custom(e.user_message().to_string()))
    }
}
