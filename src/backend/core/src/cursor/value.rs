//! The cursor value model and its serializability classification.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ═══════════════════════════════════════════════════════════════════════════════
// Cursor Value
// ═══════════════════════════════════════════════════════════════════════════════

/// An opaque progress marker yielded alongside every item of an enumerator.
///
/// Only the first seven variants survive a trip through a host queue unchanged.
/// The remaining variants are accepted before the enforcement horizon and
/// reported through the [`SerializabilityPolicy`](super::SerializabilityPolicy).
#[derive(Debug, Clone, PartialEq)]
pub enum CursorValue {
    /// Null value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// Integer value (i64).
    Integer(i64),
    /// Floating point value.
    Float(f64),
    /// String value.
    String(String),
    /// Ordered sequence of cursor values.
    List(Vec<CursorValue>),
    /// String-keyed mapping of cursor values.
    Map(BTreeMap<String, CursorValue>),

    /// A point in time.
    Timestamp(DateTime<Utc>),
    /// A symbolic constant.
    Symbol(String),
    /// A handle to a domain record.
    Record { model: String, id: String },
    /// A UUID handle.
    Uuid(Uuid),
    /// A primitive wrapped in a named subtype.
    Tagged {
        type_name: String,
        value: Box<CursorValue>,
    },
    /// Anything else, kept only by its type name and a debug representation.
    Opaque { type_name: String, repr: String },
}

impl CursorValue {
    /// Build a list cursor.
    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<CursorValue>,
    {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    /// Build a map cursor.
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CursorValue>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a domain-record handle.
    pub fn record(model: impl Into<String>, id: impl ToString) -> Self {
        Self::Record {
            model: model.into(),
            id: id.to_string(),
        }
    }

    /// Build a symbolic constant.
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol(name.into())
    }

    /// Wrap a primitive in a named subtype.
    pub fn tagged(type_name: impl Into<String>, value: impl Into<CursorValue>) -> Self {
        Self::Tagged {
            type_name: type_name.into(),
            value: Box::new(value.into()),
        }
    }

    /// Capture an arbitrary value as an opaque cursor.
    pub fn opaque<T: fmt::Debug>(value: &T) -> Self {
        Self::Opaque {
            type_name: std::any::type_name::<T>().to_string(),
            repr: format!("{:?}", value),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[CursorValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, CursorValue>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Short name of the variant, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Timestamp(_) => "timestamp",
            Self::Symbol(_) => "symbol",
            Self::Record { .. } => "record",
            Self::Uuid(_) => "uuid",
            Self::Tagged { .. } => "subclassed",
            Self::Opaque { .. } => "opaque",
        }
    }

    /// Classify this value, descending into lists and maps.
    ///
    /// The first non-primitive value found in depth-first order decides the result.
    pub fn classify(&self) -> Classification {
        self.classify_at("$")
    }

    fn classify_at(&self, path: &str) -> Classification {
        let kind = match self {
            Self::Null | Self::Boolean(_) | Self::Integer(_) | Self::Float(_) | Self::String(_) => {
                return Classification::Primitive;
            }
            Self::List(items) => {
                for (index, item) in items.iter().enumerate() {
                    let found = item.classify_at(&format!("{}[{}]", path, index));
                    if !found.is_primitive() {
                        return found;
                    }
                }
                return Classification::Primitive;
            }
            Self::Map(entries) => {
                for (key, item) in entries {
                    let found = item.classify_at(&format!("{}.{}", path, key));
                    if !found.is_primitive() {
                        return found;
                    }
                }
                return Classification::Primitive;
            }
            Self::Timestamp(_) => NonPrimitiveKind::Timestamp,
            Self::Symbol(_) => NonPrimitiveKind::Symbol,
            Self::Record { .. } => NonPrimitiveKind::Record,
            Self::Uuid(_) => NonPrimitiveKind::Uuid,
            Self::Tagged { .. } => NonPrimitiveKind::Subclassed,
            Self::Opaque { .. } => NonPrimitiveKind::Opaque,
        };

        Classification::NonPrimitive {
            kind,
            path: path.to_string(),
        }
    }

    /// Check whether this value survives serialization unchanged.
    pub fn is_primitive(&self) -> bool {
        self.classify().is_primitive()
    }
}

impl fmt::Display for CursorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match super::codec::to_json(self) {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl Default for CursorValue {
    fn default() -> Self {
        Self::Null
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Conversions
// ─────────────────────────────────────────────────────────────────────────────

impl From<String> for CursorValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<&str> for CursorValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<i64> for CursorValue {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for CursorValue {
    fn from(i: i32) -> Self {
        Self::Integer(i as i64)
    }
}

impl From<u32> for CursorValue {
    fn from(i: u32) -> Self {
        Self::Integer(i as i64)
    }
}

impl From<f64> for CursorValue {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for CursorValue {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Uuid> for CursorValue {
    fn from(u: Uuid) -> Self {
        Self::Uuid(u)
    }
}

impl From<DateTime<Utc>> for CursorValue {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl<T: Into<CursorValue>> From<Vec<T>> for CursorValue {
    fn from(items: Vec<T>) -> Self {
        Self::list(items)
    }
}

impl<T: Into<CursorValue>> From<BTreeMap<String, T>> for CursorValue {
    fn from(entries: BTreeMap<String, T>) -> Self {
        Self::map(entries)
    }
}

impl<T> From<Option<T>> for CursorValue
where
    T: Into<CursorValue>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Classification
// ═══════════════════════════════════════════════════════════════════════════════

/// Kinds of cursor values that cannot be persisted as plain JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NonPrimitiveKind {
    Timestamp,
    Symbol,
    Record,
    Uuid,
    Subclassed,
    Opaque,
}

impl NonPrimitiveKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Timestamp => "timestamp",
            Self::Symbol => "symbol",
            Self::Record => "record",
            Self::Uuid => "uuid",
            Self::Subclassed => "subclassed",
            Self::Opaque => "opaque",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "timestamp" => Some(Self::Timestamp),
            "symbol" => Some(Self::Symbol),
            "record" => Some(Self::Record),
            "uuid" => Some(Self::Uuid),
            "subclassed" => Some(Self::Subclassed),
            "opaque" => Some(Self::Opaque),
            _ => None,
        }
    }
}

impl fmt::Display for NonPrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a cursor value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Composed entirely of null, booleans, numbers, strings, lists and string-keyed maps.
    Primitive,
    /// Contains at least one value of `kind`; `path` locates the first one.
    NonPrimitive { kind: NonPrimitiveKind, path: String },
}

impl Classification {
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Primitive)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive => f.write_str("primitive"),
            Self::NonPrimitive { kind, path } if path == "$" => write!(f, "{}", kind),
            Self::NonPrimitive { kind, path } => write!(f, "{} at {}", kind, path),
        }
    }
}
