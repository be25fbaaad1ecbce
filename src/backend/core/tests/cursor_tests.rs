//! Integration tests for cursor classification and encoding.

use chrono::{DateTime, Utc};
use resumable_core::cursor::{
    self, Classification, CursorValue, NonPrimitiveKind, CURSOR_TYPE_KEY, ESCAPED_MAP_TAG,
};
use resumable_core::error::ErrorCode;
use serde_json::json;
use std::collections::BTreeMap;

fn stamp() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

// ============================================================================
// Classification
// ============================================================================

#[test]
fn test_composite_primitives_are_primitive() {
    let cursor = CursorValue::map([
        ("page", CursorValue::from(3i64)),
        ("keys", CursorValue::list([CursorValue::from("a"), CursorValue::from(1.5)])),
        ("done", CursorValue::from(false)),
        ("last", CursorValue::Null),
    ]);

    assert!(cursor.is_primitive());
    assert_eq!(cursor.classify(), Classification::Primitive);
}

#[test]
fn test_nested_timestamp_reports_path() {
    let cursor = CursorValue::list([
        CursorValue::from(7i64),
        CursorValue::map([("updated_at", CursorValue::Timestamp(stamp()))]),
    ]);

    match cursor.classify() {
        Classification::NonPrimitive { kind, path } => {
            assert_eq!(kind, NonPrimitiveKind::Timestamp);
            assert_eq!(path, "$[1].updated_at");
        }
        Classification::Primitive => panic!("timestamp classified as primitive"),
    }
}

#[test]
fn test_each_non_primitive_kind() {
    let cases = [
        (CursorValue::symbol("pending"), NonPrimitiveKind::Symbol),
        (CursorValue::record("Product", 42), NonPrimitiveKind::Record),
        (CursorValue::from(uuid::Uuid::nil()), NonPrimitiveKind::Uuid),
        (CursorValue::tagged("Sku", "AB-1"), NonPrimitiveKind::Subclassed),
        (CursorValue::opaque(&std::time::Duration::from_secs(1)), NonPrimitiveKind::Opaque),
    ];

    for (cursor, expected) in cases {
        match cursor.classify() {
            Classification::NonPrimitive { kind, .. } => assert_eq!(kind, expected),
            Classification::Primitive => panic!("{:?} classified as primitive", cursor),
        }
    }
}

// ============================================================================
// Codec
// ============================================================================

#[test]
fn test_primitive_json_is_plain() {
    let cursor = CursorValue::list([CursorValue::from(1i64), CursorValue::from("b")]);
    assert_eq!(cursor::to_json(&cursor).unwrap(), json!([1, "b"]));
}

#[test]
fn test_timestamp_json_is_tagged() {
    let json = cursor::to_json(&CursorValue::Timestamp(stamp())).unwrap();
    assert_eq!(
        json,
        json!({ CURSOR_TYPE_KEY: "timestamp", "value": "2023-11-14T22:13:20Z" })
    );
    assert_eq!(cursor::from_json(&json).unwrap(), CursorValue::Timestamp(stamp()));
}

#[test]
fn test_record_survives_token() {
    let cursor = CursorValue::list([
        CursorValue::record("Product", 42),
        CursorValue::from(3i64),
    ]);
    let token = cursor::encode_token(&cursor).unwrap();

    assert!(!token.contains('='));
    assert_eq!(cursor::decode_token(&token).unwrap(), cursor);
}

#[test]
fn test_map_using_reserved_key_round_trips() {
    let mut entries = BTreeMap::new();
    entries.insert(CURSOR_TYPE_KEY.to_string(), CursorValue::from("timestamp"));
    entries.insert("value".to_string(), CursorValue::from("2023-11-14T22:13:20Z"));
    let cursor = CursorValue::Map(entries);

    assert!(cursor.is_primitive());
    let json = cursor::to_json(&cursor).unwrap();
    assert_eq!(json[CURSOR_TYPE_KEY], ESCAPED_MAP_TAG);
    assert_eq!(cursor::from_json(&json).unwrap(), cursor);

    let raw = serde_json::to_string(&cursor).unwrap();
    let back: CursorValue = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, cursor);
}

#[test]
fn test_escaped_map_without_entries_rejected() {
    let err = cursor::from_json(&json!({ CURSOR_TYPE_KEY: ESCAPED_MAP_TAG })).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DeserializationError);
}

#[test]
fn test_non_finite_float_rejected() {
    let err = cursor::to_json(&CursorValue::Float(f64::NAN)).unwrap_err();
    assert_eq!(err.code(), ErrorCode::SerializationError);
}

#[test]
fn test_unknown_tag_rejected() {
    let err = cursor::from_json(&json!({ CURSOR_TYPE_KEY: "complex", "value": 1 })).unwrap_err();
    assert_eq!(err.code(), ErrorCode::DeserializationError);
}

#[test]
fn test_garbage_token_is_invalid_cursor() {
    let err = cursor::decode_token("not a token!").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidCursor);
    assert!(err.is_argument_error());
}

#[test]
fn test_serde_uses_tagged_form() {
    let cursor = CursorValue::symbol("archived");
    let raw = serde_json::to_string(&cursor).unwrap();
    assert!(raw.contains(CURSOR_TYPE_KEY));

    let back: CursorValue = serde_json::from_str(&raw).unwrap();
    assert_eq!(back, cursor);
}
