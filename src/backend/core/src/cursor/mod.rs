//! Cursor values, their wire encodings and the serializability policy.

pub mod codec;
pub mod policy;
pub mod value;

pub use codec::{
    decode_token, encode_token, ensure_encodable, from_json, to_json, CURSOR_TYPE_KEY,
    ESCAPED_MAP_TAG,
};
pub use policy::{
    CallSite, DeprecationHandler, DeprecationNotice, EnforcementMode, RecordingHandler,
    SerializabilityPolicy, TracingHandler,
};
pub use value::{Classification, CursorValue, NonPrimitiveKind};
