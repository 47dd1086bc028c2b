//! Inbound event contract: payload decoding, validation, truncation.
//!
//! The contract is a pure function from a raw JSON body to either a
//! [`NormalizedEvent`] or a list of field-level [`ValidationError`]s.
//! Rejection never partially applies.

mod decode;
mod event;
mod truncate;
mod validate;

pub use decode::unwrap_nested_json;
pub use event::{NormalizedEvent, ValidationError, EVENT_SOURCES, EVENT_STATUSES, EVENT_TYPES};
pub use truncate::{truncate_metadata, TruncatedMetadata};
pub use validate::normalize_payload;
