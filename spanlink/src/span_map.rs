//! Codec for the propagated span map.
//!
//! A span map associates qualified span names with their `traceparent`
//! strings. It travels as a single JSON object so it fits into one HTTP
//! header value; see [`crate::SpanRegistry::span_traceparent_map`] for how
//! the map is produced.

use std::collections::{BTreeMap, HashMap};

use crate::Error;

/// Serializes a span map into its transportable form.
///
/// Output is canonical: keys are emitted in sorted order so equal maps always
/// serialize to the same string.
pub fn encode(spans: &HashMap<String, String>) -> Result<String, Error> {
    let canonical: BTreeMap<&str, &str> = spans
        .iter()
        .map(|(name, traceparent)| (name.as_str(), traceparent.as_str()))
        .collect();

    serde_json::to_string(&canonical).map_err(Error::SpanMapEncode)
}

/// Deserializes a span map from its transportable form.
///
/// Fails with [`Error::SpanMapDecode`] unless the payload is a flat
/// string-to-string object.
pub fn decode(value: &str) -> Result<HashMap<String, String>, Error> {
    serde_json::from_str(value).map_err(Error::SpanMapDecode)
}
