use thiserror::Error;

/// Result type used by all fallible spanlink operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by registry, codec and annotator operations.
///
/// All failures are surfaced synchronously to the immediate caller; nothing
/// in this crate retries or panics.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A span name failed validation before any side effect took place.
    #[error("invalid span name {name:?}: {reason}")]
    InvalidSpanName {
        /// The rejected name.
        name: String,
        /// Why the name was rejected.
        reason: &'static str,
    },

    /// A referenced span or parent is not registered.
    #[error("span {0:?} does not exist")]
    SpanNotFound(String),

    /// A remote install collided with an already registered name.
    #[error("span {0:?} already exists")]
    SpanAlreadyExists(String),

    /// A traceparent string does not follow the
    /// `00-<32 hex>-<16 hex>-<2 hex>` shape.
    #[error("malformed traceparent {value:?}: {reason}")]
    MalformedTraceparent {
        /// The rejected input.
        value: String,
        /// Which part of the format was violated.
        reason: &'static str,
    },

    /// The span map could not be serialized for transport.
    #[error("span map could not be encoded: {0}")]
    SpanMapEncode(#[source] serde_json::Error),

    /// The transported payload is not a flat string-to-string map.
    #[error("span map could not be decoded: {0}")]
    SpanMapDecode(#[source] serde_json::Error),

    /// A component descriptor could not be serialized into an attribute.
    #[error("component could not be serialized: {0}")]
    ComponentSerialization(#[source] serde_json::Error),

    /// A request body could not be parsed as JSON for key extraction.
    #[error("json keys could not be extracted: {0}")]
    JsonKeys(#[source] serde_json::Error),

    /// A required option is missing or unusable.
    #[error("{0}")]
    InvalidOptions(&'static str),
}
