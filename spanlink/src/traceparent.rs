//! W3C `traceparent` codec.
//!
//! A `traceparent` value identifies one span in one trace:
//!
//! `traceparent: 00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01`
//!
//! Only version `00` is accepted. Parsing is strict about field count and
//! width but case-insensitive on the hex digits; serializing always produces
//! the canonical lowercase form.

use std::fmt;
use std::str::FromStr;

use opentelemetry::{
    trace::{SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState},
    Context,
};

use crate::Error;

const SUPPORTED_VERSION: &str = "00";
const TRACE_ID_HEX_LENGTH: usize = 32;
const SPAN_ID_HEX_LENGTH: usize = 16;
const FLAGS_HEX_LENGTH: usize = 2;

/// A decoded `traceparent`: trace id, span id, flags, and whether the span
/// identity came from another process.
///
/// Tokens are immutable once constructed. [`Traceparent::parse`] (or
/// `str::parse`) decodes the wire form and marks the token remote;
/// [`Traceparent::from_span_context`] reads a live span's identity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Traceparent {
    trace_id: TraceId,
    span_id: SpanId,
    flags: TraceFlags,
    remote: bool,
}

impl Traceparent {
    /// Decodes a `traceparent` string into a remote token.
    pub fn parse(value: &str) -> Result<Self, Error> {
        value.parse()
    }

    /// Captures the identity of an existing span.
    pub fn from_span_context(span_context: &SpanContext) -> Self {
        Traceparent {
            trace_id: span_context.trace_id(),
            span_id: span_context.span_id(),
            flags: span_context.trace_flags(),
            remote: span_context.is_remote(),
        }
    }

    /// The 16-byte trace identifier.
    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    /// The 8-byte span identifier.
    pub fn span_id(&self) -> SpanId {
        self.span_id
    }

    /// The trace flags byte.
    pub fn flags(&self) -> TraceFlags {
        self.flags
    }

    /// Whether this identity was received from another process.
    pub fn is_remote(&self) -> bool {
        self.remote
    }

    /// The provider-level span context for this token.
    pub fn span_context(&self) -> SpanContext {
        SpanContext::new(
            self.trace_id,
            self.span_id,
            self.flags,
            self.remote,
            TraceState::default(),
        )
    }

    /// An execution context carrying this token as a remote span. This is the
    /// unit a registry installs for a span received over the wire.
    pub fn remote_context(&self) -> Context {
        Context::new().with_remote_span_context(SpanContext::new(
            self.trace_id,
            self.span_id,
            self.flags,
            true,
            TraceState::default(),
        ))
    }
}

impl fmt::Display for Traceparent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{SUPPORTED_VERSION}-{}-{}-{:02x}",
            self.trace_id, self.span_id, self.flags
        )
    }
}

impl FromStr for Traceparent {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Error> {
        let malformed = |reason: &'static str| Error::MalformedTraceparent {
            value: value.to_owned(),
            reason,
        };

        let parts: Vec<&str> = value.split('-').collect();
        if parts.len() != 4 {
            return Err(malformed("expected four `-`-separated fields"));
        }
        if parts[0] != SUPPORTED_VERSION {
            return Err(malformed("only version `00` is supported"));
        }

        if parts[1].len() != TRACE_ID_HEX_LENGTH {
            return Err(malformed("trace id must be 32 hex characters"));
        }
        let trace_id =
            TraceId::from_hex(parts[1]).map_err(|_| malformed("trace id is not valid hex"))?;

        if parts[2].len() != SPAN_ID_HEX_LENGTH {
            return Err(malformed("span id must be 16 hex characters"));
        }
        let span_id =
            SpanId::from_hex(parts[2]).map_err(|_| malformed("span id is not valid hex"))?;

        // An absent flags field means "no flags set".
        let flags = if parts[3].is_empty() {
            TraceFlags::default()
        } else if parts[3].len() == FLAGS_HEX_LENGTH {
            TraceFlags::new(
                u8::from_str_radix(parts[3], 16)
                    .map_err(|_| malformed("flags are not valid hex"))?,
            )
        } else {
            return Err(malformed("flags must be a single hex byte"));
        };

        Ok(Traceparent {
            trace_id,
            span_id,
            flags,
            remote: true,
        })
    }
}
