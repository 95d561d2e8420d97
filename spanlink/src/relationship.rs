//! Parent resolution for new spans.
//!
//! A span's parent comes from one of two places: an explicit parent name, or
//! the ambient span carried by a caller-supplied execution context whose
//! identity happens to be registered here. The two paths are kept in one
//! function returning a tagged result so each can be exercised on its own.

use std::collections::HashMap;

use opentelemetry::{
    trace::{SpanId, TraceContextExt},
    Context,
};

use crate::registry::SpanRecord;
use crate::Error;

/// How a parent was determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentSource {
    /// The caller named the parent.
    Explicit,
    /// The parent was inferred from the ambient span of the supplied
    /// context.
    Inferred,
}

/// A resolved parent: the logical name it is registered under, and how it
/// was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedParent {
    /// Logical name of the parent span.
    pub name: String,
    /// Which resolution path produced it.
    pub source: ParentSource,
}

/// Determines the parent for a new span.
///
/// An explicit `parent_name` must be registered, otherwise the call fails
/// with [`Error::SpanNotFound`]. Without one, the ambient span of `cx` is
/// looked up in the reverse index; an ambient span this registry never saw
/// yields no parent (the span starts as a root of the name graph, though the
/// provider may still parent it on the ambient span).
pub(crate) fn resolve_parent(
    spans: &HashMap<String, SpanRecord>,
    span_id_to_name: &HashMap<SpanId, String>,
    parent_name: Option<&str>,
    cx: Option<&Context>,
) -> Result<Option<ResolvedParent>, Error> {
    if let Some(parent_name) = parent_name {
        if !spans.contains_key(parent_name) {
            return Err(Error::SpanNotFound(parent_name.to_owned()));
        }
        return Ok(Some(ResolvedParent {
            name: parent_name.to_owned(),
            source: ParentSource::Explicit,
        }));
    }

    if let Some(cx) = cx {
        if cx.has_active_span() {
            let span_id = cx.span().span_context().span_id();
            if span_id != SpanId::INVALID {
                if let Some(name) = span_id_to_name.get(&span_id) {
                    return Ok(Some(ResolvedParent {
                        name: name.clone(),
                        source: ParentSource::Inferred,
                    }));
                }
            }
        }
    }

    Ok(None)
}
