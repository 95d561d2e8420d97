//! Component annotations: structured payloads describing non-span assets
//! (a database, a queue, a downstream resource) inside a span's attributes.

use std::collections::HashMap;

use opentelemetry::{trace::SpanContext, KeyValue};
use serde::{Deserialize, Serialize};

/// The payload serialized into [`crate::COMPONENT_ATTR`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    /// Logical name of the span the component is attached to.
    pub name: String,
    /// Globally qualified form of `name`.
    pub internal_id: String,
    /// Caller-chosen component type.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form attributes describing the component.
    pub data: HashMap<String, String>,
}

/// Configuration for [`crate::SpanRegistry::add_component`].
///
/// The target span is addressed either by its provider span context or by
/// its logical name; one of the two is required, and a span context must
/// belong to a span created through the registry.
#[derive(Debug, Default)]
pub struct ComponentOptions {
    pub(crate) span_context: Option<SpanContext>,
    pub(crate) span_name: Option<String>,
    pub(crate) component_type: String,
    pub(crate) attributes: Vec<KeyValue>,
}

impl ComponentOptions {
    /// Empty options; fill in a target span and a component type.
    pub fn new() -> Self {
        ComponentOptions::default()
    }

    /// Targets the span with this provider identity.
    pub fn for_span_context(mut self, span_context: SpanContext) -> Self {
        self.span_context = Some(span_context);
        self
    }

    /// Targets the span registered under this logical name.
    pub fn for_span_name(mut self, name: impl Into<String>) -> Self {
        self.span_name = Some(name.into());
        self
    }

    /// The component type; must be non-empty.
    pub fn with_component_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = component_type.into();
        self
    }

    /// Adds one free-form attribute to the component payload.
    pub fn with_attribute(mut self, attribute: KeyValue) -> Self {
        self.attributes.push(attribute);
        self
    }
}
