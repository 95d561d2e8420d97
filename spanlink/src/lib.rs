//! Named-span registry and cross-process propagation on top of OpenTelemetry.
//!
//! `spanlink` lets a process register spans under caller-chosen names, link
//! them to parents and to related spans (same-process or cross-process), and
//! rebuild those links on the receiving side of a network hop. It does not
//! implement a tracing backend: span storage, sampling and export stay with
//! the injected [`Tracer`], this crate only manages naming, relationships and
//! propagation around it.
//!
//! The central type is [`SpanRegistry`], which maps logical span names to the
//! execution contexts of live spans. Span names are qualified with the owning
//! service (`<service>@<name>`) when they cross a process boundary, so that
//! identically named spans from different services stay distinguishable.
//!
//! ```
//! use opentelemetry::global;
//! use spanlink::{SpanOptions, SpanRegistry};
//!
//! let mut registry = SpanRegistry::new(global::tracer("example"), "checkout-svc");
//! registry.start_span(SpanOptions::new("checkout")).unwrap();
//! registry
//!     .start_span(SpanOptions::new("charge").with_parent("checkout"))
//!     .unwrap();
//! registry.end_span("charge").unwrap();
//! registry.end_span("checkout").unwrap();
//! ```
//!
//! To carry span identity to another service, export a set of spans with
//! [`SpanRegistry::span_traceparent_map`], serialize it with [`span_map`],
//! and install each entry on the receiving side with
//! [`SpanRegistry::set_span_from_traceparent`]. The wire format for a single
//! span is the W3C `traceparent` string, handled by [`Traceparent`].
//!
//! [`Tracer`]: opentelemetry::trace::Tracer

mod component;
mod error;
pub mod global;
mod registry;
pub mod relationship;
pub mod resource;
pub mod span_map;
mod traceparent;

pub use component::{ComponentDescriptor, ComponentOptions};
pub use error::{Error, Result};
pub use registry::{SpanOptions, SpanRecord, SpanRegistry};
pub use traceparent::Traceparent;

/// Span attribute holding the qualified name of the span's logical parent.
///
/// This is the durable signal a downstream consumer uses to reconstruct the
/// parent/child edge between named spans.
pub const PARENT_NAME_ATTR: &str = "spanlink.span.parent_name";

/// Span attribute attached to a relationship link, formatted as
/// `<qualified-from>@@@<qualified-to>`.
pub const RELATIONSHIP_ATTR: &str = "spanlink.span.relationship";

/// Span attribute holding a serialized [`ComponentDescriptor`].
pub const COMPONENT_ATTR: &str = "spanlink.span.component";

/// Separator between the two qualified names of a relationship attribute.
pub const RELATIONSHIP_SEPARATOR: &str = "@@@";

/// Separator between a service identity and a logical span name. Logical
/// names must not contain it; names that do are treated as already qualified.
pub const NAME_QUALIFIER: char = '@';
