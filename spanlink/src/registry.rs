//! The span registry: logical names mapped to live execution contexts.

use std::collections::HashMap;
use std::time::SystemTime;

use opentelemetry::{
    trace::{Link, SpanBuilder, SpanContext, SpanId, SpanRef, TraceContextExt, Tracer},
    Context, KeyValue,
};
use tracing::debug;

use crate::component::{ComponentDescriptor, ComponentOptions};
use crate::relationship::{resolve_parent, ParentSource};
use crate::traceparent::Traceparent;
use crate::{
    Error, COMPONENT_ATTR, NAME_QUALIFIER, PARENT_NAME_ATTR, RELATIONSHIP_ATTR,
    RELATIONSHIP_SEPARATOR,
};

/// A registered span: the execution context produced when the span was
/// started, or installed from a remote traceparent.
///
/// The context carries the provider span handle; all operations on the span
/// (ending it, attaching attributes, reading its identity) go through
/// [`SpanRecord::span`]. Records are owned exclusively by their registry.
#[derive(Clone, Debug)]
pub struct SpanRecord {
    cx: Context,
}

impl SpanRecord {
    pub(crate) fn new(cx: Context) -> Self {
        SpanRecord { cx }
    }

    /// The execution context that carries ambient linkage for children.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    /// The provider handle held by this record's context.
    pub fn span(&self) -> SpanRef<'_> {
        self.cx.span()
    }

    /// The current identity of this record's span.
    pub fn span_context(&self) -> SpanContext {
        self.cx.span().span_context().clone()
    }
}

/// Configuration for [`SpanRegistry::start_span`].
///
/// All fields are validated once, before any side effect. The parent and the
/// `after` references must name spans already registered; see
/// [`crate::relationship`] for how the parent is resolved when no explicit
/// parent name is given.
#[derive(Debug, Default)]
pub struct SpanOptions {
    pub(crate) cx: Option<Context>,
    pub(crate) name: String,
    pub(crate) parent_name: Option<String>,
    pub(crate) internal_from: Vec<String>,
    pub(crate) external_from: Vec<String>,
    pub(crate) relate_to: Vec<String>,
}

impl SpanOptions {
    /// Options for a span with the given logical name.
    ///
    /// The name must be non-empty and must not contain the `@` qualifier.
    pub fn new(name: impl Into<String>) -> Self {
        SpanOptions {
            name: name.into(),
            ..SpanOptions::default()
        }
    }

    /// An existing execution context to create the span from. Defaults to a
    /// fresh root context.
    pub fn with_context(mut self, cx: Context) -> Self {
        self.cx = Some(cx);
        self
    }

    /// The logical name of the parent span. The parent must already be
    /// registered.
    pub fn with_parent(mut self, name: impl Into<String>) -> Self {
        self.parent_name = Some(name.into());
        self
    }

    /// Links the new span to a locally registered span it comes after.
    pub fn after(mut self, name: impl Into<String>) -> Self {
        self.internal_from.push(name.into());
        self
    }

    /// Links the new span to a span it comes after whose name was qualified
    /// by another process. The name is used in the relationship attribute
    /// exactly as given.
    pub fn after_external(mut self, name: impl Into<String>) -> Self {
        self.external_from.push(name.into());
        self
    }

    /// Reserved: accepted for forward compatibility, currently ignored.
    pub fn related_to(mut self, name: impl Into<String>) -> Self {
        self.relate_to.push(name.into());
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::InvalidSpanName {
                name: self.name.clone(),
                reason: "must not be empty",
            });
        }
        if self.name.contains(NAME_QUALIFIER) {
            return Err(Error::InvalidSpanName {
                name: self.name.clone(),
                reason: "must not contain the `@` qualifier",
            });
        }
        if matches!(self.parent_name.as_deref(), Some("")) {
            return Err(Error::InvalidOptions("parent span name must not be empty"));
        }
        Ok(())
    }
}

/// Maps logical span names to live spans for one tracing session.
///
/// A registry owns every span started through it, plus the remote spans
/// installed from propagated traceparents, and keeps a reverse index from
/// provider span id to logical name so relationships can be inferred from
/// ambient context. Registries are single-owner: create one per concurrency
/// scope (one per process, or one per inbound request when used as
/// middleware) and share it behind a lock if it must cross tasks — see
/// [`crate::global`] for the process-wide instance.
///
/// A registry lives exactly as long as its owning scope; records are never
/// garbage-collected individually.
pub struct SpanRegistry<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    tracer: T,
    service_name: String,
    spans: HashMap<String, SpanRecord>,
    span_id_to_name: HashMap<SpanId, String>,
}

impl<T> SpanRegistry<T>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    /// Creates a registry for the given provider tracer and service name.
    ///
    /// The service name qualifies span names when they cross a process
    /// boundary; both are fixed for the registry's lifetime.
    pub fn new(tracer: T, service_name: impl Into<String>) -> Self {
        SpanRegistry {
            tracer,
            service_name: service_name.into(),
            spans: HashMap::new(),
            span_id_to_name: HashMap::new(),
        }
    }

    /// The service name this registry qualifies span names with.
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Whether a span is registered under `name`.
    pub fn exists(&self, name: &str) -> bool {
        self.spans.contains_key(name)
    }

    /// The globally unique form of a logical span name.
    ///
    /// Names that already carry the `@` qualifier (for example names received
    /// from another service) are returned unchanged; everything else becomes
    /// `<service>@<name>`.
    pub fn qualified_name(&self, name: &str) -> String {
        if name.contains(NAME_QUALIFIER) {
            name.to_owned()
        } else {
            format!("{}{}{}", self.service_name, NAME_QUALIFIER, name)
        }
    }

    /// Starts a span and registers it under its logical name.
    ///
    /// The parent is resolved from the options (explicit parent name first,
    /// then ambient context; see [`crate::relationship`]); when one is found
    /// the new span records the qualified parent name under
    /// [`PARENT_NAME_ATTR`]. Every `after`/`after_external` reference becomes
    /// a provider link carrying [`RELATIONSHIP_ATTR`].
    ///
    /// Starting a span under an existing name overwrites the previous record.
    /// Returns the execution context carrying the new span; failures
    /// (validation, unknown parent or reference) leave the registry
    /// untouched.
    pub fn start_span(&mut self, options: SpanOptions) -> Result<Context, Error> {
        options.validate()?;
        let SpanOptions {
            cx,
            name,
            parent_name,
            internal_from,
            external_from,
            relate_to,
        } = options;
        // `relate_to` is reserved and deliberately unused for now.
        let _ = relate_to;

        let parent = resolve_parent(
            &self.spans,
            &self.span_id_to_name,
            parent_name.as_deref(),
            cx.as_ref(),
        )?;

        // An explicit parent's stored context wins, then the caller-supplied
        // context, then a fresh root.
        let parent_cx = match &parent {
            Some(resolved) if resolved.source == ParentSource::Explicit => {
                self.spans[&resolved.name].context().clone()
            }
            _ => cx.unwrap_or_else(Context::new),
        };

        let mut attributes = Vec::new();
        if let Some(resolved) = &parent {
            attributes.push(KeyValue::new(
                PARENT_NAME_ATTR,
                self.qualified_name(&resolved.name),
            ));
        }

        let qualified = self.qualified_name(&name);
        let mut links = Vec::with_capacity(internal_from.len() + external_from.len());
        for from in &internal_from {
            let record = self
                .spans
                .get(from)
                .ok_or_else(|| Error::SpanNotFound(from.clone()))?;
            let relationship = format!(
                "{}{}{}",
                self.qualified_name(from),
                RELATIONSHIP_SEPARATOR,
                qualified
            );
            links.push(Link::new(
                record.span_context(),
                vec![KeyValue::new(RELATIONSHIP_ATTR, relationship)],
                0,
            ));
        }
        for from in &external_from {
            let record = self
                .spans
                .get(from)
                .ok_or_else(|| Error::SpanNotFound(from.clone()))?;
            let relationship = format!("{from}{RELATIONSHIP_SEPARATOR}{qualified}");
            links.push(Link::new(
                record.span_context(),
                vec![KeyValue::new(RELATIONSHIP_ATTR, relationship)],
                0,
            ));
        }

        let mut builder = SpanBuilder::from_name(qualified);
        if !attributes.is_empty() {
            builder = builder.with_attributes(attributes);
        }
        if !links.is_empty() {
            builder = builder.with_links(links);
        }

        let span = self.tracer.build_with_context(builder, &parent_cx);
        let cx = parent_cx.with_span(span);
        debug!(span = %name, "started span");
        self.insert_record(name, SpanRecord::new(cx.clone()));

        Ok(cx)
    }

    /// Ends the span registered under `name`.
    ///
    /// The record stays registered so its identity remains queryable; ending
    /// a remote record is a no-op on the remote side.
    pub fn end_span(&mut self, name: &str) -> Result<(), Error> {
        let record = self
            .spans
            .get(name)
            .ok_or_else(|| Error::SpanNotFound(name.to_owned()))?;
        record.span().end();
        Ok(())
    }

    /// Ends the span registered under `name` with an explicit end timestamp.
    pub fn end_span_with_timestamp(&mut self, name: &str, at: SystemTime) -> Result<(), Error> {
        let record = self
            .spans
            .get(name)
            .ok_or_else(|| Error::SpanNotFound(name.to_owned()))?;
        record.span().end_with_timestamp(at);
        Ok(())
    }

    /// The execution context of the span registered under `name`.
    pub fn span_context(&self, name: &str) -> Result<Context, Error> {
        self.spans
            .get(name)
            .map(|record| record.context().clone())
            .ok_or_else(|| Error::SpanNotFound(name.to_owned()))
    }

    /// Installs a record for a span whose identity was received from
    /// elsewhere.
    ///
    /// Unlike [`SpanRegistry::start_span`], remote installs never clobber an
    /// existing entry: a name collision fails with
    /// [`Error::SpanAlreadyExists`].
    pub fn add_remote_span_context(
        &mut self,
        cx: Context,
        name: impl Into<String>,
    ) -> Result<(), Error> {
        let name = name.into();
        if self.spans.contains_key(&name) {
            return Err(Error::SpanAlreadyExists(name));
        }
        self.insert_record(name, SpanRecord::new(cx));
        Ok(())
    }

    /// The encoded traceparent of the span registered under `name`, or
    /// `None` if the name is absent.
    pub fn span_traceparent(&self, name: &str) -> Option<String> {
        self.spans
            .get(name)
            .map(|record| Traceparent::from_span_context(&record.span_context()).to_string())
    }

    /// Exports the identities of the given spans as a qualified-name →
    /// traceparent map, the payload shipped over the wire.
    ///
    /// All-or-nothing: the first missing name fails the whole call.
    pub fn span_traceparent_map<I, S>(&self, names: I) -> Result<HashMap<String, String>, Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut map = HashMap::new();
        for name in names {
            let name = name.as_ref();
            let record = self
                .spans
                .get(name)
                .ok_or_else(|| Error::SpanNotFound(name.to_owned()))?;
            map.insert(
                self.qualified_name(name),
                Traceparent::from_span_context(&record.span_context()).to_string(),
            );
        }
        Ok(map)
    }

    /// Installs a remote span from its traceparent string.
    ///
    /// Idempotent: receiving the same propagated name twice is not an error,
    /// and the first installed identity is kept.
    pub fn set_span_from_traceparent(
        &mut self,
        name: &str,
        traceparent: &str,
    ) -> Result<(), Error> {
        if self.exists(name) {
            return Ok(());
        }
        let token: Traceparent = traceparent.parse()?;
        self.add_remote_span_context(token.remote_context(), name)?;
        debug!(span = %name, "installed remote span");
        Ok(())
    }

    /// Attaches a component annotation to a registered span.
    ///
    /// The span is addressed either by logical name or by a provider span
    /// context; a span context must resolve through this registry's reverse
    /// index, so spans obtained outside the registry are rejected. The
    /// descriptor is serialized into the single [`COMPONENT_ATTR`] attribute.
    pub fn add_component(&self, options: ComponentOptions) -> Result<(), Error> {
        let ComponentOptions {
            span_context,
            span_name,
            component_type,
            attributes,
        } = options;

        let name = match (span_context, span_name) {
            (Some(span_context), _) => self
                .span_id_to_name
                .get(&span_context.span_id())
                .cloned()
                .ok_or_else(|| Error::SpanNotFound(span_context.span_id().to_string()))?,
            (None, Some(name)) => {
                if !self.exists(&name) {
                    return Err(Error::SpanNotFound(name));
                }
                name
            }
            (None, None) => {
                return Err(Error::InvalidOptions(
                    "either a span context or a span name is required",
                ))
            }
        };

        if component_type.is_empty() {
            return Err(Error::InvalidOptions("component type must not be empty"));
        }

        let record = self
            .spans
            .get(&name)
            .ok_or_else(|| Error::SpanNotFound(name.clone()))?;

        let data = attributes
            .iter()
            .map(|kv| (kv.key.as_str().to_owned(), kv.value.as_str().into_owned()))
            .collect();
        let descriptor = ComponentDescriptor {
            internal_id: self.qualified_name(&name),
            name,
            kind: component_type,
            data,
        };
        let payload =
            serde_json::to_string(&descriptor).map_err(Error::ComponentSerialization)?;

        record
            .span()
            .set_attribute(KeyValue::new(COMPONENT_ATTR, payload));
        Ok(())
    }

    /// Inserts a record while keeping the reverse index consistent: the
    /// overwritten record's span id is dropped and the new one indexed, so
    /// every index entry always points at the record that owns it.
    fn insert_record(&mut self, name: String, record: SpanRecord) {
        let span_id = record.span_context().span_id();
        if let Some(previous) = self.spans.insert(name.clone(), record) {
            self.span_id_to_name
                .remove(&previous.span_context().span_id());
        }
        if span_id != SpanId::INVALID {
            self.span_id_to_name.insert(span_id, name);
        }
    }
}
