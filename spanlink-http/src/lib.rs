//! HTTP plumbing for spanlink registries.
//!
//! An outgoing call carries the identities of selected spans in a single
//! header: the registry exports a qualified-name → traceparent map, which is
//! serialized with [`spanlink::span_map`] and written under
//! [`SPAN_MAP_HEADER`]. The receiving side builds a fresh request-scoped
//! registry, installs every propagated span it can, and stores the registry
//! in the request's extensions for downstream handlers.
//!
//! Installation is best-effort by design: trace-context propagation must
//! never block the request it is attached to, so individual bad entries are
//! logged and skipped.

use std::sync::{Arc, Mutex};

use http::{Extensions, HeaderMap, HeaderValue};
use opentelemetry::{
    global::{self, BoxedTracer},
    trace::Tracer,
    KeyValue,
};
use opentelemetry_semantic_conventions::trace::{HTTP_REQUEST_METHOD, HTTP_ROUTE, URL_FULL};
use spanlink::{resource, span_map, Error, SpanRegistry};
use tracing::warn;

/// Header carrying the serialized span map of the calling service.
pub const SPAN_MAP_HEADER: &str = "spanlink-span-map";

/// A request-scoped registry shared across handlers.
pub type SharedRegistry = Arc<Mutex<SpanRegistry<BoxedTracer>>>;

/// Installs every span propagated under [`SPAN_MAP_HEADER`] into the given
/// registry and returns how many were installed.
///
/// A missing header installs nothing; an unparseable header or entry is
/// logged and skipped so the request is never aborted by bad propagation
/// data.
pub fn install_from_headers<T>(headers: &HeaderMap, registry: &mut SpanRegistry<T>) -> usize
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
{
    let Some(value) = headers.get(SPAN_MAP_HEADER).and_then(|v| v.to_str().ok()) else {
        return 0;
    };

    let spans = match span_map::decode(value) {
        Ok(spans) => spans,
        Err(error) => {
            warn!(%error, "ignoring unparseable span map header");
            return 0;
        }
    };

    let mut installed = 0;
    for (name, traceparent) in spans {
        match registry.set_span_from_traceparent(&name, &traceparent) {
            Ok(()) => installed += 1,
            Err(error) => warn!(span = %name, %error, "could not install propagated span"),
        }
    }
    installed
}

/// Exports the given spans from the registry and writes their span map under
/// [`SPAN_MAP_HEADER`].
///
/// All-or-nothing like
/// [`span_traceparent_map`](SpanRegistry::span_traceparent_map): a missing
/// name fails the call and the headers are left unchanged.
pub fn inject_span_map<T, I, S>(
    registry: &SpanRegistry<T>,
    names: I,
    headers: &mut HeaderMap,
) -> Result<(), Error>
where
    T: Tracer,
    T::Span: Send + Sync + 'static,
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let spans = registry.span_traceparent_map(names)?;
    let encoded = span_map::encode(&spans)?;
    let value = HeaderValue::from_str(&encoded)
        .map_err(|_| Error::InvalidOptions("span map is not a valid header value"))?;
    headers.insert(SPAN_MAP_HEADER, value);
    Ok(())
}

/// Builds a fresh request-scoped registry from the environment-configured
/// tracer and service name, pre-populated with every span propagated in the
/// request headers.
pub fn request_registry(headers: &HeaderMap) -> SharedRegistry {
    let env_prefix = std::env::var(resource::ENV_PREFIX).unwrap_or_default();
    let tracer = global::tracer(resource::tracer_name());
    let service_name =
        resource::env_with_prefix(&env_prefix, resource::ENV_SERVICE_NAME).unwrap_or_default();

    let mut registry = SpanRegistry::new(tracer, service_name);
    install_from_headers(headers, &mut registry);
    Arc::new(Mutex::new(registry))
}

/// Stores a request-scoped registry in the request's extensions.
pub fn attach_registry(extensions: &mut Extensions, registry: SharedRegistry) {
    extensions.insert(registry);
}

/// Retrieves the request-scoped registry installed by [`attach_registry`].
pub fn registry_from_extensions(extensions: &Extensions) -> Option<SharedRegistry> {
    extensions.get::<SharedRegistry>().cloned()
}

/// Describes the endpoint being served: method, full URL and route path as
/// span attributes.
pub fn endpoint_attributes<B>(request: &http::Request<B>) -> Vec<KeyValue> {
    vec![
        KeyValue::new(HTTP_REQUEST_METHOD, request.method().as_str().to_owned()),
        KeyValue::new(URL_FULL, request.uri().to_string()),
        KeyValue::new(HTTP_ROUTE, request.uri().path().to_owned()),
    ]
}

/// Flattens the keys of a JSON body into dotted paths (`parent.child`, array
/// elements by index), for annotating an endpoint span with the shape of its
/// payload.
pub fn extract_json_keys(body: &[u8]) -> Result<Vec<String>, Error> {
    let value: serde_json::Value = serde_json::from_slice(body).map_err(Error::JsonKeys)?;
    let mut keys = Vec::new();
    collect_keys(&value, "", &mut keys);
    Ok(keys)
}

fn collect_keys(value: &serde_json::Value, prefix: &str, keys: &mut Vec<String>) {
    match value {
        serde_json::Value::Object(fields) => {
            for (key, child) in fields {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                collect_keys(child, &path, keys);
            }
        }
        serde_json::Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                let path = if prefix.is_empty() {
                    index.to_string()
                } else {
                    format!("{prefix}.{index}")
                };
                collect_keys(child, &path, keys);
            }
        }
        _ => {
            if !prefix.is_empty() {
                keys.push(prefix.to_owned());
            }
        }
    }
}
