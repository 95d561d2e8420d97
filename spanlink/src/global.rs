//! Process-wide registry for top-level wiring.
//!
//! Library code should take a [`SpanRegistry`] explicitly; this module only
//! serves binaries that want one shared instance for the whole process. The
//! instance is created lazily exactly once, so concurrent first callers race
//! safely to a single registry.

use std::sync::{Mutex, OnceLock};

use opentelemetry::global::{self, BoxedTracer};

use crate::registry::SpanRegistry;

static GLOBAL_REGISTRY: OnceLock<Mutex<SpanRegistry<BoxedTracer>>> = OnceLock::new();

const DEFAULT_SERVICE_NAME: &str = "service";

/// Initializes the process-wide registry with the given tracer and service
/// name. The first initializer wins; later calls return the existing
/// instance and their arguments are dropped.
pub fn init_registry(
    tracer: BoxedTracer,
    service_name: impl Into<String>,
) -> &'static Mutex<SpanRegistry<BoxedTracer>> {
    let service_name = service_name.into();
    GLOBAL_REGISTRY.get_or_init(|| Mutex::new(SpanRegistry::new(tracer, service_name)))
}

/// Returns the process-wide registry, initializing it from the globally
/// installed tracer provider and a default service name if
/// [`init_registry`] was never called.
pub fn registry() -> &'static Mutex<SpanRegistry<BoxedTracer>> {
    GLOBAL_REGISTRY
        .get_or_init(|| Mutex::new(SpanRegistry::new(global::tracer(""), DEFAULT_SERVICE_NAME)))
}
