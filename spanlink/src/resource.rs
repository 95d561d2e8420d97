//! Environment-derived configuration: deployment resource attributes, the
//! service identity used to qualify span names, and default provider wiring.
//!
//! All variables are read under an optional prefix taken from
//! [`ENV_PREFIX`], so several deployments can coexist on one host.

use std::env;

use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::{
    trace::{BatchConfigBuilder, BatchSpanProcessor, SdkTracerProvider, SpanExporter},
    Resource,
};
use opentelemetry_semantic_conventions::resource::{
    K8S_NAMESPACE_NAME, K8S_NODE_NAME, K8S_POD_NAME,
};

/// Environment variable holding the prefix applied to every other variable
/// read by this module.
pub const ENV_PREFIX: &str = "SPANLINK_PREFIX";

/// Environment variable holding the service name.
pub const ENV_SERVICE_NAME: &str = "SERVICE_NAME";

/// Environment variable holding the tracer name used for default wiring.
pub const ENV_TRACER_NAME: &str = "TRACER_NAME";

/// Environment variable overriding the derived service prefix.
pub const ENV_SERVICE_NAME_PREFIX: &str = "SERVICE_NAME_PREFIX";

/// Environment variable holding the cluster name.
pub const ENV_CLUSTER_NAME: &str = "K8S_CLUSTER_NAME";

/// Environment variable holding the namespace name.
pub const ENV_NAMESPACE_NAME: &str = "NAMESPACE_NAME";

/// Environment variable holding the pod name.
pub const ENV_POD_NAME: &str = "POD_NAME";

/// Environment variable holding the node name.
pub const ENV_NODE_NAME: &str = "NODE_NAME";

/// Environment variable holding the node's primary IP.
pub const ENV_NODE_IP: &str = "NODE_IP";

/// Environment variable holding the service account.
pub const ENV_SERVICE_ACCOUNT: &str = "SERVICE_ACCOUNT";

/// Resource attribute holding the composite
/// `<cluster>.<namespace>.<pod>` name, set when all three parts are present.
pub const POD_FULL_NAME_ATTR: &str = "POD_NAME";

const MAX_EXPORT_BATCH_SIZE: usize = 50;

/// Reads `<prefix><name>` from the environment; unset and empty values both
/// count as absent.
pub fn env_with_prefix(prefix: &str, name: &str) -> Option<String> {
    env::var(format!("{prefix}{name}"))
        .ok()
        .filter(|value| !value.is_empty())
}

fn env_attributes(prefix: &str) -> Vec<KeyValue> {
    let mut attributes = Vec::new();

    let cluster = env_with_prefix(prefix, ENV_CLUSTER_NAME);
    let namespace = env_with_prefix(prefix, ENV_NAMESPACE_NAME);
    let pod = env_with_prefix(prefix, ENV_POD_NAME);

    if let Some(cluster) = &cluster {
        attributes.push(KeyValue::new(ENV_CLUSTER_NAME, cluster.clone()));
    }
    if let Some(namespace) = &namespace {
        attributes.push(KeyValue::new(K8S_NAMESPACE_NAME, namespace.clone()));
    }
    if let Some(pod) = &pod {
        attributes.push(KeyValue::new(K8S_POD_NAME, pod.clone()));
    }
    if let Some(node) = env_with_prefix(prefix, ENV_NODE_NAME) {
        attributes.push(KeyValue::new(K8S_NODE_NAME, node));
    }
    if let Some(node_ip) = env_with_prefix(prefix, ENV_NODE_IP) {
        attributes.push(KeyValue::new(ENV_NODE_IP, node_ip));
    }
    if let Some(account) = env_with_prefix(prefix, ENV_SERVICE_ACCOUNT) {
        attributes.push(KeyValue::new(ENV_SERVICE_ACCOUNT, account));
    }

    if let (Some(cluster), Some(namespace), Some(pod)) = (cluster, namespace, pod) {
        attributes.push(KeyValue::new(
            POD_FULL_NAME_ATTR,
            format!("{cluster}.{namespace}.{pod}"),
        ));
    }

    attributes
}

/// Loads the known deployment environment variables as a [`Resource`].
pub fn env_resource(prefix: &str) -> Resource {
    Resource::builder_empty()
        .with_attributes(env_attributes(prefix))
        .build()
}

/// The deployment prefix used to disambiguate service names: the explicit
/// [`ENV_SERVICE_NAME_PREFIX`] if set, else `<cluster>.<namespace>` when
/// both are set, else none.
pub fn unique_service_prefix() -> Option<String> {
    let env_prefix = env::var(ENV_PREFIX).unwrap_or_default();

    if let Some(service_prefix) = env_with_prefix(&env_prefix, ENV_SERVICE_NAME_PREFIX) {
        return Some(service_prefix);
    }

    match (
        env_with_prefix(&env_prefix, ENV_CLUSTER_NAME),
        env_with_prefix(&env_prefix, ENV_NAMESPACE_NAME),
    ) {
        (Some(cluster), Some(namespace)) => Some(format!("{cluster}.{namespace}")),
        _ => None,
    }
}

/// The service identity used to qualify span names: `<prefix>.<name>` when a
/// deployment prefix can be derived from the environment, else the bare
/// name.
pub fn service_identity(name: &str) -> String {
    match unique_service_prefix() {
        Some(prefix) => format!("{prefix}.{name}"),
        None => name.to_owned(),
    }
}

/// The tracer name configured in the environment, or the empty default.
pub fn tracer_name() -> String {
    let env_prefix = env::var(ENV_PREFIX).unwrap_or_default();
    env_with_prefix(&env_prefix, ENV_TRACER_NAME).unwrap_or_default()
}

/// Builds a provider with the given exporter and the environment-derived
/// resource, installs it as the global tracer provider, and returns it.
///
/// The caller keeps the returned provider alive and shuts it down on exit.
pub fn init_tracer_provider<E>(exporter: E) -> SdkTracerProvider
where
    E: SpanExporter + 'static,
{
    let env_prefix = env::var(ENV_PREFIX).unwrap_or_default();
    let service = env_with_prefix(&env_prefix, ENV_SERVICE_NAME).unwrap_or_default();

    let resource = Resource::builder()
        .with_attributes(env_attributes(&env_prefix))
        .with_service_name(service_identity(&service))
        .build();

    let processor = BatchSpanProcessor::builder(exporter)
        .with_batch_config(
            BatchConfigBuilder::default()
                .with_max_export_batch_size(MAX_EXPORT_BATCH_SIZE)
                .build(),
        )
        .build();

    let provider = SdkTracerProvider::builder()
        .with_span_processor(processor)
        .with_resource(resource)
        .build();

    global::set_tracer_provider(provider.clone());
    provider
}
