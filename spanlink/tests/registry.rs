//! Registry behavior against a real SDK tracer with in-memory export.

use opentelemetry::trace::{TraceContextExt, TracerProvider};
use opentelemetry::KeyValue;
use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracer, SdkTracerProvider, SpanData};
use spanlink::{
    ComponentDescriptor, ComponentOptions, Error, SpanOptions, SpanRegistry, Traceparent,
    COMPONENT_ATTR, PARENT_NAME_ATTR, RELATIONSHIP_ATTR,
};

const SERVICE: &str = "checkout-svc";
const REMOTE_TRACEPARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

fn test_registry() -> (InMemorySpanExporter, SdkTracerProvider, SpanRegistry<SdkTracer>) {
    let exporter = InMemorySpanExporter::default();
    let provider = SdkTracerProvider::builder()
        .with_simple_exporter(exporter.clone())
        .build();
    let registry = SpanRegistry::new(provider.tracer("spanlink-tests"), SERVICE);
    (exporter, provider, registry)
}

fn finished(exporter: &InMemorySpanExporter) -> Vec<SpanData> {
    exporter
        .get_finished_spans()
        .expect("spans are expected to be exported")
}

fn attribute<'a>(span: &'a SpanData, key: &str) -> Option<&'a KeyValue> {
    span.attributes.iter().find(|kv| kv.key.as_str() == key)
}

#[test]
fn child_records_qualified_parent_name() {
    let (exporter, _provider, mut registry) = test_registry();

    registry.start_span(SpanOptions::new("checkout")).unwrap();
    assert!(registry.exists("checkout"));

    registry
        .start_span(SpanOptions::new("charge").with_parent("checkout"))
        .unwrap();
    assert!(registry.exists("checkout"));
    assert!(registry.exists("charge"));

    let parent_token: Traceparent = registry
        .span_traceparent("checkout")
        .unwrap()
        .parse()
        .unwrap();

    registry.end_span("charge").unwrap();
    let spans = finished(&exporter);
    let charge = spans
        .iter()
        .find(|span| span.name == format!("{SERVICE}@charge"))
        .unwrap();
    assert_eq!(
        attribute(charge, PARENT_NAME_ATTR).unwrap().value.as_str(),
        format!("{SERVICE}@checkout")
    );
    assert_eq!(charge.parent_span_id, parent_token.span_id());
}

#[test]
fn missing_parent_is_an_error_and_leaves_registry_untouched() {
    let (_exporter, _provider, mut registry) = test_registry();

    let result = registry.start_span(SpanOptions::new("orphan").with_parent("missing"));
    assert!(matches!(result, Err(Error::SpanNotFound(name)) if name == "missing"));
    assert!(!registry.exists("orphan"));
}

#[test]
fn span_names_are_validated_before_any_side_effect() {
    let (_exporter, _provider, mut registry) = test_registry();

    let empty = registry.start_span(SpanOptions::new(""));
    assert!(matches!(empty, Err(Error::InvalidSpanName { .. })));

    let qualified = registry.start_span(SpanOptions::new("svc@name"));
    assert!(matches!(qualified, Err(Error::InvalidSpanName { .. })));

    assert!(!registry.exists("svc@name"));
}

#[test]
fn set_span_from_traceparent_is_idempotent() {
    let (_exporter, _provider, mut registry) = test_registry();

    registry
        .set_span_from_traceparent("upstream", REMOTE_TRACEPARENT)
        .unwrap();
    let first = registry.span_traceparent("upstream").unwrap();
    assert_eq!(first, REMOTE_TRACEPARENT);

    // Receiving the same name again must neither fail nor overwrite.
    registry
        .set_span_from_traceparent(
            "upstream",
            "00-ffffffffffffffffffffffffffffffff-ffffffffffffffff-00",
        )
        .unwrap();
    assert_eq!(registry.span_traceparent("upstream").unwrap(), first);
}

#[test]
fn set_span_from_traceparent_rejects_malformed_input() {
    let (_exporter, _provider, mut registry) = test_registry();

    let result = registry.set_span_from_traceparent("upstream", "01-bad");
    assert!(matches!(result, Err(Error::MalformedTraceparent { .. })));
    assert!(!registry.exists("upstream"));
}

#[test]
fn remote_installs_never_clobber_existing_entries() {
    let (_exporter, _provider, mut registry) = test_registry();

    let token: Traceparent = REMOTE_TRACEPARENT.parse().unwrap();
    registry
        .add_remote_span_context(token.remote_context(), "upstream")
        .unwrap();

    let again = registry.add_remote_span_context(token.remote_context(), "upstream");
    assert!(matches!(again, Err(Error::SpanAlreadyExists(name)) if name == "upstream"));
}

#[test]
fn traceparent_map_is_all_or_nothing() {
    let (_exporter, _provider, mut registry) = test_registry();

    registry.start_span(SpanOptions::new("a")).unwrap();

    let missing = registry.span_traceparent_map(["a", "b"]);
    assert!(matches!(missing, Err(Error::SpanNotFound(name)) if name == "b"));

    registry.start_span(SpanOptions::new("b")).unwrap();
    let map = registry.span_traceparent_map(["a", "b"]).unwrap();
    assert_eq!(map.len(), 2);
    assert_eq!(
        map[&format!("{SERVICE}@a")],
        registry.span_traceparent("a").unwrap()
    );
    assert_eq!(
        map[&format!("{SERVICE}@b")],
        registry.span_traceparent("b").unwrap()
    );
}

#[test]
fn relationship_links_carry_the_qualified_pair() {
    let (exporter, _provider, mut registry) = test_registry();

    registry.start_span(SpanOptions::new("fetch")).unwrap();
    let fetch_token: Traceparent = registry.span_traceparent("fetch").unwrap().parse().unwrap();

    registry
        .start_span(SpanOptions::new("render").after("fetch"))
        .unwrap();
    registry.end_span("render").unwrap();

    let spans = finished(&exporter);
    let render = spans
        .iter()
        .find(|span| span.name == format!("{SERVICE}@render"))
        .unwrap();
    assert_eq!(render.links.links.len(), 1);
    let link = &render.links.links[0];
    assert_eq!(link.span_context.span_id(), fetch_token.span_id());
    assert_eq!(
        link.attributes[0],
        KeyValue::new(
            RELATIONSHIP_ATTR,
            format!("{SERVICE}@fetch@@@{SERVICE}@render")
        )
    );
}

#[test]
fn external_relationship_names_are_used_as_given() {
    let (exporter, _provider, mut registry) = test_registry();

    registry
        .set_span_from_traceparent("other-svc@upstream", REMOTE_TRACEPARENT)
        .unwrap();
    registry
        .start_span(SpanOptions::new("render").after_external("other-svc@upstream"))
        .unwrap();
    registry.end_span("render").unwrap();

    let spans = finished(&exporter);
    let render = spans
        .iter()
        .find(|span| span.name == format!("{SERVICE}@render"))
        .unwrap();
    let link = &render.links.links[0];
    let token: Traceparent = REMOTE_TRACEPARENT.parse().unwrap();
    assert_eq!(link.span_context.span_id(), token.span_id());
    assert_eq!(
        link.attributes[0],
        KeyValue::new(
            RELATIONSHIP_ATTR,
            format!("other-svc@upstream@@@{SERVICE}@render")
        )
    );
}

#[test]
fn unknown_relationship_reference_fails_before_starting_the_span() {
    let (_exporter, _provider, mut registry) = test_registry();

    let result = registry.start_span(SpanOptions::new("render").after("missing"));
    assert!(matches!(result, Err(Error::SpanNotFound(name)) if name == "missing"));
    assert!(!registry.exists("render"));
}

#[test]
fn parent_is_inferred_from_ambient_context() {
    let (exporter, _provider, mut registry) = test_registry();

    let parent_cx = registry.start_span(SpanOptions::new("checkout")).unwrap();
    registry
        .start_span(SpanOptions::new("charge").with_context(parent_cx))
        .unwrap();
    registry.end_span("charge").unwrap();

    let spans = finished(&exporter);
    let charge = spans
        .iter()
        .find(|span| span.name == format!("{SERVICE}@charge"))
        .unwrap();
    assert_eq!(
        attribute(charge, PARENT_NAME_ATTR).unwrap().value.as_str(),
        format!("{SERVICE}@checkout")
    );
}

#[test]
fn unregistered_ambient_span_yields_no_parent_attribute() {
    let (exporter, _provider, mut registry) = test_registry();

    let token: Traceparent = REMOTE_TRACEPARENT.parse().unwrap();
    registry
        .start_span(SpanOptions::new("charge").with_context(token.remote_context()))
        .unwrap();
    registry.end_span("charge").unwrap();

    let spans = finished(&exporter);
    let charge = spans
        .iter()
        .find(|span| span.name == format!("{SERVICE}@charge"))
        .unwrap();
    assert!(attribute(charge, PARENT_NAME_ATTR).is_none());
    // The provider still parents the span on the ambient remote span.
    assert_eq!(charge.parent_span_id, token.span_id());
}

#[test]
fn restarting_a_name_repoints_the_reverse_index() {
    let (_exporter, _provider, mut registry) = test_registry();

    let first_cx = registry.start_span(SpanOptions::new("job")).unwrap();
    let first_sc = first_cx.span().span_context().clone();

    let second_cx = registry.start_span(SpanOptions::new("job")).unwrap();
    let second_sc = second_cx.span().span_context().clone();
    assert_ne!(first_sc.span_id(), second_sc.span_id());

    // The stale identity is no longer resolvable, the new one is.
    let stale = registry.add_component(
        ComponentOptions::new()
            .for_span_context(first_sc)
            .with_component_type("worker"),
    );
    assert!(matches!(stale, Err(Error::SpanNotFound(_))));
    registry
        .add_component(
            ComponentOptions::new()
                .for_span_context(second_sc)
                .with_component_type("worker"),
        )
        .unwrap();
}

#[test]
fn end_span_requires_a_registered_name_and_keeps_the_record() {
    let (exporter, _provider, mut registry) = test_registry();

    let missing = registry.end_span("missing");
    assert!(matches!(missing, Err(Error::SpanNotFound(_))));

    registry.start_span(SpanOptions::new("job")).unwrap();
    registry.end_span("job").unwrap();
    assert_eq!(finished(&exporter).len(), 1);

    // Post-mortem lookups still work.
    assert!(registry.exists("job"));
    assert!(registry.span_traceparent("job").is_some());
}

#[test]
fn component_annotations_serialize_onto_the_span() {
    let (exporter, _provider, mut registry) = test_registry();

    registry.start_span(SpanOptions::new("persist")).unwrap();
    registry
        .add_component(
            ComponentOptions::new()
                .for_span_name("persist")
                .with_component_type("database")
                .with_attribute(KeyValue::new("engine", "postgres")),
        )
        .unwrap();
    registry.end_span("persist").unwrap();

    let spans = finished(&exporter);
    let persist = spans
        .iter()
        .find(|span| span.name == format!("{SERVICE}@persist"))
        .unwrap();
    let payload = attribute(persist, COMPONENT_ATTR).unwrap().value.as_str();
    let descriptor: ComponentDescriptor = serde_json::from_str(&payload).unwrap();
    assert_eq!(descriptor.name, "persist");
    assert_eq!(descriptor.internal_id, format!("{SERVICE}@persist"));
    assert_eq!(descriptor.kind, "database");
    assert_eq!(descriptor.data["engine"], "postgres");
}

#[test]
fn component_options_are_validated() {
    let (_exporter, _provider, mut registry) = test_registry();
    registry.start_span(SpanOptions::new("persist")).unwrap();

    let no_target = registry.add_component(ComponentOptions::new().with_component_type("db"));
    assert!(matches!(no_target, Err(Error::InvalidOptions(_))));

    let no_type = registry.add_component(ComponentOptions::new().for_span_name("persist"));
    assert!(matches!(no_type, Err(Error::InvalidOptions(_))));

    let unknown = registry.add_component(
        ComponentOptions::new()
            .for_span_name("missing")
            .with_component_type("db"),
    );
    assert!(matches!(unknown, Err(Error::SpanNotFound(_))));
}

#[test]
fn qualified_names_pass_through_when_already_qualified() {
    let (_exporter, _provider, registry) = test_registry();

    assert_eq!(registry.qualified_name("checkout"), format!("{SERVICE}@checkout"));
    assert_eq!(registry.qualified_name("other@checkout"), "other@checkout");
}
