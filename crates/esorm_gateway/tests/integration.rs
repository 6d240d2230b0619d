//! Integration tests for the gateway: wire format against a scripted
//! transport, and behavior against the in-memory backend.

use esorm_gateway::{
    build_filter, BulkBody, ContentType, FilterTerm, GatewayError, Method, Operator, Script,
    SearchQuery, SortField, ALREADY_EXISTS,
};
use esorm_testkit::{MemoryBackend, ScriptedTransport};
use serde_json::{json, Map, Value};

fn properties() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("id".into(), json!({"type": "keyword"}));
    properties.insert("createTime".into(), json!({"type": "date"}));
    properties
}

#[test]
fn search_request_shape() {
    let transport = ScriptedTransport::new();
    transport.reply_json(
        200,
        json!({"hits": {"total": {"value": 7, "relation": "eq"}, "hits": [
            {"_id": "d1", "_source": {"id": "d1"}, "sort": ["2023-05-01"]}
        ]}}),
    );
    let gateway = transport.gateway();

    let query = SearchQuery {
        size: 1,
        filter: build_filter(&[FilterTerm::parse("State", "online")]),
        sort: vec![SortField::desc("createTime")],
        ..SearchQuery::default()
    };
    let response = gateway.search(&["goiot-device"], &query).unwrap();

    assert_eq!(response.total, 7);
    assert_eq!(response.last_sort, Some(vec![json!("2023-05-01")]));
    let request = transport.last_request().unwrap();
    assert_eq!(request.method, Method::Post);
    assert_eq!(request.path_string(), "/goiot-device/_search");
    assert_eq!(request.query_param("ignore_unavailable"), Some("true"));
    let body = transport.last_body().unwrap();
    assert_eq!(body["query"]["bool"]["filter"][0], json!({"term": {"state": "online"}}));
}

#[test]
fn search_on_missing_index_is_empty() {
    let transport = ScriptedTransport::new();
    transport.reply_json(
        404,
        json!({"error": {"type": "index_not_found_exception", "reason": "no such index"}}),
    );
    let response = transport
        .gateway()
        .search(&["goiot-missing"], &SearchQuery::default())
        .unwrap();
    assert_eq!(response.total, 0);
    assert!(response.hits.is_empty());
}

#[test]
fn unknown_route_404_is_an_error() {
    let transport = ScriptedTransport::new();
    transport.reply_json(
        404,
        json!({"error": {"type": "illegal_argument_exception", "reason": "no handler"}}),
    );
    let err = transport
        .gateway()
        .count(&["goiot-device"], &[])
        .unwrap_err();
    let backend = err.backend().unwrap();
    assert_eq!(backend.status, 404);
    assert_eq!(backend.error_type, "illegal_argument_exception");
}

#[test]
fn backend_errors_are_normalized() {
    let transport = ScriptedTransport::new();
    transport.reply(500, r#"{"error":"internal failure"}"#);
    transport.reply(502, "bad gateway");
    let gateway = transport.gateway();

    let err = gateway.delete_by_query("goiot-device", &[]).unwrap_err();
    let backend = err.backend().unwrap();
    assert_eq!(backend.status, 500);
    assert_eq!(backend.reason, "internal failure");

    let err = gateway.delete_by_query("goiot-device", &[]).unwrap_err();
    assert_eq!(err.backend().unwrap().reason, "bad gateway");
    assert_eq!(err.backend().unwrap().body, "bad gateway");
}

#[test]
fn transport_errors_pass_through() {
    let transport = ScriptedTransport::new();
    transport.fail(GatewayError::transport("connection refused"));
    let err = transport.gateway().get_doc("goiot-device", "d1").unwrap_err();
    assert!(err.is_transport());
}

#[test]
fn undecodable_success_is_transport() {
    let transport = ScriptedTransport::new();
    transport.reply(200, "<html>proxy</html>");
    let err = transport
        .gateway()
        .count(&["goiot-device"], &[])
        .unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}

#[test]
fn by_query_parameters() {
    let transport = ScriptedTransport::new();
    transport.reply_json(200, json!({"updated": 3}));
    let mut params = Map::new();
    params.insert("state".into(), json!("offline"));
    let script = Script::painless("ctx._source['state'] = params['state']", params);

    let filter = build_filter(&[FilterTerm::new("productId", "p1", Operator::Eq)]);
    let updated = transport
        .gateway()
        .update_by_query("goiot-device", &filter, &script)
        .unwrap();

    assert_eq!(updated, 3);
    let request = transport.last_request().unwrap();
    assert_eq!(request.query_param("conflicts"), Some("proceed"));
    assert_eq!(request.query_param("refresh"), Some("true"));
    let body = transport.last_body().unwrap();
    assert_eq!(body["script"]["lang"], "painless");
    assert_eq!(body["script"]["params"]["state"], "offline");
}

#[test]
fn empty_index_list_is_rejected() {
    let transport = ScriptedTransport::new();
    let err = transport.gateway().count(&[], &[]).unwrap_err();
    assert!(matches!(err, GatewayError::InvalidRequest(_)));
    assert!(transport.requests().is_empty());
}

#[test]
fn index_lifecycle_against_memory_backend() {
    let backend = MemoryBackend::new();
    let gateway = backend.gateway();

    gateway.create_index("goiot-product", &properties()).unwrap();
    assert!(backend.has_index("goiot-product"));

    let err = gateway
        .create_index("goiot-product", &properties())
        .unwrap_err();
    assert!(err.is_already_exists());
    assert_eq!(err.backend().unwrap().error_type, ALREADY_EXISTS);

    gateway.delete_index(&["goiot-product", "goiot-nothing"]).unwrap();
    assert!(!backend.has_index("goiot-product"));
    assert_eq!(backend.calls("delete_index"), 1);
}

#[test]
fn template_body() {
    let backend = MemoryBackend::new();
    let gateway = backend.gateway();
    gateway
        .create_template("goiot-device-template", "goiot-device", &properties())
        .unwrap();

    let template = backend.template("goiot-device-template").unwrap();
    assert_eq!(template["index_patterns"], json!(["goiot-device"]));
    assert_eq!(template["settings"]["number_of_shards"], "1");
    assert_eq!(template["settings"]["number_of_replicas"], "0");
    assert_eq!(template["settings"]["refresh_interval"], "10ms");
    assert_eq!(
        template["mappings"]["dynamic_templates"][0]["strings"]["mapping"]["type"],
        "keyword"
    );
    assert_eq!(template["mappings"]["properties"]["createTime"]["type"], "date");
}

#[test]
fn document_crud() {
    let backend = MemoryBackend::new();
    let gateway = backend.gateway();

    let created = gateway
        .create_doc("goiot-device", Some("d1"), &json!({"id": "d1", "state": "online"}))
        .unwrap();
    assert_eq!(created.result, "created");
    assert!(gateway
        .create_doc("goiot-device", Some("d1"), &json!({"id": "d1"}))
        .unwrap_err()
        .is_conflict());

    let generated = gateway
        .create_doc("goiot-device", None, &json!({"state": "noActive"}))
        .unwrap();
    assert!(!generated.id.is_empty());

    gateway
        .update_doc("goiot-device", "d1", &json!({"state": "offline"}))
        .unwrap();
    let stored = gateway.get_doc("goiot-device", "d1").unwrap().unwrap();
    assert_eq!(stored, json!({"id": "d1", "state": "offline"}));

    assert!(gateway.delete_doc("goiot-device", "d1").unwrap());
    assert!(!gateway.delete_doc("goiot-device", "d1").unwrap());
    assert_eq!(gateway.get_doc("goiot-device", "d1").unwrap(), None);
    assert_eq!(gateway.get_doc("goiot-absent", "d1").unwrap(), None);
}

#[test]
fn bulk_and_count() {
    let backend = MemoryBackend::new();
    let gateway = backend.gateway();

    let mut body = BulkBody::new();
    for n in 0..5 {
        body.create("goiot-alarm-log", Some(n.to_string().as_str()), &json!({"level": n % 2}))
            .unwrap();
    }
    body.raw("goiot-alarm-log", br#"{"level":1}"#).unwrap();
    let response = gateway.send_bulk(&body).unwrap();
    assert!(!response.errors);
    assert_eq!(response.items.len(), 6);
    assert_eq!(
        backend.last_request("bulk").unwrap().content_type,
        ContentType::NdJson
    );

    let high = build_filter(&[FilterTerm::eq("level", 1)]);
    assert_eq!(gateway.count(&["goiot-alarm-log"], &high).unwrap(), 3);
    assert_eq!(gateway.count(&["goiot-missing"], &high).unwrap(), 0);

    let mut again = BulkBody::new();
    again.create("goiot-alarm-log", Some("0"), &json!({})).unwrap();
    let response = gateway.send_bulk(&again).unwrap();
    assert!(response.errors);
    assert_eq!(response.first_error().unwrap().status, 409);

    assert_eq!(gateway.delete_by_query("goiot-alarm-log", &high).unwrap(), 3);
    assert_eq!(backend.doc_count("goiot-alarm-log"), 3);
}
