//! The backend gateway.
//!
//! Every request to the backend goes through [`Gateway`]: it builds the
//! request, sends it with the configured [`Transport`], and normalizes the
//! outcome. Non-success statuses become [`GatewayError::Backend`]; the
//! operations documented as tolerating 404 turn it into an empty result
//! instead.

use crate::bulk::BulkBody;
use crate::config::EsConfig;
use crate::error::{BackendError, GatewayError, GatewayResult};
use crate::http::HttpTransport;
use crate::transport::{Method, Request, Response, Transport};
use crate::wire::{
    filter_query, index_body, BulkResponse, DocResponse, RawBulkResponse, RawByQueryResponse,
    RawCountResponse, RawGetResponse, RawSearchResponse, Script, SearchQuery, SearchResponse,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Client for the backend store.
///
/// Cheap to share behind an `Arc`; it holds no mutable state besides what
/// the transport keeps.
pub struct Gateway {
    config: Arc<EsConfig>,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("config", &self.config.to_string())
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Creates a gateway with an [`HttpTransport`] built from `config`.
    pub fn new(config: EsConfig) -> GatewayResult<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    /// Creates a gateway over an existing transport.
    pub fn with_transport(config: EsConfig, transport: Arc<dyn Transport>) -> Self {
        Self {
            config: Arc::new(config),
            transport,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EsConfig {
        &self.config
    }

    /// Creates an index with the given field mappings.
    ///
    /// An existing index is reported as a backend error; check
    /// [`GatewayError::is_already_exists`] to treat it as success.
    pub fn create_index(&self, index: &str, properties: &Map<String, Value>) -> GatewayResult<()> {
        let body = index_body(
            properties,
            &self.config.number_of_shards,
            &self.config.number_of_replicas,
        );
        let request = Request::new(Method::Put, [index]).json(serde_json::to_vec(&body)?);
        self.execute(index, "create_index", request)?;
        info!(index, "index created");
        Ok(())
    }

    /// Creates or replaces an index template applying `properties` to every
    /// index matching `pattern`.
    pub fn create_template(
        &self,
        name: &str,
        pattern: &str,
        properties: &Map<String, Value>,
    ) -> GatewayResult<()> {
        let mut body = index_body(
            properties,
            &self.config.number_of_shards,
            &self.config.number_of_replicas,
        );
        if let Some(settings) = body.get_mut("settings") {
            settings["index.mapping.ignore_malformed"] = json!(true);
            if !self.config.refresh_interval.is_empty() {
                settings["refresh_interval"] = json!(self.config.refresh_interval);
            }
        }
        body.insert("index_patterns".into(), json!([pattern]));
        body.insert("order".into(), json!(0));

        let request =
            Request::new(Method::Put, ["_template", name]).json(serde_json::to_vec(&body)?);
        self.execute(name, "create_template", request)?;
        info!(template = name, pattern, "template created");
        Ok(())
    }

    /// Deletes indices. Missing indices are ignored.
    pub fn delete_index(&self, indices: &[&str]) -> GatewayResult<()> {
        let target = join_indices(indices)?;
        let request =
            Request::new(Method::Delete, [target.as_str()]).param("ignore_unavailable", "true");
        self.execute_allow_missing(&target, "delete_index", request)?;
        Ok(())
    }

    /// Creates a document. With an id, the write fails when the id is
    /// already taken ([`GatewayError::is_conflict`]).
    pub fn create_doc<T: Serialize + ?Sized>(
        &self,
        index: &str,
        id: Option<&str>,
        doc: &T,
    ) -> GatewayResult<DocResponse> {
        let path = match id {
            Some(id) => vec![index, "_create", id],
            None => vec![index, "_doc"],
        };
        let method = if id.is_some() { Method::Put } else { Method::Post };
        let request = Request::new(method, path)
            .param("refresh", "true")
            .json(serde_json::to_vec(doc)?);
        let response = self.execute(index, "create", request)?;
        decode(&response)
    }

    /// Fetches a document source by id.
    pub fn get_doc(&self, index: &str, id: &str) -> GatewayResult<Option<Value>> {
        let request = Request::new(Method::Get, [index, "_doc", id]);
        match self.execute_allow_missing(index, "get", request)? {
            Some(response) => {
                let raw: RawGetResponse = decode(&response)?;
                Ok(raw.source.filter(|_| raw.found))
            }
            None => Ok(None),
        }
    }

    /// Merges `partial` into an existing document.
    pub fn update_doc<T: Serialize + ?Sized>(
        &self,
        index: &str,
        id: &str,
        partial: &T,
    ) -> GatewayResult<DocResponse> {
        let body = serde_json::to_vec(&json!({ "doc": partial }))?;
        let request = Request::new(Method::Post, [index, "_update", id])
            .param("refresh", "true")
            .json(body);
        let response = self.execute(index, "update", request)?;
        decode(&response)
    }

    /// Deletes a document by id. Returns false when it did not exist.
    pub fn delete_doc(&self, index: &str, id: &str) -> GatewayResult<bool> {
        let request = Request::new(Method::Delete, [index, "_doc", id]).param("refresh", "true");
        Ok(self.execute_allow_missing(index, "delete", request)?.is_some())
    }

    /// Deletes every document matching `filter`. Returns the deleted count.
    pub fn delete_by_query(&self, index: &str, filter: &[Value]) -> GatewayResult<u64> {
        let body = serde_json::to_vec(&json!({ "query": filter_query(filter) }))?;
        let request = Request::new(Method::Post, [index, "_delete_by_query"])
            .param("conflicts", "proceed")
            .param("refresh", "true")
            .json(body);
        let response = self.execute(index, "delete_by_query", request)?;
        let raw: RawByQueryResponse = decode(&response)?;
        Ok(raw.deleted)
    }

    /// Runs `script` on every document matching `filter`. Returns the
    /// updated count.
    pub fn update_by_query(
        &self,
        index: &str,
        filter: &[Value],
        script: &Script,
    ) -> GatewayResult<u64> {
        let body = serde_json::to_vec(&json!({
            "query": filter_query(filter),
            "script": script,
        }))?;
        let request = Request::new(Method::Post, [index, "_update_by_query"])
            .param("conflicts", "proceed")
            .param("refresh", "true")
            .json(body);
        let response = self.execute(index, "update_by_query", request)?;
        let raw: RawByQueryResponse = decode(&response)?;
        Ok(raw.updated)
    }

    /// Sends an NDJSON bulk body.
    ///
    /// A successful call can still carry per-item failures; see
    /// [`BulkResponse::errors`].
    pub fn bulk(&self, body: &[u8]) -> GatewayResult<BulkResponse> {
        let request = Request::new(Method::Post, ["_bulk"]).ndjson(body.to_vec());
        let response = self.execute("_bulk", "bulk", request)?;
        let raw: RawBulkResponse = decode(&response)?;
        let parsed = BulkResponse::try_from(raw).map_err(|e| undecodable(&response, e))?;
        if parsed.errors {
            error!(
                failed = parsed.failed().count(),
                total = parsed.items.len(),
                "bulk request had failed items"
            );
        }
        Ok(parsed)
    }

    /// Sends a [`BulkBody`].
    pub fn send_bulk(&self, body: &BulkBody) -> GatewayResult<BulkResponse> {
        self.bulk(body.as_bytes())
    }

    /// Counts documents matching `filter`. Missing indices count as zero.
    pub fn count(&self, indices: &[&str], filter: &[Value]) -> GatewayResult<u64> {
        let target = join_indices(indices)?;
        let body = serde_json::to_vec(&json!({ "query": filter_query(filter) }))?;
        let request = Request::new(Method::Post, [target.as_str(), "_count"])
            .param("ignore_unavailable", "true")
            .json(body);
        match self.execute_allow_missing(&target, "count", request)? {
            Some(response) => {
                let raw: RawCountResponse = decode(&response)?;
                Ok(raw.count)
            }
            None => Ok(0),
        }
    }

    /// Runs a filtered search. Missing indices give an empty result.
    pub fn search(&self, indices: &[&str], query: &SearchQuery) -> GatewayResult<SearchResponse> {
        let target = join_indices(indices)?;
        let body = serde_json::to_vec(&query.to_body())?;
        let request = Request::new(Method::Post, [target.as_str(), "_search"])
            .param("ignore_unavailable", "true")
            .json(body);
        match self.execute_allow_missing(&target, "search", request)? {
            Some(response) => {
                let raw: RawSearchResponse = decode(&response)?;
                Ok(SearchResponse::from(raw))
            }
            None => Ok(SearchResponse::default()),
        }
    }

    /// Sends a request and returns the response if it succeeded.
    fn execute(&self, index: &str, op: &str, request: Request) -> GatewayResult<Response> {
        match self.execute_allow_missing(index, op, request)? {
            Some(response) => Ok(response),
            None => Err(GatewayError::Backend(BackendError::new(
                404,
                "not_found",
                format!("{index} not found"),
                "",
            ))),
        }
    }

    /// Like [`execute`](Self::execute) but maps 404 to `None`.
    fn execute_allow_missing(
        &self,
        index: &str,
        op: &str,
        request: Request,
    ) -> GatewayResult<Option<Response>> {
        if let Some(body) = &request.body {
            debug!("==> {} {} {}", index, op, String::from_utf8_lossy(body));
        } else {
            debug!("==> {} {} {}", index, op, request.path_string());
        }

        let response = self.transport.send(&request).map_err(|err| {
            error!(index, op, "request failed: {}", err);
            err
        })?;
        debug!("<== {} {} [{}] {}", index, op, response.status, response.text());

        if response.is_success() {
            return Ok(Some(response));
        }
        if response.is_not_found() {
            let err = BackendError::from_response(response.status, &response.body);
            // A 404 for a route, rather than for a document or index, is a real failure.
            if err.error_type.is_empty() || err.error_type.ends_with("not_found_exception") {
                return Ok(None);
            }
            return Err(GatewayError::Backend(err));
        }

        let err = BackendError::from_response(response.status, &response.body);
        error!(index, op, "{}", err);
        Err(GatewayError::Backend(err))
    }
}

/// Decodes a successful response body. An undecodable 2xx body is a
/// transport-class failure.
fn decode<T: DeserializeOwned>(response: &Response) -> GatewayResult<T> {
    serde_json::from_slice(&response.body).map_err(|e| undecodable(response, e))
}

fn undecodable(response: &Response, err: serde_json::Error) -> GatewayError {
    GatewayError::transport(format!(
        "undecodable response [{}]: {}: {}",
        response.status,
        err,
        response.text()
    ))
}

fn join_indices(indices: &[&str]) -> GatewayResult<String> {
    if indices.is_empty() || indices.iter().any(|index| index.is_empty()) {
        return Err(GatewayError::invalid_request("at least one index is required"));
    }
    Ok(indices.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Replays one canned response and records the request.
    struct Canned {
        status: u16,
        body: &'static str,
        seen: Mutex<Vec<Request>>,
    }

    impl Canned {
        fn gateway(status: u16, body: &'static str) -> (Gateway, Arc<Canned>) {
            let canned = Arc::new(Canned {
                status,
                body,
                seen: Mutex::new(Vec::new()),
            });
            let gateway = Gateway::with_transport(EsConfig::default(), canned.clone());
            (gateway, canned)
        }

        fn last(&self) -> Request {
            self.seen.lock().last().cloned().unwrap()
        }
    }

    impl Transport for Canned {
        fn send(&self, request: &Request) -> GatewayResult<Response> {
            self.seen.lock().push(request.clone());
            Ok(Response::new(self.status, self.body))
        }
    }

    fn body_json(request: &Request) -> Value {
        serde_json::from_slice(request.body.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn template_body() {
        let (gateway, canned) = Canned::gateway(200, r#"{"acknowledged":true}"#);
        let mut props = Map::new();
        props.insert("id".into(), json!({"type": "keyword"}));
        gateway
            .create_template("goiot-device-template", "goiot-device", &props)
            .unwrap();

        let request = canned.last();
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, vec!["_template", "goiot-device-template"]);
        let body = body_json(&request);
        assert_eq!(body["index_patterns"], json!(["goiot-device"]));
        assert_eq!(body["order"], 0);
        assert_eq!(body["settings"]["number_of_shards"], "1");
        assert_eq!(body["settings"]["number_of_replicas"], "0");
        assert_eq!(body["settings"]["index.mapping.ignore_malformed"], true);
        assert_eq!(body["settings"]["refresh_interval"], "10ms");
        assert_eq!(body["mappings"]["properties"]["id"]["type"], "keyword");
        assert_eq!(
            body["mappings"]["dynamic_templates"][0]["strings"]["mapping"]["type"],
            "keyword"
        );
    }

    #[test]
    fn already_exists_is_recognizable() {
        let (gateway, _) = Canned::gateway(
            400,
            r#"{"error":{"type":"resource_already_exists_exception","reason":"exists"},"status":400}"#,
        );
        let err = gateway.create_index("goiot-device", &Map::new()).unwrap_err();
        assert!(err.is_already_exists());
    }

    #[test]
    fn create_with_and_without_id() {
        let (gateway, canned) =
            Canned::gateway(201, r#"{"_index":"goiot-product","_id":"p1","result":"created"}"#);
        let response = gateway
            .create_doc("goiot-product", Some("p1"), &json!({"id": "p1"}))
            .unwrap();
        assert_eq!(response.id, "p1");
        let request = canned.last();
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.path, vec!["goiot-product", "_create", "p1"]);
        assert_eq!(request.query_param("refresh"), Some("true"));

        gateway
            .create_doc("goiot-product", None, &json!({"name": "x"}))
            .unwrap();
        let request = canned.last();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.path, vec!["goiot-product", "_doc"]);
    }

    #[test]
    fn missing_index_search_is_empty() {
        let (gateway, canned) = Canned::gateway(
            404,
            r#"{"error":{"type":"index_not_found_exception","reason":"no such index"},"status":404}"#,
        );
        let response = gateway
            .search(&["goiot-device"], &SearchQuery::default())
            .unwrap();
        assert_eq!(response.total, 0);
        assert!(response.hits.is_empty());
        assert_eq!(canned.last().query_param("ignore_unavailable"), Some("true"));

        assert_eq!(gateway.count(&["goiot-device"], &[]).unwrap(), 0);
        assert_eq!(gateway.get_doc("goiot-device", "1").unwrap(), None);
        assert!(!gateway.delete_doc("goiot-device", "1").unwrap());
    }

    #[test]
    fn undecodable_success_is_transport() {
        let (gateway, _) = Canned::gateway(200, "<html>proxy</html>");
        let err = gateway.count(&["goiot-device"], &[]).unwrap_err();
        assert!(err.is_transport());
    }

    #[test]
    fn server_error_is_backend() {
        let (gateway, _) = Canned::gateway(
            500,
            r#"{"error":{"type":"search_phase_execution_exception","reason":"all shards failed"}}"#,
        );
        let err = gateway
            .search(&["goiot-device"], &SearchQuery::default())
            .unwrap_err();
        let backend = err.backend().unwrap();
        assert_eq!(backend.status, 500);
        assert_eq!(backend.error_type, "search_phase_execution_exception");
    }

    #[test]
    fn search_requires_an_index() {
        let (gateway, canned) = Canned::gateway(200, "{}");
        assert!(matches!(
            gateway.search(&[], &SearchQuery::default()),
            Err(GatewayError::InvalidRequest(_))
        ));
        assert!(canned.seen.lock().is_empty());
    }

    #[test]
    fn by_query_requests() {
        let (gateway, canned) = Canned::gateway(200, r#"{"updated": 3, "deleted": 0}"#);
        let script = Script::painless("ctx._source.state = params.state", Map::new());
        let updated = gateway
            .update_by_query("goiot-device", &[json!({"term": {"productId": "p1"}})], &script)
            .unwrap();
        assert_eq!(updated, 3);

        let request = canned.last();
        assert_eq!(request.path, vec!["goiot-device", "_update_by_query"]);
        assert_eq!(request.query_param("conflicts"), Some("proceed"));
        let body = body_json(&request);
        assert_eq!(body["query"]["bool"]["filter"][0]["term"]["productId"], "p1");
        assert_eq!(body["script"]["lang"], "painless");
    }

    #[test]
    fn bulk_is_ndjson() {
        let (gateway, canned) = Canned::gateway(200, r#"{"errors":false,"items":[]}"#);
        let mut body = BulkBody::new();
        body.delete("goiot-device", "1").unwrap();
        let response = gateway.send_bulk(&body).unwrap();
        assert!(!response.errors);

        let request = canned.last();
        assert_eq!(request.path, vec!["_bulk"]);
        assert_eq!(request.content_type, crate::transport::ContentType::NdJson);
    }
}
