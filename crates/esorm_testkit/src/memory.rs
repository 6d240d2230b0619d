//! In-memory backend emulation.
//!
//! [`MemoryBackend`] implements [`Transport`] over plain maps and answers
//! the requests the gateway issues the way the real store does: same routes,
//! same status codes, same error types. It understands the filter clauses
//! produced by `build_filter`, sorting with cursors, source projection,
//! the assignment scripts produced by `QuerySet::update`, and NDJSON bulk
//! bodies.

use esorm_gateway::{
    EsConfig, Gateway, GatewayError, GatewayResult, Method, Request, Response, Transport,
};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use tracing::trace;

type Documents = BTreeMap<String, Value>;

/// Something queued with [`MemoryBackend::fail_next`] or
/// [`MemoryBackend::disconnect_next`].
#[derive(Debug, Clone)]
enum Injected {
    Response(Response),
    Disconnect(String),
}

#[derive(Debug, Default)]
struct State {
    indices: BTreeMap<String, Documents>,
    templates: BTreeMap<String, Value>,
    requests: Vec<Request>,
    calls: HashMap<&'static str, usize>,
    injected: HashMap<&'static str, VecDeque<Injected>>,
    next_id: u64,
}

/// An in-memory document store speaking the gateway's wire protocol.
///
/// Writes are visible immediately, as if every request carried
/// `refresh=true`. Documents of an index are kept ordered by id, which is
/// also the final sort tiebreaker.
///
/// Endpoints, as used by [`calls`](Self::calls) and
/// [`fail_next`](Self::fail_next): `create_index`, `delete_index`,
/// `template`, `create`, `index`, `get`, `update`, `delete`, `search`,
/// `count`, `delete_by_query`, `update_by_query`, `bulk`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    state: Mutex<State>,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates a gateway over this backend with default configuration.
    pub fn gateway(self: &Arc<Self>) -> Gateway {
        self.gateway_with(EsConfig::default())
    }

    /// Creates a gateway over this backend.
    pub fn gateway_with(self: &Arc<Self>, config: EsConfig) -> Gateway {
        Gateway::with_transport(config, Arc::clone(self) as Arc<dyn Transport>)
    }

    /// Number of requests received for an endpoint.
    pub fn calls(&self, endpoint: &str) -> usize {
        self.state.lock().calls.get(endpoint).copied().unwrap_or(0)
    }

    /// Number of requests received in total.
    pub fn total_calls(&self) -> usize {
        self.state.lock().requests.len()
    }

    /// Every request received, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.state.lock().requests.clone()
    }

    /// The last request received for an endpoint.
    pub fn last_request(&self, endpoint: &str) -> Option<Request> {
        let state = self.state.lock();
        state
            .requests
            .iter()
            .rev()
            .find(|request| endpoint_of(request) == endpoint)
            .cloned()
    }

    /// Decoded JSON body of the last request for an endpoint.
    pub fn last_body(&self, endpoint: &str) -> Option<Value> {
        self.last_request(endpoint)
            .and_then(|request| request.body)
            .and_then(|body| serde_json::from_slice(&body).ok())
    }

    /// Forgets the request log and call counts, keeping the data.
    pub fn clear_log(&self) {
        let mut state = self.state.lock();
        state.requests.clear();
        state.calls.clear();
    }

    /// Answers the next request for `endpoint` with `response` instead of
    /// handling it. Queued responses are used in order.
    pub fn fail_next(&self, endpoint: &'static str, response: Response) {
        self.inject(endpoint, Injected::Response(response));
    }

    /// Fails the next request for `endpoint` with a transport error.
    pub fn disconnect_next(&self, endpoint: &'static str, message: impl Into<String>) {
        self.inject(endpoint, Injected::Disconnect(message.into()));
    }

    fn inject(&self, endpoint: &'static str, injected: Injected) {
        self.state
            .lock()
            .injected
            .entry(endpoint)
            .or_default()
            .push_back(injected);
    }

    /// Stored body of a template.
    pub fn template(&self, name: &str) -> Option<Value> {
        self.state.lock().templates.get(name).cloned()
    }

    /// Returns true when the index exists.
    pub fn has_index(&self, index: &str) -> bool {
        self.state.lock().indices.contains_key(index)
    }

    /// Every document of an index, ordered by id.
    pub fn documents(&self, index: &str) -> Vec<Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .map(|docs| docs.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One stored document.
    pub fn document(&self, index: &str, id: &str) -> Option<Value> {
        self.state
            .lock()
            .indices
            .get(index)
            .and_then(|docs| docs.get(id).cloned())
    }

    /// Number of documents in an index.
    pub fn doc_count(&self, index: &str) -> usize {
        self.state.lock().indices.get(index).map_or(0, BTreeMap::len)
    }

    /// Stores a document directly, bypassing the request log.
    pub fn put_document(&self, index: &str, id: &str, source: Value) {
        self.state
            .lock()
            .indices
            .entry(index.to_string())
            .or_default()
            .insert(id.to_string(), source);
    }
}

impl Transport for MemoryBackend {
    fn send(&self, request: &Request) -> GatewayResult<Response> {
        let endpoint = endpoint_of(request);
        let mut state = self.state.lock();
        state.requests.push(request.clone());
        *state.calls.entry(endpoint).or_default() += 1;
        trace!(endpoint, path = %request.path_string(), "memory backend request");

        if let Some(injected) = state
            .injected
            .get_mut(endpoint)
            .and_then(VecDeque::pop_front)
        {
            return match injected {
                Injected::Response(response) => Ok(response),
                Injected::Disconnect(message) => Err(GatewayError::transport(message)),
            };
        }

        let body = match &request.body {
            Some(bytes) if request.content_type == esorm_gateway::ContentType::Json => {
                match serde_json::from_slice::<Value>(bytes) {
                    Ok(value) => value,
                    Err(err) => return Ok(error_response(400, "parse_exception", &err.to_string())),
                }
            }
            _ => Value::Null,
        };

        Ok(state.handle(endpoint, request, body))
    }
}

/// Classifies a request by the route it hits.
fn endpoint_of(request: &Request) -> &'static str {
    let segments: Vec<&str> = request.path.iter().map(String::as_str).collect();
    match (request.method, segments.as_slice()) {
        (_, ["_template", ..]) => "template",
        (_, ["_bulk"]) => "bulk",
        (Method::Put, [_]) => "create_index",
        (Method::Delete, [_]) => "delete_index",
        (_, [_, "_create", _]) => "create",
        (Method::Post, [_, "_doc"]) | (Method::Put, [_, "_doc", _]) => "index",
        (Method::Get, [_, "_doc", _]) => "get",
        (Method::Delete, [_, "_doc", _]) => "delete",
        (_, [_, "_update", _]) => "update",
        (_, [_, "_search"]) => "search",
        (_, [_, "_count"]) => "count",
        (_, [_, "_delete_by_query"]) => "delete_by_query",
        (_, [_, "_update_by_query"]) => "update_by_query",
        _ => "unknown",
    }
}

impl State {
    fn handle(&mut self, endpoint: &str, request: &Request, body: Value) -> Response {
        let path = &request.path;
        let ignore_unavailable = request.query_param("ignore_unavailable") == Some("true");
        match endpoint {
            "template" => self.put_template(path.get(1), body),
            "bulk" => self.bulk(request.body.as_deref().unwrap_or_default()),
            "create_index" => self.create_index(&path[0]),
            "delete_index" => self.delete_index(&path[0], ignore_unavailable),
            "create" => self.create(&path[0], &path[2], body),
            "index" => {
                let id = match path.get(2) {
                    Some(id) => id.clone(),
                    None => self.generate_id(),
                };
                self.index(&path[0], &id, body)
            }
            "get" => self.get(&path[0], &path[2]),
            "delete" => self.delete(&path[0], &path[2]),
            "update" => self.update(&path[0], &path[2], &body),
            "search" => self.search(&path[0], &body, ignore_unavailable),
            "count" => self.count(&path[0], &body, ignore_unavailable),
            "delete_by_query" => self.delete_by_query(&path[0], &body),
            "update_by_query" => self.update_by_query(&path[0], &body),
            _ => error_response(
                400,
                "illegal_argument_exception",
                &format!("no handler for {} {}", request.method, request.path_string()),
            ),
        }
    }

    fn generate_id(&mut self) -> String {
        self.next_id += 1;
        format!("auto-{:08}", self.next_id)
    }

    fn put_template(&mut self, name: Option<&String>, body: Value) -> Response {
        match name {
            Some(name) => {
                self.templates.insert(name.clone(), body);
                ok(json!({ "acknowledged": true }))
            }
            None => error_response(400, "action_request_validation_exception", "name is missing"),
        }
    }

    fn create_index(&mut self, index: &str) -> Response {
        if self.indices.contains_key(index) {
            return error_response(
                400,
                esorm_gateway::ALREADY_EXISTS,
                &format!("index [{index}] already exists"),
            );
        }
        self.indices.insert(index.to_string(), Documents::new());
        ok(json!({ "acknowledged": true, "index": index }))
    }

    fn delete_index(&mut self, target: &str, ignore_unavailable: bool) -> Response {
        let names = self.resolve(target);
        if names.is_empty() && !ignore_unavailable {
            return index_not_found(target);
        }
        for name in names {
            self.indices.remove(&name);
        }
        ok(json!({ "acknowledged": true }))
    }

    /// Expands a comma separated target, with `*` suffix wildcards, into the
    /// existing index names.
    fn resolve(&self, target: &str) -> Vec<String> {
        let mut names = Vec::new();
        for part in target.split(',') {
            match part.strip_suffix('*') {
                Some(prefix) => names.extend(
                    self.indices
                        .keys()
                        .filter(|name| name.starts_with(prefix))
                        .cloned(),
                ),
                None if self.indices.contains_key(part) => names.push(part.to_string()),
                None => {}
            }
        }
        names.dedup();
        names
    }

    fn create(&mut self, index: &str, id: &str, source: Value) -> Response {
        let docs = self.indices.entry(index.to_string()).or_default();
        if docs.contains_key(id) {
            return version_conflict(index, id);
        }
        docs.insert(id.to_string(), source);
        doc_result(201, index, id, "created")
    }

    fn index(&mut self, index: &str, id: &str, source: Value) -> Response {
        let docs = self.indices.entry(index.to_string()).or_default();
        let (status, result) = match docs.insert(id.to_string(), source) {
            Some(_) => (200, "updated"),
            None => (201, "created"),
        };
        doc_result(status, index, id, result)
    }

    fn get(&self, index: &str, id: &str) -> Response {
        let Some(docs) = self.indices.get(index) else {
            return index_not_found(index);
        };
        match docs.get(id) {
            Some(source) => ok(json!({
                "_index": index,
                "_id": id,
                "found": true,
                "_source": source,
            })),
            None => Response::new(
                404,
                json!({ "_index": index, "_id": id, "found": false }).to_string(),
            ),
        }
    }

    fn delete(&mut self, index: &str, id: &str) -> Response {
        let Some(docs) = self.indices.get_mut(index) else {
            return index_not_found(index);
        };
        match docs.remove(id) {
            Some(_) => doc_result(200, index, id, "deleted"),
            None => doc_result(404, index, id, "not_found"),
        }
    }

    fn update(&mut self, index: &str, id: &str, body: &Value) -> Response {
        let Some(source) = self
            .indices
            .get_mut(index)
            .and_then(|docs| docs.get_mut(id))
        else {
            return document_missing(index, id);
        };
        let Some(partial) = body.get("doc").and_then(Value::as_object) else {
            return error_response(400, "action_request_validation_exception", "doc is missing");
        };
        merge(source, partial);
        doc_result(200, index, id, "updated")
    }

    /// Collects `(index, id, source)` of every document matching `query`.
    fn matching(
        &self,
        names: &[String],
        query: &Value,
    ) -> Result<Vec<(String, String, Value)>, String> {
        let mut found = Vec::new();
        for name in names {
            let Some(docs) = self.indices.get(name) else {
                continue;
            };
            for (id, source) in docs {
                if matches(query, source)? {
                    found.push((name.clone(), id.clone(), source.clone()));
                }
            }
        }
        Ok(found)
    }

    fn search(&self, target: &str, body: &Value, ignore_unavailable: bool) -> Response {
        let names = self.resolve(target);
        if names.is_empty() && !ignore_unavailable {
            return index_not_found(target);
        }
        let query = body.get("query").cloned().unwrap_or(json!({ "match_all": {} }));
        let mut found = match self.matching(&names, &query) {
            Ok(found) => found,
            Err(reason) => return error_response(400, "parsing_exception", &reason),
        };
        let total = found.len();

        let sort = match parse_sort(body.get("sort")) {
            Ok(sort) => sort,
            Err(reason) => return error_response(400, "parsing_exception", &reason),
        };
        if !sort.is_empty() {
            found.sort_by(|a, b| compare_by(&sort, &a.2, &b.2).then_with(|| a.1.cmp(&b.1)));
        }

        if let Some(cursor) = body.get("search_after").and_then(Value::as_array) {
            if sort.is_empty() {
                return error_response(
                    400,
                    "illegal_argument_exception",
                    "search_after requires a sort",
                );
            }
            found.retain(|(_, _, source)| after_cursor(&sort, source, cursor));
        }

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let includes = source_includes(body.get("_source"));

        let hits: Vec<Value> = found
            .into_iter()
            .skip(from)
            .take(size)
            .map(|(index, id, source)| {
                let mut hit = json!({
                    "_index": index,
                    "_id": id,
                    "_score": Value::Null,
                    "_source": project(&source, includes.as_deref()),
                });
                if !sort.is_empty() {
                    let values: Vec<Value> = sort
                        .iter()
                        .map(|(field, _)| lookup(&source, field).cloned().unwrap_or(Value::Null))
                        .collect();
                    hit["sort"] = Value::Array(values);
                }
                hit
            })
            .collect();

        ok(json!({
            "took": 1,
            "timed_out": false,
            "hits": {
                "total": { "value": total, "relation": "eq" },
                "max_score": Value::Null,
                "hits": hits,
            }
        }))
    }

    fn count(&self, target: &str, body: &Value, ignore_unavailable: bool) -> Response {
        let names = self.resolve(target);
        if names.is_empty() && !ignore_unavailable {
            return index_not_found(target);
        }
        let query = body.get("query").cloned().unwrap_or(json!({ "match_all": {} }));
        match self.matching(&names, &query) {
            Ok(found) => ok(json!({ "count": found.len() })),
            Err(reason) => error_response(400, "parsing_exception", &reason),
        }
    }

    fn delete_by_query(&mut self, index: &str, body: &Value) -> Response {
        let names = self.resolve(index);
        if names.is_empty() {
            return index_not_found(index);
        }
        let query = body.get("query").cloned().unwrap_or(Value::Null);
        let found = match self.matching(&names, &query) {
            Ok(found) => found,
            Err(reason) => return error_response(400, "parsing_exception", &reason),
        };
        for (name, id, _) in &found {
            if let Some(docs) = self.indices.get_mut(name) {
                docs.remove(id);
            }
        }
        ok(json!({ "total": found.len(), "deleted": found.len(), "failures": [] }))
    }

    fn update_by_query(&mut self, index: &str, body: &Value) -> Response {
        let names = self.resolve(index);
        if names.is_empty() {
            return index_not_found(index);
        }
        let script = body.get("script").cloned().unwrap_or(Value::Null);
        let assignments = match parse_script(&script) {
            Ok(assignments) => assignments,
            Err(reason) => return error_response(400, "script_exception", &reason),
        };
        let query = body.get("query").cloned().unwrap_or(Value::Null);
        let found = match self.matching(&names, &query) {
            Ok(found) => found,
            Err(reason) => return error_response(400, "parsing_exception", &reason),
        };
        for (name, id, _) in &found {
            if let Some(Value::Object(source)) =
                self.indices.get_mut(name).and_then(|docs| docs.get_mut(id))
            {
                for (field, value) in &assignments {
                    source.insert(field.clone(), value.clone());
                }
            }
        }
        ok(json!({ "total": found.len(), "updated": found.len(), "failures": [] }))
    }

    fn bulk(&mut self, body: &[u8]) -> Response {
        let text = String::from_utf8_lossy(body);
        let mut lines = text.lines().filter(|line| !line.trim().is_empty());
        let mut items = Vec::new();
        let mut errors = false;

        while let Some(line) = lines.next() {
            let meta: Map<String, Value> = match serde_json::from_str(line) {
                Ok(meta) => meta,
                Err(err) => {
                    return error_response(400, "illegal_argument_exception", &err.to_string())
                }
            };
            let Some((action, target)) = meta.into_iter().next() else {
                return error_response(400, "illegal_argument_exception", "empty action line");
            };
            let index = target
                .get("_index")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let id = target.get("_id").and_then(Value::as_str).map(String::from);

            let source = if action == "delete" {
                Value::Null
            } else {
                match lines.next().map(serde_json::from_str::<Value>) {
                    Some(Ok(source)) => source,
                    Some(Err(err)) => {
                        return error_response(400, "illegal_argument_exception", &err.to_string())
                    }
                    None => {
                        return error_response(
                            400,
                            "illegal_argument_exception",
                            "action is missing its source line",
                        )
                    }
                }
            };

            let item = self.bulk_item(&action, &index, id, source);
            errors |= item.get("error").is_some();
            items.push(json!({ action: item }));
        }

        ok(json!({ "took": 1, "errors": errors, "items": items }))
    }

    fn bulk_item(&mut self, action: &str, index: &str, id: Option<String>, source: Value) -> Value {
        let id = match id {
            Some(id) => id,
            None if action == "index" || action == "create" => self.generate_id(),
            None => {
                return json!({
                    "_index": index,
                    "status": 400,
                    "error": { "type": "action_request_validation_exception", "reason": "id is missing" },
                })
            }
        };
        let response = match action {
            "create" => self.create(index, &id, source),
            "index" => self.index(index, &id, source),
            "update" => self.update(index, &id, &source),
            "delete" => match self.indices.get_mut(index).and_then(|docs| docs.remove(&id)) {
                Some(_) => doc_result(200, index, &id, "deleted"),
                None => doc_result(404, index, &id, "not_found"),
            },
            other => error_response(
                400,
                "illegal_argument_exception",
                &format!("unknown bulk action [{other}]"),
            ),
        };

        let parsed: Value = serde_json::from_slice(&response.body).unwrap_or(Value::Null);
        let mut item = json!({ "_index": index, "_id": id, "status": response.status });
        if let Some(result) = parsed.get("result") {
            item["result"] = result.clone();
        }
        if let Some(error) = parsed.get("error") {
            item["error"] = error.clone();
        }
        item
    }
}

fn ok(body: Value) -> Response {
    Response::new(200, body.to_string())
}

fn doc_result(status: u16, index: &str, id: &str, result: &str) -> Response {
    Response::new(
        status,
        json!({ "_index": index, "_id": id, "result": result }).to_string(),
    )
}

fn error_response(status: u16, error_type: &str, reason: &str) -> Response {
    Response::new(
        status,
        json!({
            "error": {
                "root_cause": [{ "type": error_type, "reason": reason }],
                "type": error_type,
                "reason": reason,
            },
            "status": status,
        })
        .to_string(),
    )
}

fn index_not_found(index: &str) -> Response {
    error_response(404, "index_not_found_exception", &format!("no such index [{index}]"))
}

fn document_missing(index: &str, id: &str) -> Response {
    error_response(
        404,
        "document_missing_exception",
        &format!("[{id}]: document missing in [{index}]"),
    )
}

fn version_conflict(index: &str, id: &str) -> Response {
    error_response(
        409,
        "version_conflict_engine_exception",
        &format!("[{id}]: version conflict, document already exists in [{index}]"),
    )
}

/// Shallow merge, the way a partial document update behaves for top-level
/// fields.
fn merge(target: &mut Value, partial: &Map<String, Value>) {
    if let Value::Object(target) = target {
        for (key, value) in partial {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Resolves a dotted field path.
fn lookup<'a>(source: &'a Value, field: &str) -> Option<&'a Value> {
    let mut current = source;
    for part in field.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Evaluates a query clause against a document source.
fn matches(query: &Value, source: &Value) -> Result<bool, String> {
    let Some(clause) = query.as_object() else {
        return Ok(true);
    };
    let Some((kind, spec)) = clause.iter().next() else {
        return Ok(true);
    };
    match kind.as_str() {
        "match_all" => Ok(true),
        "bool" => {
            for key in ["filter", "must"] {
                for inner in clauses(spec.get(key)) {
                    if !matches(inner, source)? {
                        return Ok(false);
                    }
                }
            }
            for inner in clauses(spec.get("must_not")) {
                if matches(inner, source)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "term" => {
            let (field, expected) = single_field(spec)?;
            let expected = expected.get("value").unwrap_or(expected);
            Ok(field_values(source, field).any(|actual| loose_eq(actual, expected)))
        }
        "terms" => {
            let (field, expected) = single_field(spec)?;
            let expected = expected
                .as_array()
                .ok_or_else(|| format!("[terms] on [{field}] requires an array"))?;
            Ok(field_values(source, field)
                .any(|actual| expected.iter().any(|value| loose_eq(actual, value))))
        }
        "prefix" => {
            let (field, expected) = single_field(spec)?;
            let expected = expected.get("value").unwrap_or(expected);
            let prefix = scalar_text(expected);
            Ok(field_values(source, field).any(|actual| scalar_text(actual).starts_with(&prefix)))
        }
        "range" => {
            let (field, bounds) = single_field(spec)?;
            let bounds = bounds
                .as_object()
                .ok_or_else(|| format!("[range] on [{field}] requires bounds"))?;
            Ok(field_values(source, field).any(|actual| {
                bounds.iter().all(|(op, bound)| {
                    let ordering = compare_values(actual, bound);
                    match op.as_str() {
                        "gt" => ordering == Ordering::Greater,
                        "gte" => ordering != Ordering::Less,
                        "lt" => ordering == Ordering::Less,
                        "lte" => ordering != Ordering::Greater,
                        _ => true,
                    }
                })
            }))
        }
        "exists" => {
            let field = spec
                .get("field")
                .and_then(Value::as_str)
                .ok_or("[exists] requires a field")?;
            Ok(field_values(source, field).next().is_some())
        }
        other => Err(format!("unknown query [{other}]")),
    }
}

fn clauses(value: Option<&Value>) -> Vec<&Value> {
    match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(single) => vec![single],
    }
}

fn single_field(spec: &Value) -> Result<(&str, &Value), String> {
    spec.as_object()
        .and_then(|map| map.iter().next())
        .map(|(field, value)| (field.as_str(), value))
        .ok_or_else(|| format!("malformed clause {spec}"))
}

/// Non-null values of a field; array fields contribute every element.
fn field_values<'a>(source: &'a Value, field: &str) -> impl Iterator<Item = &'a Value> {
    let values: Vec<&Value> = match lookup(source, field) {
        Some(Value::Array(items)) => items.iter().filter(|v| !v.is_null()).collect(),
        Some(Value::Null) | None => Vec::new(),
        Some(value) => vec![value],
    };
    values.into_iter()
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Equality across JSON types the way keyword and numeric fields compare:
/// `"42"` equals `42`.
fn loose_eq(actual: &Value, expected: &Value) -> bool {
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(b)) => a == b,
        _ => scalar_text(actual) == scalar_text(expected),
    }
}

/// Orders numbers numerically (numeric strings included) and everything
/// else by text.
fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (numeric(a), numeric(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => scalar_text(a).cmp(&scalar_text(b)),
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(f64::from(u8::from(*b))),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Asc,
    Desc,
}

fn parse_sort(sort: Option<&Value>) -> Result<Vec<(String, Direction)>, String> {
    let mut keys = Vec::new();
    for entry in clauses(sort) {
        match entry {
            Value::String(field) => keys.push((field.clone(), Direction::Asc)),
            Value::Object(map) => {
                for (field, spec) in map {
                    let order = spec
                        .get("order")
                        .and_then(Value::as_str)
                        .or_else(|| spec.as_str())
                        .unwrap_or("asc");
                    let direction = match order {
                        "asc" => Direction::Asc,
                        "desc" => Direction::Desc,
                        other => return Err(format!("unknown sort order [{other}]")),
                    };
                    keys.push((field.clone(), direction));
                }
            }
            other => return Err(format!("malformed sort {other}")),
        }
    }
    Ok(keys)
}

/// Missing values sort last in either direction.
fn compare_key(a: Option<&Value>, b: Option<&Value>, direction: Direction) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => match direction {
            Direction::Asc => compare_values(a, b),
            Direction::Desc => compare_values(b, a),
        },
    }
}

fn compare_by(sort: &[(String, Direction)], a: &Value, b: &Value) -> Ordering {
    for (field, direction) in sort {
        let ordering = compare_key(lookup(a, field), lookup(b, field), *direction);
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn after_cursor(sort: &[(String, Direction)], source: &Value, cursor: &[Value]) -> bool {
    for ((field, direction), bound) in sort.iter().zip(cursor) {
        let ordering = compare_key(lookup(source, field), Some(bound), *direction);
        if ordering != Ordering::Equal {
            return ordering == Ordering::Greater;
        }
    }
    false
}

fn source_includes(spec: Option<&Value>) -> Option<Vec<String>> {
    let list = match spec? {
        Value::Array(items) => items,
        Value::Object(map) => map.get("includes")?.as_array()?,
        Value::String(field) => return Some(vec![field.clone()]),
        _ => return None,
    };
    Some(
        list.iter()
            .filter_map(Value::as_str)
            .map(String::from)
            .collect(),
    )
}

fn project(source: &Value, includes: Option<&[String]>) -> Value {
    match (includes, source) {
        (Some(fields), Value::Object(map)) => Value::Object(
            map.iter()
                .filter(|(key, _)| fields.iter().any(|field| field == *key))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        ),
        _ => source.clone(),
    }
}

/// Parses scripts made of `ctx._source['field'] = params['key']`
/// statements joined with `;`.
fn parse_script(script: &Value) -> Result<Vec<(String, Value)>, String> {
    let source = script
        .get("source")
        .and_then(Value::as_str)
        .ok_or("script source is missing")?;
    let params = script
        .get("params")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let mut assignments = Vec::new();
    for statement in source.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (target, value) = statement
            .split_once('=')
            .ok_or_else(|| format!("unsupported statement [{statement}]"))?;
        let field = quoted(target.trim(), "ctx._source[")
            .ok_or_else(|| format!("unsupported assignment target [{target}]"))?;
        let key = quoted(value.trim(), "params[")
            .ok_or_else(|| format!("unsupported assignment value [{value}]"))?;
        let value = params
            .get(key)
            .cloned()
            .ok_or_else(|| format!("missing parameter [{key}]"))?;
        assignments.push((field.to_string(), value));
    }
    Ok(assignments)
}

/// Extracts `name` from `<prefix>'name']`.
fn quoted<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    text.strip_prefix(prefix)?
        .strip_prefix('\'')?
        .strip_suffix("']")
}
