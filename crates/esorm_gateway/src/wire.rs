//! Request and response bodies exchanged with the backend.

use crate::error::BackendError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Date pattern used for every `date` field mapping.
pub const DEFAULT_DATE_FORMAT: &str =
    "yyyy-MM||yyyy-MM-dd||yyyy-MM-dd HH:mm:ss||yyyy-MM-dd HH:mm:ss.SSS||epoch_millis";

/// A field mapping inside `mappings.properties`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Property {
    /// Backend field type (`keyword`, `long`, `date`, ...).
    #[serde(rename = "type")]
    pub field_type: String,
    /// Date format, only for `date` fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

impl Property {
    /// Creates a mapping of the given type.
    pub fn of(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            format: None,
        }
    }

    /// Creates a `date` mapping with [`DEFAULT_DATE_FORMAT`].
    pub fn date() -> Self {
        Self {
            field_type: "date".into(),
            format: Some(DEFAULT_DATE_FORMAT.into()),
        }
    }
}

/// Builds the `settings` + `mappings` part shared by index and template
/// creation, including the catch-all string→keyword dynamic template.
pub(crate) fn index_body(
    properties: &Map<String, Value>,
    shards: &str,
    replicas: &str,
) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert(
        "settings".into(),
        json!({
            "number_of_shards": shards,
            "number_of_replicas": replicas,
        }),
    );
    body.insert(
        "mappings".into(),
        json!({
            "properties": properties,
            "dynamic_templates": [
                {"strings": {"match_mapping_type": "string", "match": "*", "mapping": {"type": "keyword"}}}
            ],
        }),
    );
    body
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    /// Ascending.
    Asc,
    /// Descending.
    Desc,
}

/// One sort key of a search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortField {
    /// Field name as stored.
    pub field: String,
    /// Direction.
    pub order: SortOrder,
}

impl SortField {
    /// Ascending sort on `field`.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    /// Descending sort on `field`.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    fn to_json(&self) -> Value {
        let mut entry = Map::new();
        entry.insert(self.field.clone(), json!({ "order": self.order }));
        Value::Object(entry)
    }
}

/// A filtered search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    /// Offset of the first hit.
    pub from: usize,
    /// Page size.
    pub size: usize,
    /// Filter clauses, combined conjunctively.
    pub filter: Vec<Value>,
    /// Sort keys in priority order.
    pub sort: Vec<SortField>,
    /// Projected source fields; empty means the whole document.
    pub includes: Vec<String>,
    /// Cursor from the previous page's last hit.
    pub search_after: Vec<Value>,
}

impl Default for SearchQuery {
    fn default() -> Self {
        Self {
            from: 0,
            size: 10,
            filter: Vec::new(),
            sort: Vec::new(),
            includes: Vec::new(),
            search_after: Vec::new(),
        }
    }
}

impl SearchQuery {
    /// Builds the JSON body. A cursor overrides `from`.
    pub fn to_body(&self) -> Value {
        let mut body = Map::new();
        body.insert("from".into(), json!(self.from));
        body.insert("size".into(), json!(self.size));
        body.insert("query".into(), filter_query(&self.filter));
        if !self.includes.is_empty() {
            body.insert("_source".into(), json!(self.includes));
        }
        if !self.sort.is_empty() {
            let sort: Vec<Value> = self.sort.iter().map(SortField::to_json).collect();
            body.insert("sort".into(), Value::Array(sort));
        }
        if !self.search_after.is_empty() {
            body.insert("from".into(), json!(0));
            body.insert("search_after".into(), json!(self.search_after));
        }
        Value::Object(body)
    }
}

/// Wraps filter clauses into `{"bool": {"filter": [...]}}`.
pub fn filter_query(filter: &[Value]) -> Value {
    json!({ "bool": { "filter": filter } })
}

/// A painless script for update-by-query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Script {
    /// Script source.
    pub source: String,
    /// Script parameters.
    pub params: Map<String, Value>,
    /// Script language.
    pub lang: String,
}

impl Script {
    /// Creates a painless script.
    pub fn painless(source: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            source: source.into(),
            params,
            lang: "painless".into(),
        }
    }
}

/// Result of a filtered search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResponse {
    /// Total matching documents.
    pub total: u64,
    /// `_source` of each hit, in hit order.
    pub hits: Vec<Value>,
    /// Sort values of the last hit, usable as the next cursor.
    pub last_sort: Option<Vec<Value>>,
}

impl SearchResponse {
    /// Returns the first hit's source.
    pub fn first_source(&self) -> Option<&Value> {
        self.hits.first()
    }

    /// Deserializes every hit into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> serde_json::Result<Vec<T>> {
        self.hits
            .iter()
            .map(|hit| T::deserialize(hit))
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTotal {
    Object { value: u64 },
    Number(u64),
}

#[derive(Deserialize)]
struct RawHit {
    #[serde(rename = "_source", default)]
    source: Value,
    #[serde(default)]
    sort: Option<Vec<Value>>,
}

#[derive(Deserialize, Default)]
struct RawHits {
    total: Option<RawTotal>,
    #[serde(default)]
    hits: Vec<RawHit>,
}

#[derive(Deserialize)]
pub(crate) struct RawSearchResponse {
    #[serde(default)]
    hits: RawHits,
}

impl From<RawSearchResponse> for SearchResponse {
    fn from(raw: RawSearchResponse) -> Self {
        let total = match raw.hits.total {
            Some(RawTotal::Object { value }) | Some(RawTotal::Number(value)) => value,
            None => 0,
        };
        let last_sort = raw.hits.hits.last().and_then(|hit| hit.sort.clone());
        let hits = raw.hits.hits.into_iter().map(|hit| hit.source).collect();
        Self {
            total,
            hits,
            last_sort,
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct RawCountResponse {
    #[serde(default)]
    pub count: u64,
}

#[derive(Deserialize)]
pub(crate) struct RawByQueryResponse {
    #[serde(default)]
    pub deleted: u64,
    #[serde(default)]
    pub updated: u64,
}

/// Response to a single document write.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DocResponse {
    /// Index the document was written to.
    #[serde(rename = "_index", default)]
    pub index: String,
    /// Document id.
    #[serde(rename = "_id", default)]
    pub id: String,
    /// `created`, `updated`, `deleted`, `not_found`, ...
    #[serde(default)]
    pub result: String,
}

#[derive(Deserialize)]
pub(crate) struct RawGetResponse {
    #[serde(default)]
    pub found: bool,
    #[serde(rename = "_source", default)]
    pub source: Option<Value>,
}

/// Outcome of one action in a bulk request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    /// Action name (`create`, `index`, `update`, `delete`).
    pub action: String,
    /// Target index.
    pub index: String,
    /// Document id.
    pub id: String,
    /// Per-item status.
    pub status: u16,
    /// Normalized error when the item failed.
    pub error: Option<BackendError>,
}

/// Result of a bulk request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkResponse {
    /// Whether any item failed.
    pub errors: bool,
    /// Items in request order.
    pub items: Vec<BulkItem>,
}

impl BulkResponse {
    /// Returns the items that failed.
    pub fn failed(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().filter(|item| item.error.is_some())
    }

    /// Returns the error of the first failed item.
    pub fn first_error(&self) -> Option<&BackendError> {
        self.items.iter().find_map(|item| item.error.as_ref())
    }
}

#[derive(Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: String,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct RawBulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Map<String, Value>>,
}

impl TryFrom<RawBulkResponse> for BulkResponse {
    type Error = serde_json::Error;

    fn try_from(raw: RawBulkResponse) -> Result<Self, Self::Error> {
        let mut items = Vec::with_capacity(raw.items.len());
        for entry in raw.items {
            for (action, value) in entry {
                let item: RawBulkItem = serde_json::from_value(value)?;
                let error = item
                    .error
                    .as_ref()
                    .map(|err| BackendError::from_item(item.status, err));
                items.push(BulkItem {
                    action,
                    index: item.index,
                    id: item.id,
                    status: item.status,
                    error,
                });
            }
        }
        Ok(Self {
            errors: raw.errors,
            items,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_body_with_paging_and_sort() {
        let query = SearchQuery {
            from: 20,
            size: 10,
            filter: vec![json!({"term": {"state": "online"}})],
            sort: vec![SortField::desc("createTime"), SortField::asc("id")],
            includes: vec!["id".into(), "name".into()],
            search_after: Vec::new(),
        };
        let body = query.to_body();

        assert_eq!(body["from"], 20);
        assert_eq!(body["size"], 10);
        assert_eq!(body["query"]["bool"]["filter"][0]["term"]["state"], "online");
        assert_eq!(body["sort"][0]["createTime"]["order"], "desc");
        assert_eq!(body["sort"][1]["id"]["order"], "asc");
        assert_eq!(body["_source"], json!(["id", "name"]));
        assert!(body.get("search_after").is_none());
    }

    #[test]
    fn cursor_resets_from() {
        let query = SearchQuery {
            from: 500,
            sort: vec![SortField::asc("id")],
            search_after: vec![json!("1700000000000")],
            ..SearchQuery::default()
        };
        let body = query.to_body();
        assert_eq!(body["from"], 0);
        assert_eq!(body["search_after"], json!(["1700000000000"]));
    }

    #[test]
    fn parse_search_response() {
        let raw = r#"{
            "took": 1,
            "hits": {
                "total": {"value": 2, "relation": "eq"},
                "hits": [
                    {"_index": "goiot-device", "_id": "1", "_source": {"id": "1"}, "sort": ["2023-05-28 13:26:27"]},
                    {"_index": "goiot-device", "_id": "2", "_source": {"id": "2"}, "sort": ["2023-05-28 13:26:28"]}
                ]
            }
        }"#;
        let parsed: RawSearchResponse = serde_json::from_str(raw).unwrap();
        let response = SearchResponse::from(parsed);

        assert_eq!(response.total, 2);
        assert_eq!(response.hits.len(), 2);
        assert_eq!(response.first_source(), Some(&json!({"id": "1"})));
        assert_eq!(response.last_sort, Some(vec![json!("2023-05-28 13:26:28")]));
    }

    #[test]
    fn parse_legacy_numeric_total() {
        let parsed: RawSearchResponse =
            serde_json::from_str(r#"{"hits": {"total": 7, "hits": []}}"#).unwrap();
        let response = SearchResponse::from(parsed);
        assert_eq!(response.total, 7);
        assert!(response.last_sort.is_none());
    }

    #[test]
    fn parse_bulk_response() {
        let raw = r#"{
            "took": 3,
            "errors": true,
            "items": [
                {"create": {"_index": "goiot-product", "_id": "1", "status": 201}},
                {"create": {"_index": "goiot-product", "_id": "2", "status": 409,
                    "error": {"type": "version_conflict_engine_exception", "reason": "document already exists"}}}
            ]
        }"#;
        let parsed: RawBulkResponse = serde_json::from_str(raw).unwrap();
        let response = BulkResponse::try_from(parsed).unwrap();

        assert!(response.errors);
        assert_eq!(response.items.len(), 2);
        let failed: Vec<_> = response.failed().collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "2");
        let error = failed[0].error.as_ref().unwrap();
        assert_eq!(error.status, 409);
        assert_eq!(error.error_type, "version_conflict_engine_exception");
    }

    #[test]
    fn date_property_serialization() {
        let value = serde_json::to_value(Property::date()).unwrap();
        assert_eq!(value["type"], "date");
        assert_eq!(value["format"], DEFAULT_DATE_FORMAT);

        let value = serde_json::to_value(Property::of("keyword")).unwrap();
        assert_eq!(value, json!({"type": "keyword"}));
    }
}
