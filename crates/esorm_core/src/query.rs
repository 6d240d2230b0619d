//! The query/mutation builder.

use crate::error::{OrmError, OrmResult};
use crate::model::Model;
use crate::schema::RecordSchema;
use esorm_gateway::{
    build_filter, first_lower, FilterTerm, Gateway, Script, SearchQuery, SortField,
};
use serde_json::{Map, Value};
use std::marker::PhantomData;
use std::sync::Arc;

/// Page size used when [`QuerySet::limit`] was not called.
pub const DEFAULT_PAGE_SIZE: usize = 10_000;

/// Field assignments for [`QuerySet::update`].
pub type Params = Map<String, Value>;

/// One page of query results.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    /// Total number of matching documents.
    pub total: u64,
    /// Decoded records, in hit order.
    pub records: Vec<T>,
    /// Sort values of the last record; pass to
    /// [`QuerySet::search_after`] to fetch the next page. Empty when the
    /// query was unsorted or returned nothing.
    pub search_after: Vec<Value>,
}

/// A query over one model's index.
///
/// Filters, ordering and paging are staged locally; only the terminal calls
/// ([`count`](Self::count), [`all`](Self::all), [`update`](Self::update))
/// talk to the backend. One `QuerySet` serves one logical query and must
/// not be shared between threads.
///
/// ```ignore
/// let mut query = orm
///     .query::<Device>()?
///     .filter("ProductId", "p1")
///     .filter("Name__contains", "gate")
///     .order_by("-CreateTime")
///     .limit(20, 0);
/// let total = query.count()?;
/// let page = query.all(&["Id", "Name"])?;
/// ```
pub struct QuerySet<'a, T: Model> {
    gateway: &'a Gateway,
    schema: Arc<RecordSchema>,
    terms: Vec<FilterTerm>,
    from: usize,
    size: usize,
    sort: Vec<SortField>,
    /// Cached total, set by `count` or `all`.
    total: Option<u64>,
    search_after: Vec<Value>,
    _marker: PhantomData<fn() -> T>,
}

impl<'a, T: Model> QuerySet<'a, T> {
    pub(crate) fn new(gateway: &'a Gateway, schema: Arc<RecordSchema>) -> Self {
        Self {
            gateway,
            schema,
            terms: Vec::new(),
            from: 0,
            size: DEFAULT_PAGE_SIZE,
            sort: Vec::new(),
            total: None,
            search_after: Vec::new(),
            _marker: PhantomData,
        }
    }

    /// Returns the schema of the queried model.
    pub fn schema(&self) -> &RecordSchema {
        &self.schema
    }

    /// Returns the staged filter terms.
    pub fn terms(&self) -> &[FilterTerm] {
        &self.terms
    }

    /// Adds a filter. The key may carry an operator suffix, e.g.
    /// `Name__contains` (prefix match) or `Id__in` (set membership).
    #[must_use]
    pub fn filter(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.terms.push(FilterTerm::parse(key, value));
        self
    }

    /// Adds a filter term with an explicit operator.
    #[must_use]
    pub fn filter_term(mut self, mut term: FilterTerm) -> Self {
        term.key = first_lower(&term.key);
        self.terms.push(term);
        self
    }

    /// Adds a sort key. A leading `-` sorts descending, `+` or nothing
    /// ascending. Keys apply in call order.
    #[must_use]
    pub fn order_by(mut self, key: &str) -> Self {
        let field = match key.strip_prefix('-') {
            Some(field) => SortField::desc(first_lower(field)),
            None => SortField::asc(first_lower(key.strip_prefix('+').unwrap_or(key))),
        };
        self.sort.push(field);
        self
    }

    /// Sets page size and offset.
    #[must_use]
    pub fn limit(mut self, size: usize, offset: usize) -> Self {
        self.size = size;
        self.from = offset;
        self
    }

    /// Continues after a cursor returned by a previous page. Takes
    /// precedence over the offset set by [`limit`](Self::limit).
    #[must_use]
    pub fn search_after(mut self, cursor: Vec<Value>) -> Self {
        self.search_after = cursor;
        self
    }

    /// Returns the cursor captured by the last [`all`](Self::all).
    pub fn cursor(&self) -> &[Value] {
        &self.search_after
    }

    /// Counts matching documents. The first result is cached, so later
    /// calls on the same query do not reach the backend.
    pub fn count(&mut self) -> OrmResult<u64> {
        if let Some(total) = self.total {
            return Ok(total);
        }
        let filter = build_filter(&self.terms);
        let total = self
            .gateway
            .count(&[self.schema.index_name()], &filter)?;
        self.total = Some(total);
        Ok(total)
    }

    /// Runs the query and decodes one page.
    ///
    /// `columns` restricts the returned fields; the primary key is not added
    /// implicitly. The last hit's sort values become the query's cursor.
    pub fn all(&mut self, columns: &[&str]) -> OrmResult<Page<T>> {
        if !self.search_after.is_empty() && self.sort.is_empty() {
            return Err(OrmError::bad_arguments(
                "search_after requires at least one order_by key",
            ));
        }

        let query = SearchQuery {
            from: self.from,
            size: self.size,
            filter: build_filter(&self.terms),
            sort: self.sort.clone(),
            includes: columns.iter().map(|c| first_lower(c)).collect(),
            search_after: self.search_after.clone(),
        };
        let response = self.gateway.search(&[self.schema.index_name()], &query)?;
        let records = response.decode::<T>()?;

        self.total = Some(response.total);
        self.search_after = response.last_sort.unwrap_or_default();

        Ok(Page {
            total: response.total,
            records,
            search_after: self.search_after.clone(),
        })
    }

    /// Assigns `params` on every document matching the staged filter and
    /// returns the number of updated documents.
    ///
    /// Refuses to run without a filter.
    pub fn update(&self, params: &Params) -> OrmResult<u64> {
        let filter = build_filter(&self.terms);
        if filter.is_empty() {
            return Err(OrmError::bad_arguments("update requires a filter"));
        }
        if params.is_empty() {
            return Err(OrmError::bad_arguments("update requires at least one field"));
        }

        let mut statements = Vec::with_capacity(params.len());
        for key in params.keys() {
            if key.contains(['\'', '\\']) {
                return Err(OrmError::bad_arguments(format!("invalid field name `{key}`")));
            }
            statements.push(format!(
                "ctx._source['{}'] = params['{}']",
                first_lower(key),
                key
            ));
        }
        let script = Script::painless(statements.join("; "), params.clone());

        Ok(self
            .gateway
            .update_by_query(self.schema.index_name(), &filter, &script)?)
    }
}
