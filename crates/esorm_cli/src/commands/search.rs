//! Search command implementation.

use super::settings::parse_filters;
use esorm_gateway::{build_filter, first_lower, Gateway, SearchQuery, SortField};
use tracing::info;

/// Search command arguments.
#[derive(Debug, Default)]
pub struct SearchOptions {
    /// `key=value` filters.
    pub filters: Vec<String>,
    /// Sort keys, `-` prefixed for descending.
    pub sort: Vec<String>,
    /// Page size.
    pub size: usize,
    /// Offset.
    pub from: usize,
    /// Projected fields.
    pub columns: Vec<String>,
}

impl SearchOptions {
    fn to_query(&self) -> Result<SearchQuery, String> {
        let terms = parse_filters(&self.filters)?;
        let sort = self
            .sort
            .iter()
            .map(|key| match key.strip_prefix('-') {
                Some(field) => SortField::desc(first_lower(field)),
                None => SortField::asc(first_lower(key.strip_prefix('+').unwrap_or(key))),
            })
            .collect();
        Ok(SearchQuery {
            from: self.from,
            size: self.size,
            filter: build_filter(&terms),
            sort,
            includes: self.columns.iter().map(|c| first_lower(c)).collect(),
            search_after: Vec::new(),
        })
    }
}

/// Runs the search command, printing one hit per line.
pub fn run(
    gateway: &Gateway,
    index: &str,
    options: &SearchOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let query = options.to_query()?;
    let indices: Vec<&str> = index.split(',').collect();
    let response = gateway.search(&indices, &query)?;

    for hit in &response.hits {
        println!("{}", serde_json::to_string(hit)?);
    }
    info!(
        total = response.total,
        returned = response.hits.len(),
        "search done"
    );
    if let Some(cursor) = &response.last_sort {
        info!("next cursor: {}", serde_json::to_string(cursor)?);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use esorm_gateway::SortOrder;

    #[test]
    fn options_to_query() {
        let options = SearchOptions {
            filters: vec!["ProductId=p1".into()],
            sort: vec!["-CreateTime".into(), "Id".into()],
            size: 20,
            from: 40,
            columns: vec!["Id".into(), "State".into()],
        };
        let query = options.to_query().unwrap();

        assert_eq!(query.size, 20);
        assert_eq!(query.from, 40);
        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.sort[0].field, "createTime");
        assert_eq!(query.sort[0].order, SortOrder::Desc);
        assert_eq!(query.sort[1].order, SortOrder::Asc);
        assert_eq!(query.includes, ["id", "state"]);
    }
}
