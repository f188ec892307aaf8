//! Typed record query builder.
//!
//! A [`Query`] names a collection and carries filters, an optional ordering
//! and an optional row limit.  [`HttpBackend`](crate::HttpBackend) renders
//! it into PostgREST-style query parameters; [`MemoryBackend`](crate::MemoryBackend)
//! evaluates it directly over stored JSON records.

use serde_json::Value;

/// Row filter applied server-side.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Column equals value.
    Eq { column: String, value: Value },
    /// Column contains the substring, case-insensitively.
    ILike { column: String, substring: String },
    /// Column value is one of the given set.
    In { column: String, values: Vec<Value> },
}

impl Filter {
    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Filter::Eq {
            column: column.to_string(),
            value: value.into(),
        }
    }

    pub fn ilike(column: &str, substring: &str) -> Self {
        Filter::ILike {
            column: column.to_string(),
            substring: substring.to_string(),
        }
    }

    pub fn is_in(column: &str, values: Vec<Value>) -> Self {
        Filter::In {
            column: column.to_string(),
            values,
        }
    }
}

/// Result ordering on a single column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: true,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_string(),
            ascending: false,
        }
    }
}

/// A structured record query against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub collection: String,
    pub filters: Vec<Filter>,
    pub order: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new(collection: &str) -> Self {
        Self {
            collection: collection.to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: OrderBy) -> Self {
        self.order = Some(order);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render into PostgREST-style query parameters.
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = Vec::new();

        for filter in &self.filters {
            match filter {
                Filter::Eq { column, value } => {
                    params.push((column.clone(), format!("eq.{}", render_value(value))));
                }
                Filter::ILike { column, substring } => {
                    params.push((column.clone(), format!("ilike.*{}*", substring)));
                }
                Filter::In { column, values } => {
                    let joined = values
                        .iter()
                        .map(render_value)
                        .collect::<Vec<_>>()
                        .join(",");
                    params.push((column.clone(), format!("in.({})", joined)));
                }
            }
        }

        if let Some(ref order) = self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            params.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }

        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }

        params
    }
}

/// Render a JSON value into its PostgREST parameter form.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
