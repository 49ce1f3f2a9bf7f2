//! List query parameters: pagination, ordering, and filters checked against the schema.

use crate::error::AppError;
use crate::model::ID_FIELD;
use crate::schema::{coerce_json, parse_query_value, ModelSchema, SchemaField};
use serde_json::Value;

pub const DEFAULT_LIMIT: u32 = 100;
pub const MAX_LIMIT: u32 = 200;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    /// `<field>_min=`
    Gte,
    /// `<field>_max=`
    Lte,
    /// Case-insensitive substring match; search on text fields only.
    Contains,
}

/// How filters combine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Join {
    #[default]
    And,
    Or,
}

impl Join {
    fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.to_ascii_lowercase().as_str() {
            "and" => Ok(Join::And),
            "or" => Ok(Join::Or),
            _ => Err(AppError::Validation(format!("join must be 'and' or 'or', got '{}'", raw))),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub descending: bool,
}

impl Default for OrderBy {
    fn default() -> Self {
        OrderBy {
            field: ID_FIELD.to_string(),
            descending: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListParams {
    pub filters: Vec<Filter>,
    pub join: Join,
    pub order_by: OrderBy,
    pub limit: u32,
    pub offset: u64,
}

impl Default for ListParams {
    fn default() -> Self {
        ListParams {
            filters: Vec::new(),
            join: Join::And,
            order_by: OrderBy::default(),
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

/// Output fields only: write-only columns can be neither filtered nor sorted on.
fn queryable<'a>(schema: &'a ModelSchema, name: &str) -> Option<&'a SchemaField> {
    schema.field(name).filter(|f| f.access.exposes_output())
}

/// Resolve a filter key (`field`, `field_min`, `field_max`) to its field and operator.
fn filter_target<'a>(schema: &'a ModelSchema, key: &str) -> Result<(&'a SchemaField, FilterOp), AppError> {
    let (field, op) = if let Some(f) = queryable(schema, key) {
        (f, FilterOp::Eq)
    } else if let Some(f) = key.strip_suffix("_min").and_then(|k| queryable(schema, k)) {
        (f, FilterOp::Gte)
    } else if let Some(f) = key.strip_suffix("_max").and_then(|k| queryable(schema, k)) {
        (f, FilterOp::Lte)
    } else {
        return Err(AppError::Validation(format!("unknown filter field '{}'", key)));
    };
    if op != FilterOp::Eq && !field.field_type.is_ordered() {
        return Err(AppError::Validation(format!("{} does not support range filters", field.name)));
    }
    Ok((field, op))
}

fn filter_for(schema: &ModelSchema, key: &str, raw: &str) -> Result<Filter, AppError> {
    let (field, op) = filter_target(schema, key)?;
    let value = parse_query_value(&field.field_type, raw)
        .map_err(|expected| AppError::Validation(format!("filter {} must be {}", key, expected)))?;
    Ok(Filter {
        field: field.name.clone(),
        op,
        value,
    })
}

/// One search criterion from a JSON body. Equality on a text field becomes a
/// case-insensitive substring match.
fn search_filter(schema: &ModelSchema, key: &str, raw: &Value) -> Result<Filter, AppError> {
    let (field, op) = filter_target(schema, key)?;
    if raw.is_null() || matches!(field.field_type, crate::model::FieldType::Json) {
        return Err(AppError::Validation(format!("cannot search {} by {}", key, raw)));
    }
    let value = coerce_json(&field.field_type, raw)
        .map_err(|expected| AppError::Validation(format!("search {} must be {}", key, expected)))?;
    let op = if op == FilterOp::Eq && field.field_type.is_text() {
        FilterOp::Contains
    } else {
        op
    };
    Ok(Filter {
        field: field.name.clone(),
        op,
        value,
    })
}

impl ListParams {
    /// Every pair is a filter; used where pagination and ordering make no sense.
    pub fn parse_filters(schema: &ModelSchema, query: &[(String, String)]) -> Result<Vec<Filter>, AppError> {
        query.iter().map(|(key, raw)| filter_for(schema, key, raw)).collect()
    }

    /// Search: criteria come from a JSON object body, `join`, `limit`, `offset` and
    /// `order_by` from the query string. An empty body matches every row.
    pub fn parse_search(schema: &ModelSchema, query: &[(String, String)], body: Value) -> Result<Self, AppError> {
        let Value::Object(criteria) = body else {
            return Err(AppError::BadRequest("search body must be a JSON object".into()));
        };
        let mut paging = Vec::with_capacity(query.len());
        let mut join = Join::And;
        for (key, raw) in query {
            match key.as_str() {
                "join" => join = Join::parse(raw)?,
                "limit" | "offset" | "order_by" => paging.push((key.clone(), raw.clone())),
                _ => return Err(AppError::Validation(format!("unknown search parameter '{}'", key))),
            }
        }
        let mut params = ListParams::parse(schema, &paging)?;
        params.join = join;
        params.filters = criteria
            .iter()
            .map(|(key, raw)| search_filter(schema, key, raw))
            .collect::<Result<_, _>>()?;
        Ok(params)
    }

    /// Parse query-string pairs in request order. Unknown filter or order fields and malformed
    /// values are validation errors rather than being ignored.
    pub fn parse(schema: &ModelSchema, query: &[(String, String)]) -> Result<Self, AppError> {
        let mut params = ListParams::default();
        for (key, raw) in query {
            match key.as_str() {
                "limit" => {
                    let n: u32 = raw
                        .parse()
                        .ok()
                        .filter(|n| *n > 0)
                        .ok_or_else(|| AppError::Validation("limit must be a positive integer".into()))?;
                    params.limit = n.min(MAX_LIMIT);
                }
                "offset" => {
                    params.offset = raw
                        .parse()
                        .map_err(|_| AppError::Validation("offset must be a non-negative integer".into()))?;
                }
                "order_by" => {
                    let (name, descending) = match raw.strip_prefix('-') {
                        Some(rest) => (rest, true),
                        None => (raw.as_str(), false),
                    };
                    let field = queryable(schema, name)
                        .ok_or_else(|| AppError::Validation(format!("unknown order_by field '{}'", name)))?;
                    if !field.field_type.is_ordered() {
                        return Err(AppError::Validation(format!("cannot order by {}", name)));
                    }
                    params.order_by = OrderBy {
                        field: field.name.clone(),
                        descending,
                    };
                }
                _ => params.filters.push(filter_for(schema, key, raw)?),
            }
        }
        Ok(params)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FieldDef, ModelDef};
    use serde_json::json;

    fn schema() -> ModelSchema {
        ModelSchema::derive(
            &ModelDef::new("Product")
                .field(FieldDef::text("title"))
                .field(FieldDef::float("price"))
                .field(FieldDef::json("attributes").nullable())
                .field(FieldDef::text("password").write_only()),
        )
        .unwrap()
    }

    fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn defaults_without_query() {
        assert_eq!(ListParams::parse(&schema(), &[]).unwrap(), ListParams::default());
    }

    #[test]
    fn parses_pagination_order_and_filters() {
        let p = ListParams::parse(
            &schema(),
            &q(&[
                ("limit", "500"),
                ("offset", "10"),
                ("order_by", "-price"),
                ("title", "bolt"),
                ("price_min", "1.5"),
                ("id_max", "40"),
            ]),
        )
        .unwrap();
        assert_eq!(p.limit, MAX_LIMIT);
        assert_eq!(p.offset, 10);
        assert_eq!(p.order_by, OrderBy { field: "price".into(), descending: true });
        assert_eq!(
            p.filters,
            vec![
                Filter { field: "title".into(), op: FilterOp::Eq, value: json!("bolt") },
                Filter { field: "price".into(), op: FilterOp::Gte, value: json!(1.5) },
                Filter { field: "id".into(), op: FilterOp::Lte, value: json!(40) },
            ]
        );
    }

    #[test]
    fn unknown_filter_is_rejected() {
        let err = ListParams::parse(&schema(), &q(&[("colour", "red")])).unwrap_err();
        assert!(matches!(err, AppError::Validation(m) if m == "unknown filter field 'colour'"));
    }

    #[test]
    fn write_only_fields_are_not_queryable() {
        assert!(ListParams::parse(&schema(), &q(&[("password", "x")])).is_err());
        assert!(ListParams::parse(&schema(), &q(&[("order_by", "password")])).is_err());
    }

    #[test]
    fn search_matches_text_by_substring_and_takes_join() {
        let p = ListParams::parse_search(
            &schema(),
            &q(&[("join", "OR"), ("limit", "5")]),
            json!({"title": "Bo", "price_max": 3}),
        )
        .unwrap();
        assert_eq!(p.join, Join::Or);
        assert_eq!(p.limit, 5);
        assert_eq!(
            p.filters,
            vec![
                Filter { field: "price".into(), op: FilterOp::Lte, value: json!(3.0) },
                Filter { field: "title".into(), op: FilterOp::Contains, value: json!("Bo") },
            ]
        );
    }

    #[test]
    fn search_rejects_bad_criteria() {
        let s = schema();
        assert!(ListParams::parse_search(&s, &q(&[("join", "xor")]), json!({})).is_err());
        assert!(ListParams::parse_search(&s, &q(&[("title", "x")]), json!({})).is_err());
        assert!(ListParams::parse_search(&s, &[], json!({"title": null})).is_err());
        assert!(ListParams::parse_search(&s, &[], json!({"price": "cheap"})).is_err());
        assert!(ListParams::parse_search(&s, &[], json!({"attributes": {"a": 1}})).is_err());
        assert!(matches!(
            ListParams::parse_search(&s, &[], json!([1])),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn count_takes_only_filters() {
        let filters = ListParams::parse_filters(&schema(), &q(&[("price_min", "2")])).unwrap();
        assert_eq!(filters, vec![Filter { field: "price".into(), op: FilterOp::Gte, value: json!(2.0) }]);
        assert!(ListParams::parse_filters(&schema(), &q(&[("limit", "2")])).is_err());
    }

    #[test]
    fn malformed_values_are_rejected() {
        assert!(ListParams::parse(&schema(), &q(&[("limit", "0")])).is_err());
        assert!(ListParams::parse(&schema(), &q(&[("offset", "-1")])).is_err());
        assert!(ListParams::parse(&schema(), &q(&[("price", "cheap")])).is_err());
        assert!(ListParams::parse(&schema(), &q(&[("attributes_min", "1")])).is_err());
        assert!(ListParams::parse(&schema(), &q(&[("order_by", "attributes")])).is_err());
    }
}
