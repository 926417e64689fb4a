//! Listing queries: the fetch handle executed by a [`DocumentStore`] and the
//! builder that narrows it from raw query-string parameters.
//!
//! [`DocumentStore`]: crate::store::DocumentStore

pub mod eval;

use std::collections::BTreeMap;

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::debug;

use crate::store::schema::FieldKind;
use crate::store::{Collection, Document, CREATED_AT_FIELD, ID_FIELD, VERSION_FIELD};

pub const DEFAULT_PAGE: usize = 1;
pub const DEFAULT_LIMIT: usize = 100;

/// Keys that drive the builder instead of becoming filters.
const RESERVED_KEYS: [&str; 4] = ["page", "sort", "limit", "fields"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    In,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Op {
    fn from_qualifier(q: &str) -> Option<Self> {
        match q {
            "gt" => Some(Op::Gt),
            "gte" => Some(Op::Gte),
            "lt" => Some(Op::Lt),
            "lte" => Some(Op::Lte),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub op: Op,
    /// For [`Op::In`] this is always an array.
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    #[default]
    All,
    Include(Vec<String>),
    Exclude(Vec<String>),
}

/// A fetch request against one collection. Executing it yields the filtered,
/// sorted, paginated and projected documents.
#[derive(Debug, Clone, PartialEq)]
pub struct FindQuery {
    pub collection: Collection,
    pub filters: Vec<Filter>,
    pub sort: Vec<SortKey>,
    pub projection: Projection,
    pub skip: usize,
    pub limit: Option<usize>,
    /// Keep schema-hidden fields (credentials) in the results.
    pub include_hidden: bool,
}

impl FindQuery {
    pub fn new(collection: Collection) -> Self {
        Self {
            collection,
            filters: Vec::new(),
            sort: Vec::new(),
            projection: Projection::All,
            skip: 0,
            limit: None,
            include_hidden: false,
        }
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: Value) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            op: Op::Eq,
            value,
        });
        self
    }

    pub fn with_hidden(mut self) -> Self {
        self.include_hidden = true;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    /// Sort keys to execute with; falls back to newest first.
    pub fn effective_sort(&self) -> Vec<SortKey> {
        if self.sort.is_empty() {
            vec![SortKey {
                field: CREATED_AT_FIELD.into(),
                descending: true,
            }]
        } else {
            self.sort.clone()
        }
    }

    /// Applies the projection to one fetched document. The identifier always
    /// survives; the version field never does.
    pub fn project(&self, mut doc: Document) -> Document {
        doc.remove(VERSION_FIELD);
        if !self.include_hidden {
            for f in self.collection.schema().hidden_fields() {
                doc.remove(f);
            }
        }
        let mut out = match &self.projection {
            Projection::All => doc,
            Projection::Exclude(fields) => {
                for f in fields {
                    if f != ID_FIELD {
                        doc.remove(f);
                    }
                }
                doc
            }
            Projection::Include(fields) => {
                let mut out = Map::new();
                if let Some(id) = doc.remove(ID_FIELD) {
                    out.insert(ID_FIELD.into(), id);
                }
                for f in fields {
                    if let Some(v) = doc.remove(f) {
                        out.insert(f.clone(), v);
                    }
                }
                out
            }
        };
        if let Some(virtuals) = self.collection.schema().virtuals {
            virtuals(&mut out);
        }
        out
    }
}

/// Raw query-string parameters, grouped by key. Repeated keys keep every value.
#[derive(Debug, Clone, Default)]
pub struct QueryParams(BTreeMap<String, Vec<String>>);

impl QueryParams {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (k, v) in pairs {
            map.entry(k.into()).or_default().push(v.into());
        }
        Self(map)
    }

    /// Last value wins for scalar options such as `page` or `sort`.
    fn scalar(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.last()).map(String::as_str)
    }
}

lazy_static! {
    static ref QUALIFIED_KEY: Regex = Regex::new(r"^([^\[\]]+)\[([a-z]+)\]$").unwrap();
}

/// Narrows `base` with the listing options in `params`.
///
/// Stages run in a fixed order: filter, sort, field projection, pagination.
pub fn build(base: FindQuery, params: &QueryParams) -> FindQuery {
    let q = filter(base, params);
    let q = sort(q, params);
    let q = limit_fields(q, params);
    paginate(q, params)
}

fn filter(mut q: FindQuery, params: &QueryParams) -> FindQuery {
    let schema = q.collection.schema();
    for (key, values) in &params.0 {
        if RESERVED_KEYS.contains(&key.as_str()) || values.is_empty() {
            continue;
        }
        let (field, op) = match QUALIFIED_KEY.captures(key) {
            Some(caps) => {
                let Some(op) = Op::from_qualifier(&caps[2]) else {
                    debug!(key = %key, "ignoring unsupported filter operator");
                    continue;
                };
                (caps[1].to_string(), op)
            }
            None => (key.clone(), Op::Eq),
        };
        let declared = schema.field(&field);
        if declared.map_or(false, |f| f.credential) {
            debug!(field = %field, "ignoring filter on credential field");
            continue;
        }
        let kind = declared.map(|f| f.kind);
        if op == Op::Eq && values.len() > 1 {
            let items = values.iter().map(|v| coerce(v, kind)).collect();
            q.filters.push(Filter {
                field,
                op: Op::In,
                value: Value::Array(items),
            });
            continue;
        }
        // `values` is non-empty; a repeated range key keeps its last value.
        let raw = values.last().map(String::as_str).unwrap_or_default();
        q.filters.push(Filter {
            field,
            op,
            value: coerce(raw, kind),
        });
    }
    q
}

fn sort(mut q: FindQuery, params: &QueryParams) -> FindQuery {
    if let Some(raw) = params.scalar("sort") {
        q.sort = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty() && *s != "-")
            .map(|s| match s.strip_prefix('-') {
                Some(field) => SortKey {
                    field: field.to_string(),
                    descending: true,
                },
                None => SortKey {
                    field: s.to_string(),
                    descending: false,
                },
            })
            .collect();
    }
    q
}

fn limit_fields(mut q: FindQuery, params: &QueryParams) -> FindQuery {
    let Some(raw) = params.scalar("fields") else {
        return q;
    };
    let entries: Vec<&str> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if entries.is_empty() {
        return q;
    }
    let included: Vec<String> = entries
        .iter()
        .filter(|s| !s.starts_with('-'))
        .map(|s| s.to_string())
        .collect();
    q.projection = if included.is_empty() {
        Projection::Exclude(
            entries
                .iter()
                .filter_map(|s| s.strip_prefix('-'))
                .map(str::to_string)
                .collect(),
        )
    } else {
        Projection::Include(included)
    };
    q
}

fn paginate(mut q: FindQuery, params: &QueryParams) -> FindQuery {
    let page = positive(params.scalar("page")).unwrap_or(DEFAULT_PAGE);
    let limit = positive(params.scalar("limit")).unwrap_or(DEFAULT_LIMIT);
    let window = usize::try_from(i64::MAX).unwrap_or(usize::MAX);
    q.skip = (page - 1).saturating_mul(limit).min(window);
    q.limit = Some(limit.min(window));
    q
}

fn positive(raw: Option<&str>) -> Option<usize> {
    raw.and_then(|s| s.trim().parse::<usize>().ok()).filter(|n| *n > 0)
}

/// Converts a query-string value to JSON, guided by the declared field kind
/// when the collection knows the field.
pub fn coerce(raw: &str, kind: Option<FieldKind>) -> Value {
    match kind {
        Some(FieldKind::String | FieldKind::Id | FieldKind::Date) => Value::String(raw.to_string()),
        Some(FieldKind::Number) => number(raw).unwrap_or_else(|| Value::String(raw.to_string())),
        Some(FieldKind::Boolean) => boolean(raw).unwrap_or_else(|| Value::String(raw.to_string())),
        _ => number(raw)
            .or_else(|| boolean(raw))
            .unwrap_or_else(|| Value::String(raw.to_string())),
    }
}

fn number(raw: &str) -> Option<Value> {
    if let Ok(i) = raw.parse::<i64>() {
        return Some(Value::from(i));
    }
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
}

fn boolean(raw: &str) -> Option<Value> {
    match raw {
        "true" => Some(Value::Bool(true)),
        "false" => Some(Value::Bool(false)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(pairs: &[(&str, &str)]) -> QueryParams {
        QueryParams::from_pairs(pairs.iter().copied())
    }

    #[test]
    fn builds_full_listing_request() {
        let p = params(&[
            ("price[gte]", "500"),
            ("sort", "-price,name"),
            ("fields", "name,price"),
            ("page", "2"),
            ("limit", "5"),
        ]);
        let q = build(FindQuery::new(Collection::Tours), &p);

        assert_eq!(
            q.filters,
            vec![Filter {
                field: "price".into(),
                op: Op::Gte,
                value: json!(500),
            }]
        );
        assert_eq!(
            q.sort,
            vec![
                SortKey { field: "price".into(), descending: true },
                SortKey { field: "name".into(), descending: false },
            ]
        );
        assert_eq!(q.projection, Projection::Include(vec!["name".into(), "price".into()]));
        assert_eq!(q.skip, 5);
        assert_eq!(q.limit, Some(5));
    }

    #[test]
    fn defaults_apply_without_options() {
        let q = build(FindQuery::new(Collection::Tours), &QueryParams::default());
        assert!(q.filters.is_empty());
        assert!(q.sort.is_empty());
        assert_eq!(q.effective_sort()[0].field, CREATED_AT_FIELD);
        assert!(q.effective_sort()[0].descending);
        assert_eq!(q.projection, Projection::All);
        assert_eq!(q.skip, 0);
        assert_eq!(q.limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn plain_keys_become_equality_and_unknown_fields_pass_through() {
        let p = params(&[("difficulty", "easy"), ("mystery", "42")]);
        let q = build(FindQuery::new(Collection::Tours), &p);
        assert!(q.filters.contains(&Filter {
            field: "difficulty".into(),
            op: Op::Eq,
            value: json!("easy"),
        }));
        assert!(q.filters.contains(&Filter {
            field: "mystery".into(),
            op: Op::Eq,
            value: json!(42),
        }));
    }

    #[test]
    fn repeated_keys_become_membership() {
        let p = params(&[("difficulty", "easy"), ("difficulty", "medium")]);
        let q = build(FindQuery::new(Collection::Tours), &p);
        assert_eq!(q.filters[0].op, Op::In);
        assert_eq!(q.filters[0].value, json!(["easy", "medium"]));
    }

    #[test]
    fn declared_string_fields_are_not_coerced() {
        let p = params(&[("name", "1234")]);
        let q = build(FindQuery::new(Collection::Tours), &p);
        assert_eq!(q.filters[0].value, json!("1234"));
    }

    #[test]
    fn unsupported_operators_are_dropped() {
        let p = params(&[("price[ne]", "5"), ("price[regex]", ".*")]);
        let q = build(FindQuery::new(Collection::Tours), &p);
        assert!(q.filters.is_empty());
    }

    #[test]
    fn credential_fields_cannot_be_filtered() {
        let p = params(&[("password", "x"), ("passwordResetToken[gte]", "0"), ("role", "admin")]);
        let q = build(FindQuery::new(Collection::Users), &p);
        assert_eq!(q.filters.len(), 1);
        assert_eq!(q.filters[0].field, "role");
    }

    #[test]
    fn invalid_pagination_falls_back_to_defaults() {
        let p = params(&[("page", "0"), ("limit", "abc")]);
        let q = build(FindQuery::new(Collection::Tours), &p);
        assert_eq!(q.skip, 0);
        assert_eq!(q.limit, Some(DEFAULT_LIMIT));
    }

    #[test]
    fn negated_fields_form_an_exclusion() {
        let p = params(&[("fields", "-summary,-description")]);
        let q = build(FindQuery::new(Collection::Tours), &p);
        assert_eq!(
            q.projection,
            Projection::Exclude(vec!["summary".into(), "description".into()])
        );
    }

    #[test]
    fn projection_keeps_id_and_drops_internal_fields() {
        let mut q = FindQuery::new(Collection::Users);
        q.projection = Projection::Include(vec!["name".into(), "password".into(), "__v".into()]);
        let doc = json!({
            "id": "u1",
            "name": "Ada",
            "email": "ada@example.com",
            "password": "hash",
            "__v": 3
        });
        let out = q.project(doc.as_object().cloned().unwrap());
        assert_eq!(Value::Object(out), json!({ "id": "u1", "name": "Ada" }));
    }

    #[test]
    fn hidden_fields_survive_only_when_requested() {
        let doc = json!({ "id": "u1", "password": "hash", "__v": 0 })
            .as_object()
            .cloned()
            .unwrap();
        let public = FindQuery::new(Collection::Users).project(doc.clone());
        assert!(!public.contains_key("password"));
        let internal = FindQuery::new(Collection::Users).with_hidden().project(doc);
        assert!(internal.contains_key("password"));
        assert!(!internal.contains_key("__v"));
    }
}
