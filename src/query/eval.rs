//! In-process execution of a [`FindQuery`] over already loaded documents.

use std::cmp::Ordering;

use serde_json::Value;

use super::{Filter, FindQuery, Op, SortKey};
use crate::store::{Document, ID_FIELD};

/// Runs the full query: filter, sort, skip/limit, projection.
pub fn execute<'a, I>(query: &FindQuery, docs: I) -> Vec<Document>
where
    I: IntoIterator<Item = &'a Document>,
{
    let mut matched: Vec<&Document> = docs
        .into_iter()
        .filter(|d| matches_all(d, &query.filters))
        .collect();
    let keys = query.effective_sort();
    matched.sort_by(|a, b| compare_docs(a, b, &keys));
    let limit = query.limit.unwrap_or(usize::MAX);
    matched
        .into_iter()
        .skip(query.skip)
        .take(limit)
        .map(|d| query.project(d.clone()))
        .collect()
}

pub fn matches_all(doc: &Document, filters: &[Filter]) -> bool {
    filters.iter().all(|f| matches(doc, f))
}

fn matches(doc: &Document, filter: &Filter) -> bool {
    let Some(actual) = doc.get(&filter.field) else {
        return false;
    };
    match filter.op {
        Op::Eq => contains_or_equals(actual, &filter.value),
        Op::In => match &filter.value {
            Value::Array(options) => options.iter().any(|o| contains_or_equals(actual, o)),
            other => contains_or_equals(actual, other),
        },
        Op::Gt => compare_scalar(actual, &filter.value) == Some(Ordering::Greater),
        Op::Gte => matches!(
            compare_scalar(actual, &filter.value),
            Some(Ordering::Greater | Ordering::Equal)
        ),
        Op::Lt => compare_scalar(actual, &filter.value) == Some(Ordering::Less),
        Op::Lte => matches!(
            compare_scalar(actual, &filter.value),
            Some(Ordering::Less | Ordering::Equal)
        ),
    }
}

/// Array fields match when any element equals the expected value.
fn contains_or_equals(actual: &Value, expected: &Value) -> bool {
    if values_equal(actual, expected) {
        return true;
    }
    match actual {
        Value::Array(items) => items.iter().any(|i| values_equal(i, expected)),
        _ => false,
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

/// Ordering between two scalars of the same JSON type; `None` across types.
fn compare_scalar(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn type_rank(v: Option<&Value>) -> u8 {
    match v {
        None | Some(Value::Null) => 0,
        Some(Value::Number(_)) => 1,
        Some(Value::String(_)) => 2,
        Some(Value::Object(_)) => 3,
        Some(Value::Array(_)) => 4,
        Some(Value::Bool(_)) => 5,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => compare_scalar(x, y)
            .unwrap_or_else(|| type_rank(a).cmp(&type_rank(b))),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_docs(a: &Document, b: &Document, keys: &[SortKey]) -> Ordering {
    for key in keys {
        let ord = compare_values(a.get(&key.field), b.get(&key.field));
        let ord = if key.descending { ord.reverse() } else { ord };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    compare_values(a.get(ID_FIELD), b.get(ID_FIELD))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build, QueryParams};
    use crate::store::Collection;
    use serde_json::json;

    fn tour(id: &str, name: &str, price: i64, created: &str) -> Document {
        json!({
            "id": id,
            "name": name,
            "price": price,
            "duration": 5,
            "createdAt": created,
            "__v": 0
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    fn fixture() -> Vec<Document> {
        vec![
            tour("01", "Alpine Crossing", 900, "2024-01-01T00:00:00Z"),
            tour("02", "Beach Escape", 450, "2024-01-02T00:00:00Z"),
            tour("03", "City Lights", 500, "2024-01-03T00:00:00Z"),
            tour("04", "Desert Nights", 700, "2024-01-04T00:00:00Z"),
            tour("05", "Forest Trail", 700, "2024-01-05T00:00:00Z"),
            tour("06", "Glacier Walk", 1200, "2024-01-06T00:00:00Z"),
            tour("07", "Harbor Tour", 500, "2024-01-07T00:00:00Z"),
            tour("08", "Island Hop", 650, "2024-01-08T00:00:00Z"),
            tour("09", "Jungle Trek", 800, "2024-01-09T00:00:00Z"),
        ]
    }

    fn names(docs: &[Document]) -> Vec<&str> {
        docs.iter()
            .map(|d| d.get("name").and_then(Value::as_str).unwrap())
            .collect()
    }

    #[test]
    fn filter_sort_project_and_paginate_together() {
        let params = QueryParams::from_pairs([
            ("price[gte]", "500"),
            ("sort", "-price,name"),
            ("fields", "name,price"),
            ("page", "2"),
            ("limit", "5"),
        ]);
        let q = build(FindQuery::new(Collection::Tours), &params);
        let docs = fixture();
        let out = execute(&q, &docs);

        // Matches by price desc, name asc: Glacier, Alpine, Jungle, Desert, Forest,
        // Island, City, Harbor. Page two holds the last three.
        assert_eq!(names(&out), vec!["Island Hop", "City Lights", "Harbor Tour"]);
        for d in &out {
            let mut keys: Vec<&str> = d.keys().map(String::as_str).collect();
            keys.sort();
            assert_eq!(keys, vec!["id", "name", "price"]);
        }
    }

    #[test]
    fn default_order_is_newest_first() {
        let q = build(FindQuery::new(Collection::Tours), &QueryParams::default());
        let docs = fixture();
        let out = execute(&q, &docs);
        assert_eq!(out.first().and_then(|d| d.get("id")), Some(&json!("09")));
        assert!(out.iter().all(|d| !d.contains_key("__v")));
    }

    #[test]
    fn page_past_the_end_is_empty() {
        let params = QueryParams::from_pairs([("page", "10"), ("limit", "5")]);
        let q = build(FindQuery::new(Collection::Tours), &params);
        let docs = fixture();
        assert!(execute(&q, &docs).is_empty());
    }

    #[test]
    fn equality_matches_array_members_and_numbers_by_value() {
        let doc = json!({ "id": "x", "guides": ["g1", "g2"], "price": 5.0 })
            .as_object()
            .cloned()
            .unwrap();
        let by_guide = FindQuery::new(Collection::Tours).where_eq("guides", json!("g2"));
        assert!(matches_all(&doc, &by_guide.filters));
        let by_price = FindQuery::new(Collection::Tours).where_eq("price", json!(5));
        assert!(matches_all(&doc, &by_price.filters));
    }

    #[test]
    fn range_across_types_never_matches() {
        let doc = json!({ "id": "x", "price": "cheap" }).as_object().cloned().unwrap();
        let params = QueryParams::from_pairs([("price[gte]", "1")]);
        let q = build(FindQuery::new(Collection::Tours), &params);
        assert!(!matches_all(&doc, &q.filters));
    }
}
