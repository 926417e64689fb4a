//! Translates a [`FindQuery`] into parameterized SQL over the `documents` table.

use serde_json::Value;

use crate::query::{FindQuery, Op};

pub(crate) enum SqlParam {
    Text(String),
    Json(Value),
}

pub(crate) struct QueryBuf {
    pub sql: String,
    pub params: Vec<SqlParam>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, p: SqlParam) -> usize {
        self.params.push(p);
        self.params.len()
    }
}

/// Escapes a JSON key for use inside a single-quoted SQL literal.
fn json_key(field: &str) -> String {
    format!("'{}'", field.replace('\'', "''"))
}

fn comparison(op: Op) -> &'static str {
    match op {
        Op::Gt => ">",
        Op::Gte => ">=",
        Op::Lt => "<",
        Op::Lte => "<=",
        Op::Eq | Op::In => "=",
    }
}

/// SELECT for a listing: collection, filters, ORDER BY sort keys then id,
/// LIMIT/OFFSET. Projection is applied after fetching.
pub(crate) fn select_find(query: &FindQuery) -> QueryBuf {
    let mut q = QueryBuf::new();
    let coll = q.push_param(SqlParam::Text(query.collection.name().to_string()));
    let mut where_parts = vec![format!("collection = ${}", coll)];

    for f in &query.filters {
        let path = format!("doc -> {}", json_key(&f.field));
        match f.op {
            Op::Eq => {
                let n = q.push_param(SqlParam::Json(f.value.clone()));
                where_parts.push(format!("{} @> ${}::jsonb", path, n));
            }
            Op::In => {
                let options: Vec<Value> = match &f.value {
                    Value::Array(items) => items.clone(),
                    other => vec![other.clone()],
                };
                let alts: Vec<String> = options
                    .into_iter()
                    .map(|v| {
                        let n = q.push_param(SqlParam::Json(v));
                        format!("{} @> ${}::jsonb", path, n)
                    })
                    .collect();
                if alts.is_empty() {
                    where_parts.push("FALSE".into());
                } else {
                    where_parts.push(format!("({})", alts.join(" OR ")));
                }
            }
            Op::Gt | Op::Gte | Op::Lt | Op::Lte => {
                let n = q.push_param(SqlParam::Json(f.value.clone()));
                where_parts.push(format!(
                    "(jsonb_typeof({path}) = jsonb_typeof(${n}::jsonb) AND {path} {} ${n}::jsonb)",
                    comparison(f.op),
                ));
            }
        }
    }

    let mut order_parts: Vec<String> = query
        .effective_sort()
        .iter()
        .map(|k| {
            let dir = if k.descending { "DESC NULLS LAST" } else { "ASC NULLS FIRST" };
            format!("doc -> {} {}", json_key(&k.field), dir)
        })
        .collect();
    order_parts.push("id ASC".into());

    let limit_clause = query
        .limit
        .map(|n| format!(" LIMIT {}", bigint(n)))
        .unwrap_or_default();
    let offset_clause = if query.skip > 0 {
        format!(" OFFSET {}", bigint(query.skip))
    } else {
        String::new()
    };

    q.sql = format!(
        "SELECT doc FROM documents WHERE {} ORDER BY {}{}{}",
        where_parts.join(" AND "),
        order_parts.join(", "),
        limit_clause,
        offset_clause
    );
    q
}

/// LIMIT and OFFSET are `bigint` in PostgreSQL.
fn bigint(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

/// Name of the partial unique index guarding `field` within `collection`.
pub(crate) fn unique_index_name(collection: &str, field: &str) -> String {
    format!("documents_{}_{}_key", collection, field.to_lowercase())
}

pub(crate) fn create_unique_index(collection: &str, field: &str) -> String {
    format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS {} ON documents ((doc ->> {})) WHERE collection = '{}'",
        unique_index_name(collection, field),
        json_key(field),
        collection.replace('\'', "''"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{build, QueryParams};
    use crate::store::Collection;

    #[test]
    fn listing_sql_orders_filters_and_pages() {
        let params = QueryParams::from_pairs([
            ("price[gte]", "500"),
            ("difficulty", "easy"),
            ("sort", "-price,name"),
            ("page", "2"),
            ("limit", "5"),
        ]);
        let q = select_find(&build(FindQuery::new(Collection::Tours), &params));
        assert_eq!(
            q.sql,
            "SELECT doc FROM documents WHERE collection = $1 \
             AND doc -> 'difficulty' @> $2::jsonb \
             AND (jsonb_typeof(doc -> 'price') = jsonb_typeof($3::jsonb) AND doc -> 'price' >= $3::jsonb) \
             ORDER BY doc -> 'price' DESC NULLS LAST, doc -> 'name' ASC NULLS FIRST, id ASC \
             LIMIT 5 OFFSET 5"
        );
        assert_eq!(q.params.len(), 3);
    }

    #[test]
    fn far_pages_stay_within_bigint() {
        let params = QueryParams::from_pairs([("page", "100000000000000000"), ("limit", "100")]);
        let q = select_find(&build(FindQuery::new(Collection::Tours), &params));
        assert!(q.sql.ends_with(" LIMIT 100 OFFSET 9223372036854775807"));

        let mut raw = FindQuery::new(Collection::Tours).limit(usize::MAX);
        raw.skip = usize::MAX;
        let q = select_find(&raw);
        assert!(q
            .sql
            .ends_with(" LIMIT 9223372036854775807 OFFSET 9223372036854775807"));
    }

    #[test]
    fn field_names_cannot_break_out_of_literals() {
        let params = QueryParams::from_pairs([("a'b", "1")]);
        let q = select_find(&build(FindQuery::new(Collection::Tours), &params));
        assert!(q.sql.contains("doc -> 'a''b'"));
    }

    #[test]
    fn unique_index_is_scoped_to_collection() {
        assert_eq!(
            create_unique_index("users", "email"),
            "CREATE UNIQUE INDEX IF NOT EXISTS documents_users_email_key \
             ON documents ((doc ->> 'email')) WHERE collection = 'users'"
        );
    }
}
