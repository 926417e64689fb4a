//! PostgreSQL-backed document store: one JSONB row per document.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::sql::{create_unique_index, select_find, unique_index_name, SqlParam};
use super::{
    parse_id, prepare_new, prepare_update, unique_key, Collection, Document, DocumentStore,
    StoreError, ID_FIELD,
};
use crate::query::FindQuery;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;
        Ok(Self { pool })
    }

    /// Applies migrations and the per-collection unique indexes.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("run migrations")?;
        for collection in Collection::ALL {
            for field in collection.schema().unique_fields() {
                sqlx::query(&create_unique_index(collection.name(), field))
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("unique index {}.{}", collection.name(), field))?;
            }
        }
        Ok(())
    }

    /// Maps a unique-index violation back to the field it guards.
    fn classify(collection: Collection, doc: &Document, err: sqlx::Error) -> StoreError {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some("23505") {
                let constraint = db.constraint().unwrap_or_default();
                for field in collection.schema().unique_fields() {
                    if unique_index_name(collection.name(), field) == constraint {
                        return StoreError::Duplicate {
                            field: field.to_string(),
                            value: doc.get(field).map(unique_key).unwrap_or_default(),
                        };
                    }
                }
            }
        }
        StoreError::Db(err)
    }
}

fn into_document(v: Value) -> Document {
    match v {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StoreError> {
        let q = select_find(query);
        debug!(sql = %q.sql, "find");
        let mut stmt = sqlx::query(&q.sql);
        for p in q.params {
            stmt = match p {
                SqlParam::Text(s) => stmt.bind(s),
                SqlParam::Json(v) => stmt.bind(v),
            };
        }
        let rows = stmt.fetch_all(&self.pool).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let doc: Value = row.try_get("doc")?;
            out.push(query.project(into_document(doc)));
        }
        Ok(out)
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        let doc: Option<Value> =
            sqlx::query_scalar("SELECT doc FROM documents WHERE collection = $1 AND id = $2")
                .bind(collection.name())
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(doc.map(into_document))
    }

    async fn create(&self, collection: Collection, attrs: Document) -> Result<Document, StoreError> {
        let doc = prepare_new(collection, attrs)?;
        let id = doc
            .get(ID_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);
        sqlx::query("INSERT INTO documents (collection, id, doc) VALUES ($1, $2, $3)")
            .bind(collection.name())
            .bind(id)
            .bind(Value::Object(doc.clone()))
            .execute(&self.pool)
            .await
            .map_err(|e| Self::classify(collection, &doc, e))?;
        Ok(doc)
    }

    async fn find_by_id_and_update(
        &self,
        collection: Collection,
        id: &str,
        attrs: Document,
    ) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        let mut tx = self.pool.begin().await?;
        let current: Option<Value> = sqlx::query_scalar(
            "SELECT doc FROM documents WHERE collection = $1 AND id = $2 FOR UPDATE",
        )
        .bind(collection.name())
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current else {
            return Ok(None);
        };
        let updated = prepare_update(collection, into_document(current), attrs)?;
        sqlx::query(
            "UPDATE documents SET doc = $3, updated_at = NOW() WHERE collection = $1 AND id = $2",
        )
        .bind(collection.name())
        .bind(id)
        .bind(Value::Object(updated.clone()))
        .execute(&mut *tx)
        .await
        .map_err(|e| Self::classify(collection, &updated, e))?;
        tx.commit().await?;
        Ok(Some(updated))
    }

    async fn find_by_id_and_delete(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let id = parse_id(id)?;
        let doc: Option<Value> = sqlx::query_scalar(
            "DELETE FROM documents WHERE collection = $1 AND id = $2 RETURNING doc",
        )
        .bind(collection.name())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(doc.map(into_document))
    }
}
