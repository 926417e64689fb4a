//! Document persistence: the store contract, the collection catalogue and the
//! create/update preparation shared by every backend.

pub mod memory;
pub mod postgres;
pub mod schema;
mod sql;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use uuid::Uuid;

use crate::query::FindQuery;
use schema::Schema;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type Document = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const VERSION_FIELD: &str = "__v";
pub const CREATED_AT_FIELD: &str = "createdAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Tours,
    Users,
    Reviews,
    Bookings,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Tours,
        Collection::Users,
        Collection::Reviews,
        Collection::Bookings,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Tours => "tours",
            Collection::Users => "users",
            Collection::Reviews => "reviews",
            Collection::Bookings => "bookings",
        }
    }

    pub fn schema(self) -> &'static Schema {
        match self {
            Collection::Tours => &schema::TOURS,
            Collection::Users => &schema::USERS,
            Collection::Reviews => &schema::REVIEWS,
            Collection::Bookings => &schema::BOOKINGS,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid {field}: {value}")]
    InvalidId { field: String, value: String },
    #[error("duplicate value for {field}: {value}")]
    Duplicate { field: String, value: String },
    #[error("validation failed: {}", .0.join(". "))]
    Validation(Vec<String>),
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, query: &FindQuery) -> Result<Vec<Document>, StoreError>;

    /// Raw document, hidden fields included.
    async fn find_by_id(&self, collection: Collection, id: &str)
        -> Result<Option<Document>, StoreError>;

    async fn create(&self, collection: Collection, attrs: Document) -> Result<Document, StoreError>;

    /// Merges `attrs` into the stored document and re-validates the result.
    async fn find_by_id_and_update(
        &self,
        collection: Collection,
        id: &str,
        attrs: Document,
    ) -> Result<Option<Document>, StoreError>;

    async fn find_by_id_and_delete(
        &self,
        collection: Collection,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;
}

pub fn parse_id(id: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(id).map_err(|_| StoreError::InvalidId {
        field: ID_FIELD.into(),
        value: id.to_string(),
    })
}

pub fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default()
}

/// Builds a new document: fresh id, creation time, defaults, validation.
pub(crate) fn prepare_new(collection: Collection, mut attrs: Document) -> Result<Document, StoreError> {
    let schema = collection.schema();
    for key in [ID_FIELD, VERSION_FIELD] {
        attrs.remove(key);
    }
    attrs.insert(ID_FIELD.into(), Value::String(Uuid::new_v4().to_string()));
    attrs.insert(CREATED_AT_FIELD.into(), Value::String(now_rfc3339()));
    attrs.insert(VERSION_FIELD.into(), Value::from(0));
    schema.apply_defaults(&mut attrs);
    schema.validate(&mut attrs).map_err(StoreError::Validation)?;
    Ok(attrs)
}

/// Merges `attrs` over `existing`, keeping identity fields, and re-validates.
/// A `null` attribute removes the field.
pub(crate) fn prepare_update(
    collection: Collection,
    mut existing: Document,
    attrs: Document,
) -> Result<Document, StoreError> {
    for (k, v) in attrs {
        if k == ID_FIELD || k == VERSION_FIELD || k == CREATED_AT_FIELD {
            continue;
        }
        if v.is_null() {
            existing.remove(&k);
        } else {
            existing.insert(k, v);
        }
    }
    let version = existing
        .get(VERSION_FIELD)
        .and_then(Value::as_i64)
        .unwrap_or(0);
    existing.insert(VERSION_FIELD.into(), Value::from(version + 1));
    collection
        .schema()
        .validate(&mut existing)
        .map_err(StoreError::Validation)?;
    Ok(existing)
}

/// Value of a unique field rendered for comparison and error messages.
pub(crate) fn unique_key(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
