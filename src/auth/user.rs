use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::error::AppError;
use crate::query::FindQuery;
use crate::store::{Collection, Document, DocumentStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    #[default]
    User,
    Guide,
    LeadGuide,
    Admin,
}

/// A user document as the auth layer sees it. Credential fields deserialize
/// from the stored document but never serialize back out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub photo: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default, skip_serializing, with = "time::serde::rfc3339::option")]
    pub password_changed_at: Option<OffsetDateTime>,
    #[serde(default, skip_serializing)]
    pub password_reset_token: Option<String>,
    #[serde(default, skip_serializing, with = "time::serde::rfc3339::option")]
    pub password_reset_expires: Option<OffsetDateTime>,
}

impl User {
    pub fn from_document(doc: Document) -> Result<Self, AppError> {
        serde_json::from_value(Value::Object(doc))
            .map_err(|e| AppError::Internal(anyhow::Error::new(e).context("malformed user document")))
    }

    /// True when the password changed after a token issued at `iat_ms`.
    pub fn changed_password_after(&self, iat_ms: i64) -> bool {
        self.password_changed_at
            .map(|t| (t.unix_timestamp_nanos() / 1_000_000) as i64 > iat_ms)
            .unwrap_or(false)
    }

    pub fn reset_token_valid_at(&self, now: OffsetDateTime) -> bool {
        self.password_reset_token.is_some()
            && self.password_reset_expires.map_or(false, |exp| exp > now)
    }
}

pub async fn find_by_id(store: &dyn DocumentStore, id: Uuid) -> Result<Option<User>, AppError> {
    store
        .find_by_id(Collection::Users, &id.to_string())
        .await?
        .map(User::from_document)
        .transpose()
}

async fn find_one_where(
    store: &dyn DocumentStore,
    field: &str,
    value: Value,
) -> Result<Option<User>, AppError> {
    let query = FindQuery::new(Collection::Users)
        .where_eq(field, value)
        .with_hidden()
        .limit(1);
    store
        .find(&query)
        .await?
        .into_iter()
        .next()
        .map(User::from_document)
        .transpose()
}

pub async fn find_by_email(store: &dyn DocumentStore, email: &str) -> Result<Option<User>, AppError> {
    find_one_where(store, "email", json!(email.trim().to_lowercase())).await
}

pub async fn find_by_reset_hash(
    store: &dyn DocumentStore,
    hash: &str,
) -> Result<Option<User>, AppError> {
    find_one_where(store, "passwordResetToken", json!(hash)).await
}
