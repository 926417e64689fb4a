//! List/get/create/update/delete, uniform over every [`Resource`].

use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use axum_extra::extract::WithRejection;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::{populate::populate, Resource};
use crate::auth::{CurrentUser, Locals};
use crate::error::{AppError, JsonBody};
use crate::query::{self, FindQuery, QueryParams};
use crate::response::{Envelope, RequestTime};
use crate::state::AppState;
use crate::store::{Collection, Document};

type PathParams = Option<Path<HashMap<String, String>>>;

fn not_found() -> AppError {
    AppError::NotFound("No document found with that ID".into())
}

fn parent_value<R: Resource>(params: &PathParams) -> Option<String> {
    let (param, _) = R::PARENT?;
    params.as_ref().and_then(|Path(p)| p.get(param).cloned())
}

/// Credentials change only through the dedicated auth routes.
fn reject_credentials(collection: Collection, body: &Document) -> Result<(), AppError> {
    let blocked = collection
        .schema()
        .credential_fields()
        .chain(std::iter::once("passwordConfirm"))
        .find(|f| body.contains_key(*f));
    match blocked {
        Some(field) => Err(AppError::BadRequest(format!(
            "{field} cannot be set through this route."
        ))),
        None => Ok(()),
    }
}

/// Reads one document, hidden fields stripped and relations expanded.
pub async fn fetch_one<R: Resource>(state: &AppState, id: &str) -> Result<Document, AppError> {
    let raw = state
        .store
        .find_by_id(R::COLLECTION, id)
        .await?
        .ok_or_else(not_found)?;
    let mut doc = FindQuery::new(R::COLLECTION).project(raw);
    populate(state.store.as_ref(), R::POPULATE, &mut doc).await?;
    Ok(doc)
}

#[instrument(skip_all, fields(collection = R::COLLECTION.name()))]
pub async fn list<R: Resource>(
    State(state): State<AppState>,
    params: PathParams,
    Query(pairs): Query<Vec<(String, String)>>,
    locals: Locals,
    requested_at: Option<Extension<RequestTime>>,
) -> Result<impl IntoResponse, AppError> {
    let mut base = FindQuery::new(R::COLLECTION);
    if let (Some((_, field)), Some(parent)) = (R::PARENT, parent_value::<R>(&params)) {
        base = base.where_eq(field, Value::String(parent));
    }
    let query = query::build(base, &QueryParams::from_pairs(pairs));
    debug!(?query, "listing");
    let docs = state.store.find(&query).await?;

    let total = docs.len();
    Ok(Envelope::new(docs)
        .total(total)
        .requested_at(requested_at.map(|Extension(t)| t))
        .user(locals.user))
}

#[instrument(skip_all, fields(collection = R::COLLECTION.name(), id = %id))]
pub async fn get_one<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    locals: Locals,
) -> Result<impl IntoResponse, AppError> {
    let doc = fetch_one::<R>(&state, &id).await?;
    Ok(Envelope::new(doc).user(locals.user))
}

#[instrument(skip_all, fields(collection = R::COLLECTION.name()))]
pub async fn create<R: Resource>(
    State(state): State<AppState>,
    params: PathParams,
    current: Option<CurrentUser>,
    WithRejection(Json(mut body), _): JsonBody<Document>,
) -> Result<impl IntoResponse, AppError> {
    reject_credentials(R::COLLECTION, &body)?;
    if let (Some((_, field)), Some(parent)) = (R::PARENT, parent_value::<R>(&params)) {
        body.entry(field).or_insert(Value::String(parent));
    }
    if let (Some(field), Some(CurrentUser(user))) = (R::OWNER_FIELD, &current) {
        body.entry(field).or_insert(Value::String(user.id.to_string()));
    }

    let created = state.store.create(R::COLLECTION, body).await?;
    let doc = FindQuery::new(R::COLLECTION).project(created);
    info!(id = ?doc.get("id"), "created");
    Ok((StatusCode::CREATED, Envelope::new(doc)))
}

#[instrument(skip_all, fields(collection = R::COLLECTION.name(), id = %id))]
pub async fn update<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
    WithRejection(Json(body), _): JsonBody<Document>,
) -> Result<impl IntoResponse, AppError> {
    reject_credentials(R::COLLECTION, &body)?;
    let updated = state
        .store
        .find_by_id_and_update(R::COLLECTION, &id, body)
        .await?
        .ok_or_else(not_found)?;
    Ok(Envelope::new(FindQuery::new(R::COLLECTION).project(updated)))
}

#[instrument(skip_all, fields(collection = R::COLLECTION.name(), id = %id))]
pub async fn delete<R: Resource>(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    state
        .store
        .find_by_id_and_delete(R::COLLECTION, &id)
        .await?
        .ok_or_else(not_found)?;
    info!("deleted");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AppConfig, Environment};
    use crate::resource::{Reviews, Tours};
    use serde_json::json;

    fn tour_body() -> Document {
        json!({
            "name": "The Sea Explorer",
            "duration": 7,
            "maxGroupSize": 15,
            "difficulty": "medium",
            "price": 497,
            "summary": "Exploring the jaw-dropping US east coast",
            "imageCover": "tour-2-cover.jpg"
        })
        .as_object()
        .cloned()
        .unwrap()
    }

    #[tokio::test]
    async fn delete_then_get_is_not_found() {
        let state = AppState::in_memory(AppConfig::for_tests(Environment::Production));
        let created = state.store.create(Collection::Tours, tour_body()).await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();

        let status = delete::<Tours>(State(state.clone()), Path(id.clone())).await.unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = fetch_one::<Tours>(&state, &id).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        let again = delete::<Tours>(State(state), Path(id)).await.unwrap_err();
        assert!(matches!(again, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn fetch_one_strips_internal_fields() {
        let state = AppState::in_memory(AppConfig::for_tests(Environment::Production));
        let created = state.store.create(Collection::Tours, tour_body()).await.unwrap();
        let doc = fetch_one::<Tours>(&state, created["id"].as_str().unwrap())
            .await
            .unwrap();
        assert!(doc.get("__v").is_none());
        assert_eq!(doc["slug"], json!("the-sea-explorer"));
        assert_eq!(doc["reviews"], json!([]));
    }

    #[test]
    fn credential_fields_are_refused() {
        let body = json!({ "name": "x", "passwordConfirm": "y" });
        let err = reject_credentials(Collection::Users, body.as_object().unwrap()).unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        let body = json!({ "passwordResetToken": "y" });
        assert!(reject_credentials(Collection::Users, body.as_object().unwrap()).is_err());
        let body = json!({ "review": "ok" });
        assert!(reject_credentials(Collection::Reviews, body.as_object().unwrap()).is_ok());
    }

    #[test]
    fn nested_reviews_read_the_tour_parameter() {
        let params: PathParams = Some(Path(HashMap::from([(
            "tour_id".to_string(),
            "abc".to_string(),
        )])));
        assert_eq!(parent_value::<Reviews>(&params).as_deref(), Some("abc"));
        assert_eq!(parent_value::<Tours>(&params), None);
    }
}
