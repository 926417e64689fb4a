//! Server-rendered pages. Every page receives the visitor resolved by
//! `is_logged_in` (or `protect`) as `user`.

use axum::{
    extract::{Path, State},
    response::Html,
    routing::get,
    Router,
};
use serde_json::{json, Value};

use super::authenticated;
use crate::auth::Locals;
use crate::error::AppError;
use crate::query::FindQuery;
use crate::resource::{handlers::fetch_one, Tours};
use crate::state::AppState;
use crate::store::Collection;

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/", get(overview))
        .route("/tour/:slug", get(tour))
        .route("/login", get(login));
    let private = authenticated(Router::new().route("/me", get(account)), state);
    public.merge(private)
}

fn page(state: &AppState, locals: Locals, template: &str, mut data: Value) -> Result<Html<String>, AppError> {
    if let (Value::Object(bag), Some(user)) = (&mut data, locals.user) {
        let user = serde_json::to_value(user).map_err(|e| AppError::Internal(e.into()))?;
        bag.insert("user".into(), user);
    }
    Ok(Html(state.renderer.render(template, &data)?))
}

async fn overview(State(state): State<AppState>, locals: Locals) -> Result<Html<String>, AppError> {
    let tours = state.store.find(&FindQuery::new(Collection::Tours)).await?;
    page(&state, locals, "overview", json!({ "title": "All Tours", "tours": tours }))
}

async fn tour(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    locals: Locals,
) -> Result<Html<String>, AppError> {
    let found = state
        .store
        .find(&FindQuery::new(Collection::Tours).where_eq("slug", json!(slug)).limit(1))
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::NotFound("There is no tour with that name.".into()))?;
    let id = found.get("id").and_then(Value::as_str).unwrap_or_default();
    let tour = fetch_one::<Tours>(&state, id).await?;
    let title = tour.get("name").cloned().unwrap_or(Value::Null);
    page(&state, locals, "tour", json!({ "title": title, "tour": tour }))
}

async fn login(State(state): State<AppState>, locals: Locals) -> Result<Html<String>, AppError> {
    page(&state, locals, "login", json!({ "title": "Log into your account" }))
}

async fn account(State(state): State<AppState>, locals: Locals) -> Result<Html<String>, AppError> {
    page(&state, locals, "account", json!({ "title": "Your account" }))
}
