use axum::{
    extract::{FromRef, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use axum_extra::extract::{
    cookie::{Cookie, CookieJar},
    WithRejection,
};
use serde::Deserialize;
use serde_json::{json, Value};
use time::{format_description::well_known::Rfc3339, Duration, OffsetDateTime};
use tracing::{error, info, instrument, warn};

use super::middleware::{CurrentUser, TOKEN_COOKIE};
use super::password::{check_new_password, hash_password, verify_password};
use super::token::{generate_raw_reset_token, hash_reset_token, JwtKeys};
use super::user::{self, User};
use crate::error::{AppError, JsonBody};
use crate::mail;
use crate::response::Envelope;
use crate::state::AppState;
use crate::store::{now_rfc3339, Collection, Document};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub password_current: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

/// Fields a user may change about themselves through `update-me`.
const SELF_EDITABLE: [&str; 3] = ["name", "email", "photo"];

fn attrs(v: Value) -> Document {
    match v {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

/// Issues a session token and returns it both in the body and as the `jwt`
/// cookie.
fn send_token(
    state: &AppState,
    user: User,
    status: StatusCode,
    jar: CookieJar,
) -> Result<impl IntoResponse, AppError> {
    let keys = JwtKeys::from_ref(state);
    let token = keys.issue(user.id)?;
    let cookie = Cookie::build((TOKEN_COOKIE, token.clone()))
        .path("/")
        .http_only(true)
        .secure(!state.config.environment.is_development())
        .max_age(Duration::days(state.config.jwt.cookie_ttl_days));
    let body = json!({
        "status": "success",
        "token": token,
        "data": { "user": user },
    });
    Ok((status, jar.add(cookie), Json(body)))
}

#[instrument(skip(state, jar, payload))]
pub async fn signup(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): JsonBody<SignupRequest>,
) -> Result<impl IntoResponse, AppError> {
    check_new_password(&payload.password, &payload.password_confirm)?;
    let hash = hash_password(&payload.password)?;

    let mut doc = attrs(json!({
        "password": hash,
        "passwordChangedAt": now_rfc3339(),
        "role": "user",
    }));
    if let Some(name) = payload.name {
        doc.insert("name".into(), Value::String(name));
    }
    if let Some(email) = payload.email {
        doc.insert("email".into(), Value::String(email));
    }

    let created = state.store.create(Collection::Users, doc).await?;
    let user = User::from_document(created)?;
    info!(user_id = %user.id, email = %user.email, "user signed up");
    send_token(&state, user, StatusCode::CREATED, jar)
}

#[instrument(skip(state, jar, payload))]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(payload), _): JsonBody<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (Some(email), Some(password)) = (payload.email, payload.password) else {
        return Err(AppError::BadRequest("Please provide email and password!".into()));
    };

    let incorrect = || AppError::Unauthorized("Incorrect email or password".into());
    let Some(user) = user::find_by_email(state.store.as_ref(), &email).await? else {
        warn!(email = %email, "login unknown email");
        return Err(incorrect());
    };
    if !verify_password(&password, &user.password)? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(incorrect());
    }

    info!(user_id = %user.id, "user logged in");
    send_token(&state, user, StatusCode::OK, jar)
}

pub async fn logout(jar: CookieJar) -> impl IntoResponse {
    let cookie = Cookie::build((TOKEN_COOKIE, ""))
        .path("/")
        .http_only(true)
        .max_age(Duration::seconds(10));
    (jar.add(cookie), Json(json!({ "status": "success" })))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    WithRejection(Json(payload), _): JsonBody<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let email = payload.email.unwrap_or_default();
    let user = user::find_by_email(state.store.as_ref(), &email)
        .await?
        .ok_or_else(|| AppError::NotFound("There is no user with that email address.".into()))?;
    let id = user.id.to_string();

    let raw = generate_raw_reset_token();
    let ttl = state.config.reset_token_ttl_minutes;
    let expires = (OffsetDateTime::now_utc() + Duration::minutes(ttl))
        .format(&Rfc3339)
        .map_err(|e| AppError::Internal(e.into()))?;
    state
        .store
        .find_by_id_and_update(
            Collection::Users,
            &id,
            attrs(json!({
                "passwordResetToken": hash_reset_token(&raw),
                "passwordResetExpires": expires,
            })),
        )
        .await?;

    let url = format!(
        "{}/api/v1/users/password-reset/{}",
        state.config.public_url.trim_end_matches('/'),
        raw
    );
    let email = mail::password_reset(&user.name, &url, ttl);
    if let Err(e) = state.mailer.send(&user.email, &email.subject, &email.html).await {
        error!(error = %e, user_id = %user.id, "reset email delivery failed");
        state
            .store
            .find_by_id_and_update(
                Collection::Users,
                &id,
                attrs(json!({ "passwordResetToken": null, "passwordResetExpires": null })),
            )
            .await?;
        return Err(AppError::Dependency(
            "There was an error sending the email. Try again later!".into(),
        ));
    }

    info!(user_id = %user.id, "reset token sent");
    Ok(Json(json!({ "status": "success", "message": "Token sent to email!" })))
}

#[instrument(skip_all)]
pub async fn reset_password(
    State(state): State<AppState>,
    Path(raw): Path<String>,
    jar: CookieJar,
    WithRejection(Json(payload), _): JsonBody<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    let hash = hash_reset_token(&raw);
    let user = user::find_by_reset_hash(state.store.as_ref(), &hash)
        .await?
        .filter(|u| u.reset_token_valid_at(OffsetDateTime::now_utc()))
        .ok_or_else(|| AppError::BadRequest("Token is invalid or has expired".into()))?;
    check_new_password(&payload.password, &payload.password_confirm)?;

    let updated = state
        .store
        .find_by_id_and_update(
            Collection::Users,
            &user.id.to_string(),
            attrs(json!({
                "password": hash_password(&payload.password)?,
                "passwordChangedAt": now_rfc3339(),
                "passwordResetToken": null,
                "passwordResetExpires": null,
            })),
        )
        .await?
        .ok_or_else(|| AppError::BadRequest("Token is invalid or has expired".into()))?;

    info!(user_id = %user.id, "password reset");
    send_token(&state, User::from_document(updated)?, StatusCode::OK, jar)
}

#[instrument(skip_all)]
pub async fn update_password(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    jar: CookieJar,
    WithRejection(Json(payload), _): JsonBody<UpdatePasswordRequest>,
) -> Result<impl IntoResponse, AppError> {
    if !verify_password(&payload.password_current, &current.password)? {
        return Err(AppError::Unauthorized("Your current password is wrong.".into()));
    }
    check_new_password(&payload.password, &payload.password_confirm)?;

    let updated = state
        .store
        .find_by_id_and_update(
            Collection::Users,
            &current.id.to_string(),
            attrs(json!({
                "password": hash_password(&payload.password)?,
                "passwordChangedAt": now_rfc3339(),
            })),
        )
        .await?
        .ok_or_else(|| AppError::NotFound("No document found with that ID".into()))?;

    info!(user_id = %current.id, "password updated");
    send_token(&state, User::from_document(updated)?, StatusCode::OK, jar)
}

#[instrument(skip_all)]
pub async fn update_me(
    State(state): State<AppState>,
    CurrentUser(current): CurrentUser,
    WithRejection(Json(body), _): JsonBody<Document>,
) -> Result<impl IntoResponse, AppError> {
    if body.contains_key("password") || body.contains_key("passwordConfirm") {
        return Err(AppError::BadRequest(
            "This route is not for password updates. Please use /update-password.".into(),
        ));
    }
    let changes: Document = body
        .into_iter()
        .filter(|(k, _)| SELF_EDITABLE.contains(&k.as_str()))
        .collect();

    let updated = state
        .store
        .find_by_id_and_update(Collection::Users, &current.id.to_string(), changes)
        .await?
        .ok_or_else(|| AppError::NotFound("No document found with that ID".into()))?;
    let user = User::from_document(updated)?;
    Ok(Json(json!({ "status": "success", "data": { "user": user } })))
}

/// The caller's own user document.
pub async fn me(CurrentUser(current): CurrentUser) -> Envelope<User> {
    Envelope::new(current)
}
