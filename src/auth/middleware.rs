//! Identity resolution and authorization guards.
//!
//! [`protect`] rejects requests it cannot authenticate; [`is_logged_in`] runs
//! the same resolution but always lets the request through.

use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;
use tracing::{debug, warn};

use super::token::JwtKeys;
use super::user::{self, Role, User};
use crate::error::AppError;
use crate::state::AppState;

pub const TOKEN_COOKIE: &str = "jwt";

/// The authenticated caller, attached by [`protect`].
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// Data merged into every rendered page.
#[derive(Debug, Clone, Default)]
pub struct Locals {
    pub user: Option<User>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(not_logged_in)
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Locals {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Locals>().cloned().unwrap_or_default())
    }
}

fn not_logged_in() -> AppError {
    AppError::Unauthorized("You are not logged in! Please log in to get access.".into())
}

/// Bearer header first, then the `jwt` cookie.
pub fn token_from(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer ").or_else(|| v.strip_prefix("bearer ")))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }
    CookieJar::from_headers(headers)
        .get(TOKEN_COOKIE)
        .map(|c| c.value().to_string())
        .filter(|t| !t.is_empty())
}

async fn resolve(state: &AppState, token: &str) -> Result<User, AppError> {
    let claims = JwtKeys::from_ref(state).verify(token)?;
    let user = user::find_by_id(state.store.as_ref(), claims.sub)
        .await?
        .ok_or_else(|| {
            AppError::Unauthorized("The user belonging to this token no longer exists.".into())
        })?;
    if user.changed_password_after(claims.iat_ms) {
        return Err(AppError::Unauthorized(
            "User recently changed password! Please log in again.".into(),
        ));
    }
    Ok(user)
}

pub async fn protect(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = token_from(req.headers()).ok_or_else(not_logged_in)?;
    let user = resolve(&state, &token).await.map_err(|e| {
        warn!(reason = %e, "rejected credentials");
        e
    })?;
    debug!(user_id = %user.id, role = ?user.role, "authenticated");
    req.extensions_mut().insert(CurrentUser(user.clone()));
    req.extensions_mut().insert(Locals { user: Some(user) });
    Ok(next.run(req).await)
}

pub async fn is_logged_in(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    if let Some(token) = token_from(req.headers()) {
        match resolve(&state, &token).await {
            Ok(user) => {
                req.extensions_mut().insert(Locals { user: Some(user) });
            }
            Err(e) => debug!(reason = %e, "continuing anonymously"),
        }
    }
    next.run(req).await
}

/// Role check over an identity attached by [`protect`].
pub fn authorize(user: Option<&User>, roles: &[Role]) -> Result<(), AppError> {
    let user = user.ok_or_else(not_logged_in)?;
    if roles.contains(&user.role) {
        Ok(())
    } else {
        warn!(user_id = %user.id, role = ?user.role, "role not permitted");
        Err(AppError::Forbidden(
            "You do not have permission to perform this action".into(),
        ))
    }
}

/// Must be layered inside [`protect`]:
/// `middleware::from_fn(|req: Request, next: Next| restrict_to(&[Role::Admin], req, next))`.
pub async fn restrict_to(roles: &'static [Role], req: Request, next: Next) -> Result<Response, AppError> {
    let current = req.extensions().get::<CurrentUser>().map(|c| &c.0);
    authorize(current, roles)?;
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use uuid::Uuid;

    fn with_role(role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: "Ada".into(),
            email: "ada@example.com".into(),
            photo: None,
            role,
            password: String::new(),
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
        }
    }

    #[test]
    fn restrict_to_admin() {
        let user = with_role(Role::User);
        assert!(matches!(
            authorize(Some(&user), &[Role::Admin]),
            Err(AppError::Forbidden(_))
        ));
        let admin = with_role(Role::Admin);
        assert!(authorize(Some(&admin), &[Role::Admin]).is_ok());
        assert!(matches!(
            authorize(None, &[Role::Admin]),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn bearer_wins_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("jwt=from-cookie"));
        assert_eq!(token_from(&headers).as_deref(), Some("from-cookie"));
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(token_from(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn no_token_without_header_or_cookie() {
        let mut headers = HeaderMap::new();
        assert!(token_from(&headers).is_none());
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert!(token_from(&headers).is_none());
    }
}
