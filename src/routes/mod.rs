//! Route tables. Guards are attached per group with `route_layer`, so the
//! same path can carry public and protected methods.

pub mod bookings;
pub mod reviews;
pub mod tours;
pub mod users;
pub mod views;

use axum::{
    extract::Request,
    middleware::{self, Next},
    Router,
};

use crate::auth::{protect, restrict_to, Role};
use crate::state::AppState;

pub(crate) const STAFF: &[Role] = &[Role::Admin, Role::LeadGuide];

/// Requires a valid session.
pub(crate) fn authenticated(router: Router<AppState>, state: &AppState) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(state.clone(), protect))
}

/// Requires a valid session whose role is one of `roles`.
pub(crate) fn guarded(
    router: Router<AppState>,
    state: &AppState,
    roles: &'static [Role],
) -> Router<AppState> {
    let router = router.route_layer(middleware::from_fn(move |req: Request, next: Next| {
        restrict_to(roles, req, next)
    }));
    authenticated(router, state)
}
