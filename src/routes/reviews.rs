use axum::{
    routing::{get, patch, post},
    Router,
};

use super::guarded;
use crate::auth::Role;
use crate::resource::{handlers as generic, Reviews};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/reviews", get(generic::list::<Reviews>))
        .route("/reviews/:id", get(generic::get_one::<Reviews>));

    let writers = guarded(
        Router::new().route("/reviews", post(generic::create::<Reviews>)),
        state,
        &[Role::User],
    );

    let editors = guarded(
        Router::new().route(
            "/reviews/:id",
            patch(generic::update::<Reviews>).delete(generic::delete::<Reviews>),
        ),
        state,
        &[Role::User, Role::Admin],
    );

    public.merge(writers).merge(editors)
}
