use axum::{
    routing::{get, patch, post},
    Router,
};

use super::{authenticated, guarded};
use crate::auth::{handlers as auth, Role};
use crate::resource::{handlers as generic, Users};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/users/signup", post(auth::signup))
        .route("/users/login", post(auth::login))
        .route("/users/logout", get(auth::logout))
        .route("/users/forgot-password", post(auth::forgot_password))
        .route("/users/password-reset/:token", patch(auth::reset_password));

    let account = authenticated(
        Router::new()
            .route("/users/me", get(auth::me))
            .route("/users/update-me", patch(auth::update_me))
            .route("/users/update-password", patch(auth::update_password)),
        state,
    );

    let admin = guarded(
        Router::new()
            .route("/users", get(generic::list::<Users>))
            .route(
                "/users/:id",
                get(generic::get_one::<Users>)
                    .patch(generic::update::<Users>)
                    .delete(generic::delete::<Users>),
            ),
        state,
        &[Role::Admin],
    );

    public.merge(account).merge(admin)
}
