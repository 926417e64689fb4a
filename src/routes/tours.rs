use axum::{
    routing::{get, patch, post},
    Router,
};

use super::{guarded, STAFF};
use crate::auth::Role;
use crate::resource::{handlers as generic, Reviews, Tours};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    let public = Router::new()
        .route("/tours", get(generic::list::<Tours>))
        .route("/tours/:tour_id", get(generic::get_one::<Tours>))
        .route("/tours/:tour_id/reviews", get(generic::list::<Reviews>));

    let staff = guarded(
        Router::new()
            .route("/tours", post(generic::create::<Tours>))
            .route(
                "/tours/:tour_id",
                patch(generic::update::<Tours>).delete(generic::delete::<Tours>),
            ),
        state,
        STAFF,
    );

    let reviewers = guarded(
        Router::new().route("/tours/:tour_id/reviews", post(generic::create::<Reviews>)),
        state,
        &[Role::User],
    );

    public.merge(staff).merge(reviewers)
}
