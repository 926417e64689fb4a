use axum::{routing::get, Router};

use super::{guarded, STAFF};
use crate::resource::{handlers as generic, Bookings};
use crate::state::AppState;

pub fn router(state: &AppState) -> Router<AppState> {
    guarded(
        Router::new()
            .route(
                "/bookings",
                get(generic::list::<Bookings>).post(generic::create::<Bookings>),
            )
            .route(
                "/bookings/:id",
                get(generic::get_one::<Bookings>)
                    .patch(generic::update::<Bookings>)
                    .delete(generic::delete::<Bookings>),
            ),
        state,
        STAFF,
    )
}
