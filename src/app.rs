use std::net::SocketAddr;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderName, HeaderValue, Uri},
    middleware,
    routing::get,
    Router,
};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};

use crate::auth::is_logged_in;
use crate::error::{normalize_errors, AppError};
use crate::response::stamp_request_time;
use crate::routes;
use crate::state::AppState;

/// JSON bodies above this size are refused with 413.
pub const BODY_LIMIT: usize = 10 * 1024;

async fn not_found(uri: Uri) -> AppError {
    AppError::NotFound(format!("Can't find {} on this server!", uri.path()))
}

/// Baseline security headers, set only when a handler has not chosen its own.
fn security_headers(router: Router) -> Router {
    let headers: [(HeaderName, &'static str); 6] = [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
        (header::REFERRER_POLICY, "no-referrer"),
        (header::X_DNS_PREFETCH_CONTROL, "off"),
        (header::X_XSS_PROTECTION, "0"),
        (header::STRICT_TRANSPORT_SECURITY, "max-age=15552000; includeSubDomains"),
    ];
    headers.into_iter().fold(router, |router, (name, value)| {
        router.layer(SetResponseHeaderLayer::if_not_present(
            name,
            HeaderValue::from_static(value),
        ))
    })
}

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(routes::tours::router(&state))
        .merge(routes::reviews::router(&state))
        .merge(routes::users::router(&state))
        .merge(routes::bookings::router(&state))
        .route("/health", get(|| async { "ok" }));

    let app = Router::new()
        .nest("/api/v1", api)
        .merge(routes::views::router(&state))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), is_logged_in))
        .layer(middleware::from_fn(stamp_request_time))
        .layer(middleware::from_fn_with_state(state.clone(), normalize_errors))
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .with_state(state);

    security_headers(app)
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    let method = req.method().clone();
                    let uri = req.uri().clone();
                    tracing::info_span!(
                        "http_request",
                        %method,
                        uri = %uri,
                        status = tracing::field::Empty
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        let status = res.status();
                        span.record("status", tracing::field::display(status));
                        let latency_ms = latency.as_millis() as u64;
                        if status.is_server_error() {
                            tracing::error!(%status, latency_ms, "response");
                        } else {
                            tracing::info!(%status, latency_ms, "response");
                        }
                    },
                ),
        )
}

pub async fn serve(app: Router) -> anyhow::Result<()> {
    let addr: SocketAddr = format!(
        "{}:{}",
        std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
        std::env::var("APP_PORT").unwrap_or_else(|_| "8080".into())
    )
    .parse()?;

    tracing::info!("listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
