use axum::{
    extract::Request,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::auth::user::User;
use crate::store::now_rfc3339;

/// Time the request entered the service, RFC 3339.
#[derive(Debug, Clone)]
pub struct RequestTime(pub String);

pub async fn stamp_request_time(mut req: Request, next: Next) -> Response {
    req.extensions_mut().insert(RequestTime(now_rfc3339()));
    next.run(req).await
}

/// `{status, requestedAt?, Total?, data: {data, user?}}`
#[derive(Debug, Serialize)]
pub struct Envelope<T: Serialize> {
    status: &'static str,
    #[serde(rename = "requestedAt", skip_serializing_if = "Option::is_none")]
    requested_at: Option<String>,
    #[serde(rename = "Total", skip_serializing_if = "Option::is_none")]
    total: Option<usize>,
    data: Payload<T>,
}

#[derive(Debug, Serialize)]
struct Payload<T: Serialize> {
    data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    user: Option<User>,
}

impl<T: Serialize> Envelope<T> {
    pub fn new(data: T) -> Self {
        Self {
            status: "success",
            requested_at: None,
            total: None,
            data: Payload { data, user: None },
        }
    }

    pub fn total(mut self, n: usize) -> Self {
        self.total = Some(n);
        self
    }

    pub fn requested_at(mut self, at: Option<RequestTime>) -> Self {
        self.requested_at = at.map(|RequestTime(t)| t);
        self
    }

    pub fn user(mut self, user: Option<User>) -> Self {
        self.data.user = user;
        self
    }
}

impl<T: Serialize> IntoResponse for Envelope<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}
