use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::time::Instant;

use crate::modules::http_api::ApiState;

/// Query parameter names only; values may be e-mail addresses.
fn query_keys(request: &Request) -> String {
    request
        .uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .map(|(k, _)| k.into_owned())
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

fn has_credentials(request: &Request) -> bool {
    let headers = request.headers();
    headers.contains_key(header::AUTHORIZATION) || headers.contains_key("x-api-key")
}

pub async fn access_log_middleware(State(state): State<ApiState>, request: Request, next: Next) -> Response {
    if !*state.access_log_enabled.read().await {
        return next.run(request).await;
    }

    let started = Instant::now();
    let method = request.method().clone();
    let route = request.uri().path().to_owned();
    let params = query_keys(&request);
    let keyed = has_credentials(&request);

    let response = next.run(request).await;
    let status = response.status();
    let elapsed = started.elapsed().as_millis();

    if status == StatusCode::UNAUTHORIZED || status.is_server_error() {
        tracing::warn!(
            "[Access] {} {} [{}] -> {} in {}ms (key: {})",
            method, route, params, status.as_u16(), elapsed, keyed
        );
    } else {
        tracing::info!(
            "[Access] {} {} [{}] -> {} in {}ms",
            method, route, params, status.as_u16(), elapsed
        );
    }
    response
}
