// Admin API key middleware
use axum::{
    extract::Request,
    extract::State,
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Default)]
pub struct AdminSecurityConfig {
    pub api_key: String,
}

fn extract_api_key(request: &Request) -> Option<&str> {
    let header_key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer ").or(Some(s)));

    if header_key.is_some() {
        return header_key;
    }

    request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok())
}

/// Guards the white-list and salt routes.
pub async fn admin_auth_middleware(
    State(security): State<Arc<RwLock<AdminSecurityConfig>>>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    // Allow CORS preflight regardless of auth policy.
    if request.method() == axum::http::Method::OPTIONS {
        return Ok(next.run(request).await);
    }

    let security = security.read().await.clone();

    if security.api_key.is_empty() {
        tracing::warn!("[Auth] Admin api_key is not configured; denying {}", request.uri().path());
        return Err(StatusCode::UNAUTHORIZED);
    }

    let authorized = extract_api_key(&request)
        .map(|k| k.trim() == security.api_key)
        .unwrap_or(false);

    if authorized {
        Ok(next.run(request).await)
    } else {
        tracing::info!("[Auth] Rejected admin request: {} {}", request.method(), request.uri().path());
        Err(StatusCode::UNAUTHORIZED)
    }
}
