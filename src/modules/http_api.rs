//! HTTP API 模块
//! 提供本地 HTTP 接口供页面渲染和管理端调用
//!
//! 端点：
//! - GET    /health                     健康检查
//! - GET    /hash?email=                计算身份哈希
//! - GET    /avatar?email=&size=...     生成头像 URL
//! - GET    /whitelist/:kind            列出白名单 (domains | addresses)   [admin]
//! - POST   /whitelist/:kind            添加白名单条目 (`;` 分隔)          [admin]
//! - DELETE /whitelist/:kind            移除白名单条目                     [admin]
//! - GET    /salts                      查看盐值                           [admin]
//! - POST   /salts/regenerate           重新生成盐值                       [admin]
//! - PUT    /salts                      设置自定义盐值                     [admin]

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};

use crate::commands::admin;
use crate::middleware::access_log::access_log_middleware;
use crate::middleware::auth::{admin_auth_middleware, AdminSecurityConfig};
use crate::modules::settings::Settings;
use crate::privacy::avatar_url::{self, AvatarOptions};
use crate::privacy::engine::ObfuscationEngine;
use crate::privacy::whitelist::WhiteListKind;

/// 服务器状态
#[derive(Clone)]
pub struct ApiState {
    pub engine: Arc<ObfuscationEngine>,
    pub avatar_defaults: Arc<AvatarOptions>,
    pub access_log_enabled: Arc<RwLock<bool>>,
}

impl ApiState {
    pub fn new(engine: Arc<ObfuscationEngine>, settings: &Settings) -> Self {
        Self {
            engine,
            avatar_defaults: Arc::new(settings.avatar.clone()),
            access_log_enabled: Arc::new(RwLock::new(settings.access_log_enabled)),
        }
    }
}

pub(crate) fn api_error(status: StatusCode, error_type: &'static str, message: impl Into<String>) -> Response {
    let message = message.into();
    (
        status,
        Json(json!({
            "error": {
                "type": error_type,
                "message": message
            }
        })),
    )
        .into_response()
}

/// The store is synchronous (rusqlite); keep its calls off the async workers.
async fn run_blocking<T, F>(f: F) -> Result<T, Response>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        tracing::error!("[HTTP API] Blocking task failed: {}", e);
        api_error(StatusCode::INTERNAL_SERVER_ERROR, "api_error", "Internal task failed")
    })
}

fn parse_kind(kind: &str) -> Result<WhiteListKind, Response> {
    WhiteListKind::parse(kind).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            "not_found",
            format!("Unknown white-list `{}`; expected `domains` or `addresses`", kind),
        )
    })
}

// ============================================================================
// Response / Request Types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

#[derive(Serialize)]
struct HashResponse {
    hash: String,
    obfuscated: bool,
}

#[derive(Deserialize)]
struct HashRequest {
    #[serde(default)]
    email: String,
}

#[derive(Deserialize)]
struct AvatarRequest {
    #[serde(default)]
    email: String,
    size: Option<u32>,
    default: Option<String>,
    rating: Option<String>,
    force_default: Option<bool>,
    secure: Option<bool>,
}

#[derive(Deserialize)]
struct AddEntriesRequest {
    entries: String,
}

#[derive(Deserialize)]
struct RemoveEntriesRequest {
    entries: Vec<String>,
}

#[derive(Deserialize)]
struct CustomSaltsRequest {
    #[serde(default)]
    first: String,
    #[serde(default)]
    second: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health - 健康检查
async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /hash - 计算身份哈希
async fn compute_hash(State(state): State<ApiState>, Query(params): Query<HashRequest>) -> Response {
    let engine = state.engine.clone();
    let identity = match run_blocking(move || engine.compute_identity_hash(&params.email)).await {
        Ok(identity) => identity,
        Err(resp) => return resp,
    };
    Json(HashResponse {
        obfuscated: identity.is_obfuscated(),
        hash: identity.into_string(),
    })
    .into_response()
}

/// GET /avatar - 生成头像 URL
async fn avatar(State(state): State<ApiState>, Query(params): Query<AvatarRequest>) -> Response {
    let defaults = state.avatar_defaults.as_ref();
    let options = AvatarOptions {
        size: params.size.unwrap_or(defaults.size),
        default_image: params.default.unwrap_or_else(|| defaults.default_image.clone()),
        force_default: params.force_default.unwrap_or(defaults.force_default),
        rating: params.rating.unwrap_or_else(|| defaults.rating.clone()),
        secure: params.secure.unwrap_or(defaults.secure),
    };

    let engine = state.engine.clone();
    let email = params.email;
    match run_blocking(move || avatar_url::resolve_avatar(&engine, &email, &options)).await {
        Ok(Ok(data)) => Json(data).into_response(),
        Ok(Err(e)) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "api_error", e),
        Err(resp) => resp,
    }
}

/// GET /whitelist/:kind - 列出白名单
async fn list_whitelist(State(state): State<ApiState>, Path(kind): Path<String>) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let engine = state.engine.clone();
    match run_blocking(move || admin::list_whitelist(&engine, kind)).await {
        Ok(view) => Json(view).into_response(),
        Err(resp) => resp,
    }
}

/// POST /whitelist/:kind - 添加白名单条目
async fn add_whitelist(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Json(payload): Json<AddEntriesRequest>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let engine = state.engine.clone();
    match run_blocking(move || admin::add_to_whitelist(&engine, kind, &payload.entries)).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => api_error(StatusCode::BAD_REQUEST, "invalid_request_error", e),
        Err(resp) => resp,
    }
}

/// DELETE /whitelist/:kind - 移除白名单条目
async fn remove_whitelist(
    State(state): State<ApiState>,
    Path(kind): Path<String>,
    Json(payload): Json<RemoveEntriesRequest>,
) -> Response {
    let kind = match parse_kind(&kind) {
        Ok(kind) => kind,
        Err(resp) => return resp,
    };
    let engine = state.engine.clone();
    match run_blocking(move || admin::remove_from_whitelist(&engine, kind, &payload.entries)).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "api_error", e),
        Err(resp) => resp,
    }
}

/// GET /salts - 查看盐值
async fn get_salts(State(state): State<ApiState>) -> Response {
    let engine = state.engine.clone();
    match run_blocking(move || admin::get_salts(&engine)).await {
        Ok(view) => Json(view).into_response(),
        Err(resp) => resp,
    }
}

/// POST /salts/regenerate - 重新生成盐值
async fn regenerate_salts(State(state): State<ApiState>) -> Response {
    let engine = state.engine.clone();
    match run_blocking(move || admin::regenerate_salts(&engine)).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "api_error", e),
        Err(resp) => resp,
    }
}

/// PUT /salts - 设置自定义盐值
async fn set_custom_salts(State(state): State<ApiState>, Json(payload): Json<CustomSaltsRequest>) -> Response {
    let engine = state.engine.clone();
    match run_blocking(move || admin::set_custom_salts(&engine, &payload.first, &payload.second)).await {
        Ok(Ok(outcome)) => Json(outcome).into_response(),
        Ok(Err(e)) => api_error(StatusCode::INTERNAL_SERVER_ERROR, "api_error", e),
        Err(resp) => resp,
    }
}

// ============================================================================
// Server
// ============================================================================

pub fn build_router(state: ApiState, security: AdminSecurityConfig) -> Router {
    let security = Arc::new(RwLock::new(security));

    // CORS 配置 - 允许本地调用
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let admin_routes = Router::new()
        .route(
            "/whitelist/:kind",
            get(list_whitelist).post(add_whitelist).delete(remove_whitelist),
        )
        .route("/salts", get(get_salts).put(set_custom_salts))
        .route("/salts/regenerate", post(regenerate_salts))
        .route_layer(axum::middleware::from_fn_with_state(security, admin_auth_middleware));

    Router::new()
        .route("/health", get(health))
        .route("/hash", get(compute_hash))
        .route("/avatar", get(avatar))
        .merge(admin_routes)
        .layer(axum::middleware::from_fn_with_state(state.clone(), access_log_middleware))
        .layer(cors)
        .with_state(state)
}

/// 启动 HTTP API 服务器
pub async fn start_server(settings: &Settings, engine: Arc<ObfuscationEngine>) -> Result<(), String> {
    let state = ApiState::new(engine, settings);
    let security = AdminSecurityConfig {
        api_key: settings.admin_api_key.trim().to_string(),
    };
    if security.api_key.is_empty() {
        tracing::warn!("[HTTP API] admin_api_key is empty; admin routes will reject every request");
    }
    let app = build_router(state, security);

    let addr = settings.listen_addr();
    tracing::info!("[HTTP API] 启动服务器: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| format!("绑定端口失败: {}", e))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| format!("服务器运行失败: {}", e))?;

    Ok(())
}
