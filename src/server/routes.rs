use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::catalog::{spawn_event_pump, BrowserId, ContextId, PageId};
use crate::config::ContextConfig;
use crate::engine::{BrowserHandle, BrowserLauncher, CdpConnection};
use crate::error::PilothouseError;

use super::AppState;

// --- Error mapping ---

pub(super) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<PilothouseError> for ApiError {
    fn from(err: PilothouseError) -> Self {
        use PilothouseError::*;
        let status = match &err {
            NotFound(_) | ElementNotFound(_) => StatusCode::NOT_FOUND,
            NoActiveResource(_) => StatusCode::CONFLICT,
            IndexOutOfRange { .. } | JavaScriptError(_) => StatusCode::BAD_REQUEST,
            Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            BrowserNotFound | BrowserLaunchFailed(_) | CdpConnectionFailed(_) | CdpError(_) => {
                StatusCode::BAD_GATEWAY
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

// --- Transport ---

pub(super) async fn health() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "server": "pilothouse",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub(super) async fn get_catalog(State(state): State<AppState>) -> ApiResult {
    let snapshot = state.catalog.snapshot().await;
    Ok(Json(serde_json::to_value(snapshot).map_err(PilothouseError::from)?))
}

// --- Creation ---

#[derive(Debug, Deserialize, Default)]
pub(super) struct NewBrowserRequest {
    headless: Option<bool>,
    executable: Option<String>,
}

pub(super) async fn new_browser(
    State(state): State<AppState>,
    payload: Option<Json<NewBrowserRequest>>,
) -> ApiResult {
    let req = payload.map(|Json(r)| r).unwrap_or_default();

    let launcher =
        BrowserLauncher::from_config(&state.config, req.headless, req.executable.as_deref())?;
    let (child, port, ws_url) = launcher.launch_and_wait().await?;

    let (conn, events) = CdpConnection::connect(&ws_url).await?;
    let handle = BrowserHandle::new(Some(child), conn, port);
    handle.client().enable_target_events().await?;

    let id = state.catalog.add_browser(handle).await?;
    spawn_event_pump(state.catalog.clone(), id, events);

    tracing::info!("{} launched on port {}", id, port);
    Ok(Json(json!({ "id": id.to_string() })))
}

pub(super) async fn new_context(
    State(state): State<AppState>,
    payload: Option<Json<ContextConfig>>,
) -> ApiResult {
    let config = payload.map(|Json(c)| c).unwrap_or_default();

    let (browser_id, browser) = state.catalog.active_browser().await?;
    let client = browser.create_context(&config).await?;
    let id = state.catalog.add_context(browser_id, client, config).await?;

    Ok(Json(json!({ "id": id.to_string() })))
}

#[derive(Debug, Deserialize, Default)]
pub(super) struct NewPageRequest {
    url: Option<String>,
}

pub(super) async fn new_page(
    State(state): State<AppState>,
    payload: Option<Json<NewPageRequest>>,
) -> ApiResult {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let url = req.url.unwrap_or_else(|| "about:blank".to_string());

    let (context_id, context, config) = state.catalog.active_context().await?;
    let page = context.create_page(&url).await?;
    page.apply_config(&config).await?;
    let id = state.catalog.add_page(context_id, page, Some(url)).await?;

    Ok(Json(json!({ "id": id.to_string() })))
}

// --- Close ---

#[derive(Debug, Deserialize, Default)]
pub(super) struct CloseRequest {
    id: Option<String>,
}

pub(super) async fn close_browser(
    State(state): State<AppState>,
    payload: Option<Json<CloseRequest>>,
) -> ApiResult {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let id = match req.id {
        Some(raw) => Some(
            BrowserId::parse(&raw).ok_or_else(|| ApiError::bad_request(format!("invalid browser id: {raw}")))?,
        ),
        None => state.catalog.active_browser().await.ok().map(|(id, _)| id),
    };

    if let Some(id) = id {
        state.catalog.close_browser(id).await?;
    }
    Ok(Json(json!({ "closed": true })))
}

pub(super) async fn close_all_browsers(State(state): State<AppState>) -> ApiResult {
    state.catalog.close_all_browsers().await?;
    Ok(Json(json!({ "closed": true })))
}

pub(super) async fn close_context(
    State(state): State<AppState>,
    payload: Option<Json<CloseRequest>>,
) -> ApiResult {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let id = match req.id {
        Some(raw) => Some(
            ContextId::parse(&raw).ok_or_else(|| ApiError::bad_request(format!("invalid context id: {raw}")))?,
        ),
        None => state
            .catalog
            .active_context()
            .await
            .ok()
            .map(|(id, _, _)| id),
    };

    if let Some(id) = id {
        state.catalog.close_context(id).await?;
    }
    Ok(Json(json!({ "closed": true })))
}

pub(super) async fn close_page(
    State(state): State<AppState>,
    payload: Option<Json<CloseRequest>>,
) -> ApiResult {
    let req = payload.map(|Json(r)| r).unwrap_or_default();
    let id = match req.id {
        Some(raw) => Some(
            PageId::parse(&raw).ok_or_else(|| ApiError::bad_request(format!("invalid page id: {raw}")))?,
        ),
        None => state.catalog.active_page().await.ok().map(|(id, _)| id),
    };

    if let Some(id) = id {
        state.catalog.close_page(id).await?;
    }
    Ok(Json(json!({ "closed": true })))
}

// --- Switching ---

#[derive(Debug, Deserialize)]
pub(super) struct SwitchIndexRequest {
    index: usize,
}

pub(super) async fn switch_browser(
    State(state): State<AppState>,
    Json(req): Json<SwitchIndexRequest>,
) -> ApiResult {
    let id = state.catalog.switch_browser(req.index).await?;
    Ok(Json(json!({ "id": id.to_string() })))
}

pub(super) async fn switch_context(
    State(state): State<AppState>,
    Json(req): Json<SwitchIndexRequest>,
) -> ApiResult {
    let id = state.catalog.switch_context(req.index).await?;
    Ok(Json(json!({ "id": id.to_string() })))
}

#[derive(Debug, Deserialize)]
pub(super) struct SwitchPageRequest {
    id: String,
    timeout_ms: Option<u64>,
}

pub(super) async fn switch_page(
    State(state): State<AppState>,
    Json(req): Json<SwitchPageRequest>,
) -> ApiResult {
    let timeout =
        Duration::from_millis(req.timeout_ms.unwrap_or(state.config.server.switch_timeout_ms));
    let id = state.catalog.switch_page(&req.id, timeout).await?;
    Ok(Json(json!({ "id": id.to_string() })))
}

// --- Navigation ---

#[derive(Debug, Deserialize)]
pub(super) struct GotoRequest {
    url: String,
}

pub(super) async fn goto(
    State(state): State<AppState>,
    Json(req): Json<GotoRequest>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.navigate(&req.url).await?;
    Ok(Json(json!({ "url": req.url })))
}

pub(super) async fn reload(State(state): State<AppState>) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.reload().await?;
    Ok(Json(json!({})))
}

pub(super) async fn back(State(state): State<AppState>) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.go_back().await?;
    Ok(Json(json!({})))
}

pub(super) async fn forward(State(state): State<AppState>) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.go_forward().await?;
    Ok(Json(json!({})))
}

// --- Getters ---

pub(super) async fn page_url(State(state): State<AppState>) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    let url = page.url().await?;
    Ok(Json(json!({ "url": url })))
}

pub(super) async fn page_title(State(state): State<AppState>) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    let title = page.title().await?;
    Ok(Json(json!({ "title": title })))
}

#[derive(Debug, Deserialize, Default)]
pub(super) struct SelectorQuery {
    selector: Option<String>,
}

pub(super) async fn page_html(
    State(state): State<AppState>,
    Query(query): Query<SelectorQuery>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    let html = page.html(query.selector.as_deref()).await?;
    Ok(Json(json!({ "html": html })))
}

pub(super) async fn page_text(
    State(state): State<AppState>,
    Query(query): Query<SelectorQuery>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    let text = page.text(query.selector.as_deref()).await?;
    Ok(Json(json!({ "text": text })))
}

// --- Interaction ---

#[derive(Debug, Deserialize)]
pub(super) struct SelectorRequest {
    selector: String,
}

pub(super) async fn click(
    State(state): State<AppState>,
    Json(req): Json<SelectorRequest>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.click(&req.selector).await?;
    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
pub(super) struct TypeRequest {
    selector: String,
    text: String,
}

pub(super) async fn type_text(
    State(state): State<AppState>,
    Json(req): Json<TypeRequest>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.type_text(&req.selector, &req.text).await?;
    Ok(Json(json!({})))
}

pub(super) async fn fill(
    State(state): State<AppState>,
    Json(req): Json<TypeRequest>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.fill(&req.selector, &req.text).await?;
    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
pub(super) struct PressRequest {
    key: String,
}

pub(super) async fn press(
    State(state): State<AppState>,
    Json(req): Json<PressRequest>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    page.press(&req.key).await?;
    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
pub(super) struct EvaluateRequest {
    expression: String,
}

pub(super) async fn evaluate(
    State(state): State<AppState>,
    Json(req): Json<EvaluateRequest>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    let result = page.eval(&req.expression).await?;
    Ok(Json(json!({ "result": result })))
}

#[derive(Debug, Deserialize)]
pub(super) struct WaitForRequest {
    selector: String,
    timeout_ms: Option<u64>,
}

pub(super) async fn wait_for(
    State(state): State<AppState>,
    Json(req): Json<WaitForRequest>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    let timeout = Duration::from_millis(req.timeout_ms.unwrap_or(30_000));
    page.wait_for_element(&req.selector, timeout).await?;
    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize, Default)]
pub(super) struct ScreenshotQuery {
    #[serde(default)]
    full_page: bool,
}

pub(super) async fn screenshot(
    State(state): State<AppState>,
    Query(query): Query<ScreenshotQuery>,
) -> ApiResult {
    let (_, page) = state.catalog.active_page().await?;
    let bytes = page.screenshot(query.full_page).await?;
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(Json(json!({ "data": encoded })))
}

// --- Cookies ---

pub(super) async fn get_cookies(State(state): State<AppState>) -> ApiResult {
    let (_, context, _) = state.catalog.active_context().await?;
    let cookies = context.cookies().await?;
    Ok(Json(json!({ "cookies": cookies })))
}

#[derive(Debug, Deserialize)]
pub(super) struct SetCookieRequest {
    name: String,
    value: String,
    domain: Option<String>,
    path: Option<String>,
    url: Option<String>,
}

pub(super) async fn set_cookie(
    State(state): State<AppState>,
    Json(req): Json<SetCookieRequest>,
) -> ApiResult {
    let (_, context, _) = state.catalog.active_context().await?;

    let mut cookie = json!({ "name": req.name, "value": req.value });
    if let Some(domain) = req.domain {
        cookie["domain"] = json!(domain);
        cookie["path"] = json!(req.path.unwrap_or_else(|| "/".to_string()));
    } else if let Some(url) = req.url {
        cookie["url"] = json!(url);
    } else {
        // Scope to wherever the active page currently is
        let (_, page) = state.catalog.active_page().await?;
        cookie["url"] = json!(page.url().await?);
    }

    context.set_cookie(cookie).await?;
    Ok(Json(json!({})))
}

pub(super) async fn clear_cookies(State(state): State<AppState>) -> ApiResult {
    let (_, context, _) = state.catalog.active_context().await?;
    context.clear_cookies().await?;
    Ok(Json(json!({})))
}
