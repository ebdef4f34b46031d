//! HTTP handlers for the resource library
//!
//! - GET    /health
//! - GET    /api/categories
//! - GET    /api/resources/load-all         paginated listing
//! - GET    /api/resources/search-all       whole library for client-side search
//! - GET    /api/resources/search?q=        substring search
//! - GET    /api/resources/stats
//! - POST   /api/resources/batch
//! - POST   /api/resources/export
//! - GET    /api/resources/:category
//! - POST   /api/resources/:category
//! - GET    /api/resources/:category/:id
//! - PUT    /api/resources/:category/:id
//! - DELETE /api/resources/:category/:id
//! - POST   /api/resources/:category/:id/media
//! - DELETE /api/resources/:category/:id/media/:index
//! - POST   /api/chat

use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use heritage_library_schemas::{
    BatchRequest, ChatRequest, ExportRequest, ListOptions, MediaRef, ResourceId, SortBy,
    SortOrder,
};
use heritage_library_search::{
    list_all, search_all, search_resources, LibraryStats, ResourceMatcher,
};
use heritage_library_store::{
    attach_media, export_resources, release_blobs, remove_media, upload_media, BatchEngine,
    BlobStore, LibraryConfig, LibraryError, LibraryStore,
};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::composer::Composer;

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<LibraryStore>>,
    pub blobs: Arc<dyn BlobStore>,
    pub engine: BatchEngine,
    pub matcher: ResourceMatcher,
    pub composer: Composer,
}

impl AppState {
    pub fn new(store: LibraryStore, blobs: Arc<dyn BlobStore>, config: &LibraryConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(store)),
            blobs,
            engine: BatchEngine::new(config.move_conflict),
            matcher: ResourceMatcher::default(),
            composer: Composer::new(),
        }
    }
}

/// Error body `{"success": false, "error": "..."}` with a matching status
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<LibraryError> for ApiError {
    fn from(err: LibraryError) -> Self {
        let status = match &err {
            LibraryError::NotFound(_) => StatusCode::NOT_FOUND,
            LibraryError::Validation(_) | LibraryError::Conflict(_) => StatusCode::BAD_REQUEST,
            LibraryError::Io(_) | LibraryError::Serialization(_) => {
                error!("Request failed: {}", err);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Largest accepted media upload
pub const MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// Build the full router
pub fn library_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/categories", get(list_categories))
        .route("/api/resources/load-all", get(load_all))
        .route("/api/resources/search-all", get(load_search_index))
        .route("/api/resources/search", get(search))
        .route("/api/resources/stats", get(statistics))
        .route("/api/resources/batch", post(batch))
        .route("/api/resources/export", post(export))
        .route(
            "/api/resources/:category",
            get(category_resources).post(create_resource),
        )
        .route(
            "/api/resources/:category/:id",
            get(get_resource).put(update_resource).delete(delete_resource),
        )
        .route(
            "/api/resources/:category/:id/media",
            post(add_media).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route(
            "/api/resources/:category/:id/media/:index",
            delete(delete_media),
        )
        .route("/api/chat", post(chat))
        .with_state(state)
}

// =============================================================================
// Listing and search
// =============================================================================

async fn health_check() -> impl IntoResponse {
    Json(json!({
        "service": "heritage-library",
        "status": "healthy",
        "version": "0.1.0"
    }))
}

/// GET /api/categories
async fn list_categories(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    let categories: Vec<Value> = store
        .categories()
        .map(|(name, collection)| json!({ "name": name, "count": collection.len() }))
        .collect();

    Json(json!({
        "success": true,
        "count": categories.len(),
        "categories": categories,
    }))
}

/// Lenient parsing: bad numbers fall back to defaults, zero becomes one
fn list_options(params: &HashMap<String, String>) -> ListOptions {
    let defaults = ListOptions::default();
    let number = |key: &str, default: usize| {
        params
            .get(key)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(default)
            .max(1)
    };
    let text = |key: &str| {
        params
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };

    ListOptions {
        page: number("page", defaults.page),
        limit: number("limit", defaults.limit),
        sort_by: params
            .get("sortBy")
            .map(|v| SortBy::parse(v))
            .unwrap_or(defaults.sort_by),
        sort_order: params
            .get("sortOrder")
            .map(|v| SortOrder::parse(v))
            .unwrap_or(defaults.sort_order),
        category: text("category"),
        search: text("search"),
    }
}

/// GET /api/resources/load-all
async fn load_all(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let options = list_options(&params);
    let store = state.store.read().await;
    let page = list_all(&store, &options);

    info!(
        "Listing page {} of {} ({} items, category: {:?}, search: {:?})",
        page.pagination.current_page,
        page.pagination.total_pages,
        page.pagination.total_items,
        options.category,
        options.search
    );

    Json(json!({
        "success": true,
        "resources": page.resources,
        "pagination": page.pagination,
    }))
}

/// GET /api/resources/search-all
async fn load_search_index(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    let all = search_all(&store);

    Json(json!({
        "success": true,
        "resources": all.resources,
        "totalCount": all.total_count,
    }))
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    #[serde(default)]
    q: String,
    category: Option<String>,
}

/// GET /api/resources/search?q=&category=
async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let store = state.store.read().await;
    let results = search_resources(&store, &params.q, params.category.as_deref());

    Json(json!({
        "success": true,
        "count": results.len(),
        "query": params.q,
        "results": results,
    }))
}

/// GET /api/resources/stats
async fn statistics(State(state): State<AppState>) -> impl IntoResponse {
    let store = state.store.read().await;
    let stats = LibraryStats::collect(&store, Utc::now());

    Json(json!({ "success": true, "statistics": stats }))
}

// =============================================================================
// Single resource operations
// =============================================================================

/// GET /api/resources/:category
async fn category_resources(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> impl IntoResponse {
    let store = state.store.read().await;
    let resources = store.category_resources(&category);

    Json(json!({
        "success": true,
        "category": category,
        "count": resources.len(),
        "resources": resources,
    }))
}

/// POST /api/resources/:category
async fn create_resource(
    State(state): State<AppState>,
    Path(category): Path<String>,
    Json(fields): Json<Map<String, Value>>,
) -> ApiResult<impl IntoResponse> {
    let mut store = state.store.write().await;
    let resource = store.create(&category, fields)?;
    store.persist_category(&category)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({ "success": true, "resource": resource })),
    ))
}

/// GET /api/resources/:category/:id
async fn get_resource(
    State(state): State<AppState>,
    Path((category, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    // write lock: the first keyed read of a list-shaped category normalizes it
    let mut store = state.store.write().await;
    let resource = store.get(&category, &ResourceId(id))?;

    Ok(Json(json!({ "success": true, "resource": resource })))
}

/// PUT /api/resources/:category/:id
async fn update_resource(
    State(state): State<AppState>,
    Path((category, id)): Path<(String, String)>,
    Json(updates): Json<Map<String, Value>>,
) -> ApiResult<impl IntoResponse> {
    let mut store = state.store.write().await;
    let resource = store.update(&category, &ResourceId(id), &updates)?;
    store.persist_category(&category)?;

    Ok(Json(json!({ "success": true, "resource": resource })))
}

/// DELETE /api/resources/:category/:id
async fn delete_resource(
    State(state): State<AppState>,
    Path((category, id)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let id = ResourceId(id);
    let mut store = state.store.write().await;
    let removed = store
        .remove(&category, &id)
        .ok_or_else(|| LibraryError::resource_not_found(&category, &id))?;

    release_blobs(state.blobs.as_ref(), &removed);
    store.persist_category(&category)?;
    info!("Deleted resource {} from {}", id, category);

    Ok(Json(json!({ "success": true, "resource": removed })))
}

#[derive(Debug, Deserialize)]
struct UploadParams {
    name: Option<String>,
}

/// POST /api/resources/:category/:id/media
///
/// A JSON body is a ready `MediaRef` to attach; any other body is the file
/// itself, named by `?name=` and typed by `Content-Type`.
async fn add_media(
    State(state): State<AppState>,
    Path((category, id)): Path<(String, String)>,
    Query(params): Query<UploadParams>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let id = ResourceId(id);
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let mut store = state.store.write().await;

    let (media, resource) = if content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("application/json"))
    {
        let media: MediaRef = serde_json::from_slice(&body)
            .map_err(|e| ApiError::bad_request(format!("invalid media entry: {}", e)))?;
        let resource = attach_media(&mut store, &category, &id, media.clone())?;
        (media, resource)
    } else {
        let name = params
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request("file name is required (?name=)"))?;
        if body.is_empty() {
            return Err(ApiError::bad_request("no file uploaded"));
        }
        upload_media(
            &mut store,
            state.blobs.as_ref(),
            &category,
            &id,
            &name,
            content_type.as_deref(),
            &body,
        )?
    };

    store.persist_category(&category)?;
    info!(
        "Added {} media {} to {}/{}",
        media.kind.as_str(),
        media.name,
        category,
        id
    );

    Ok(Json(json!({
        "success": true,
        "mediaFile": media,
        "resource": resource,
    })))
}

/// DELETE /api/resources/:category/:id/media/:index
async fn delete_media(
    State(state): State<AppState>,
    Path((category, id, index)): Path<(String, String, usize)>,
) -> ApiResult<impl IntoResponse> {
    let mut store = state.store.write().await;
    let remaining = remove_media(
        &mut store,
        state.blobs.as_ref(),
        &category,
        &ResourceId(id),
        index,
    )?;
    store.persist_category(&category)?;

    Ok(Json(json!({ "success": true, "media": remaining })))
}

// =============================================================================
// Batch, export and chat
// =============================================================================

/// POST /api/resources/batch
async fn batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.action.trim().is_empty() || request.resources.is_empty() {
        return Err(ApiError::bad_request(
            "action and a non-empty resources list are required",
        ));
    }

    let mut store = state.store.write().await;
    let report = state.engine.apply(
        &mut store,
        state.blobs.as_ref(),
        &request.action,
        &request.resources,
        &request.options,
    )?;

    Ok(Json(json!({
        "success": true,
        "action": request.action,
        "summary": {
            "total": report.total,
            "success": report.success.len(),
            "failed": report.failed.len(),
        },
        "results": report,
    })))
}

/// Header-safe form of an export file name
fn attachment_header(filename: &str) -> HeaderValue {
    let ascii: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_graphic() && c != '"' && c != '\\' {
                c
            } else {
                '_'
            }
        })
        .collect();
    HeaderValue::from_str(&format!("attachment; filename=\"{}\"", ascii))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// POST /api/resources/export
async fn export(
    State(state): State<AppState>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<Response> {
    if request.resources.is_empty() {
        return Err(ApiError::bad_request("resources list is required"));
    }

    let mut store = state.store.write().await;
    let file = export_resources(
        &mut store,
        &request.resources,
        &request.format,
        &request.filename,
        Utc::now(),
    )?;
    drop(store);

    if !file.missing.is_empty() {
        warn!("Export skipped {} missing resources", file.missing.len());
    }

    let content_type = format!("{}; charset=utf-8", file.content_type);
    Ok((
        [
            (
                header::CONTENT_TYPE,
                HeaderValue::from_str(&content_type)
                    .unwrap_or_else(|_| HeaderValue::from_static("text/plain")),
            ),
            (header::CONTENT_DISPOSITION, attachment_header(&file.filename)),
        ],
        file.body,
    )
        .into_response())
}

/// POST /api/chat
async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.message.trim().is_empty() {
        return Err(ApiError::bad_request("message is required"));
    }

    let matches = {
        let store = state.store.read().await;
        state.matcher.find_matches(&store, &request.message)
    };
    info!("Chat message matched {} resources", matches.len());

    let reply = state.composer.compose(&request.message, &matches, Utc::now());

    Ok(Json(json!({
        "success": true,
        "response": reply.response,
        "media": reply.media,
        "resources": reply.resources,
        "timestamp": reply.timestamp,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use heritage_library_schemas::Resource;
    use heritage_library_store::DiskBlobStore;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn make_app() -> (Router, TempDir) {
        let dir = TempDir::new().unwrap();
        let config = LibraryConfig::new(dir.path());
        let mut store = LibraryStore::load(&config.knowledge_dir).unwrap();
        let mut duck = Resource {
            id: ResourceId::from("duck"),
            title: "北京烤鸭".to_string(),
            keywords: vec!["烤鸭".to_string()],
            ..Default::default()
        };
        duck.extra.insert("history".to_string(), json!("始于明代"));
        store.add("traditionalFoods", duck).unwrap();
        store.persist().unwrap();

        let blobs: Arc<dyn BlobStore> = Arc::new(DiskBlobStore::from_config(&config));
        (library_router(AppState::new(store, blobs, &config)), dir)
    }

    async fn body_json(response: Response) -> Value {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 256)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn json_request(method: &str, uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_get_resource_and_not_found() {
        let (app, _dir) = make_app();

        let resp = app
            .clone()
            .oneshot(get_request("/api/resources/traditionalFoods/duck"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["resource"]["title"], "北京烤鸭");

        let resp = app
            .oneshot(get_request("/api/resources/traditionalFoods/ghost"))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(resp).await["success"], false);
    }

    #[tokio::test]
    async fn test_load_all_with_lenient_params() {
        let (app, _dir) = make_app();
        let resp = app
            .oneshot(get_request(
                "/api/resources/load-all?page=0&limit=abc&sortBy=nonsense",
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["pagination"]["currentPage"], 1);
        assert_eq!(body["pagination"]["itemsPerPage"], 12);
        assert_eq!(body["pagination"]["totalItems"], 1);
        assert_eq!(
            body["resources"]["traditionalFoods"]["duck"]["title"],
            "北京烤鸭"
        );
    }

    #[tokio::test]
    async fn test_create_update_delete() {
        let (app, dir) = make_app();

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/resources/traditionalCrafts",
                json!({"title": "剪纸", "tags": "窗花,红色"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED);
        let created = body_json(resp).await;
        let id = created["resource"]["id"].as_str().unwrap().to_string();
        assert_eq!(created["resource"]["tags"], json!(["窗花", "红色"]));
        assert!(dir
            .path()
            .join("knowledge/traditionalCrafts/data.json")
            .exists());

        let resp = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/api/resources/traditionalCrafts/{}", id),
                json!({"description": "民间艺术"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["resource"]["description"], "民间艺术");

        let resp = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri(format!("/api/resources/traditionalCrafts/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app
            .oneshot(get_request(&format!(
                "/api/resources/traditionalCrafts/{}",
                id
            )))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_second_video_is_bad_request() {
        let (app, _dir) = make_app();
        let uri = "/api/resources/traditionalFoods/duck/media?name=duck.mp4";

        let upload = |app: Router| async move {
            app.oneshot(
                Request::builder()
                    .method("POST")
                    .uri(uri)
                    .header("content-type", "video/mp4")
                    .body(Body::from(vec![0u8; 16]))
                    .unwrap(),
            )
            .await
            .unwrap()
        };

        let resp = upload(app.clone()).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["mediaFile"]["type"], "video");

        let resp = upload(app.clone()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/api/resources/traditionalFoods/duck/media/0")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_json(resp).await["media"], json!([]));
    }

    #[tokio::test]
    async fn test_batch_requires_action_and_resources() {
        let (app, _dir) = make_app();

        let resp = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/api/resources/batch",
                json!({"action": "delete", "resources": []}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/resources/batch",
                json!({
                    "action": "tag",
                    "resources": [
                        {"category": "traditionalFoods", "id": "duck"},
                        {"category": "traditionalFoods", "id": "ghost"}
                    ],
                    "options": {"tags": ["北京"]}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["summary"]["success"], 1);
        assert_eq!(body["summary"]["failed"], 1);
        assert_eq!(body["results"]["success"][0]["action"], "tagged");
    }

    #[tokio::test]
    async fn test_export_sets_attachment_headers() {
        let (app, _dir) = make_app();
        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/resources/export",
                json!({
                    "resources": [{"category": "traditionalFoods", "id": "duck"}],
                    "format": "csv"
                }),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let disposition = resp.headers()[header::CONTENT_DISPOSITION]
            .to_str()
            .unwrap()
            .to_string();
        assert!(disposition.starts_with("attachment; filename=\"exported_resources_"));
        assert!(disposition.ends_with(".csv\""));
        assert!(resp.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/csv"));
    }

    #[tokio::test]
    async fn test_chat_finds_roast_duck() {
        let (app, _dir) = make_app();
        let resp = app
            .oneshot(json_request(
                "POST",
                "/api/chat",
                json!({"message": "烤鸭的历史"}),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["resources"][0]["id"], "duck");
        assert!(body["response"].as_str().unwrap().contains("始于明代"));
    }
}
