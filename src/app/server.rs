use crate::app::jobs::{JobRecord, JobRegistry};
use crate::config::toml_config::AppConfig;
use crate::core::chat::ChatService;
use crate::core::export::export_bundle;
use crate::core::pipeline::DocumentPipeline;
use crate::core::pipeline_sequence::ProgressReporter;
use crate::core::prompts;
use crate::core::stages::{parse_summary, parse_topic};
use crate::domain::model::{
    ChatMessage, DocumentRequest, ScrapedSource, SearchResult, SourceSummary, TopicAnalysis,
};
use crate::utils::error::{ErrorCategory, Result, ScholarError};
use crate::utils::text::{slugify, truncate_chars};
use crate::utils::validation::{require_http_url, require_text};
use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        FromRequest, FromRequestParts, Path, Query, State,
    },
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

const DEFAULT_SEARCH_LIMIT: usize = 10;

/// 將領域錯誤轉為 HTTP 回應
pub struct ApiError(ScholarError);

impl From<ScholarError> for ApiError {
    fn from(err: ScholarError) -> Self {
        Self(err)
    }
}

fn rejected(body: String) -> ApiError {
    ApiError(ScholarError::ValidationError { message: body })
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejected(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejected(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        rejected(rejection.body_text())
    }
}

/// 解析失敗時同樣回傳 `{error, category, suggestion}` 的 JSON 本文
#[derive(FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
struct ApiJson<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(ApiError))]
struct ApiPath<T>(T);

#[derive(FromRequestParts)]
#[from_request(via(Query), rejection(ApiError))]
struct ApiQuery<T>(T);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.category() {
            ErrorCategory::Validation => StatusCode::BAD_REQUEST,
            ErrorCategory::NotFound => StatusCode::NOT_FOUND,
            ErrorCategory::Conflict => StatusCode::CONFLICT,
            ErrorCategory::Network | ErrorCategory::Upstream => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("❌ Request failed: {}", self.0);
        } else {
            tracing::debug!("Request rejected: {}", self.0);
        }

        let body = json!({
            "error": self.0.user_friendly_message(),
            "category": format!("{:?}", self.0.category()).to_lowercase(),
            "suggestion": self.0.recovery_suggestion(),
        });
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<DocumentPipeline>,
    pub chat: Arc<ChatService>,
    pub jobs: JobRegistry,
}

impl AppState {
    pub fn new(pipeline: DocumentPipeline, chat: ChatService) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            chat: Arc::new(chat),
            jobs: JobRegistry::new(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let pipeline = DocumentPipeline::from_config(config)?;
        let chat = ChatService::new(pipeline.llm(), config.chat.clone());
        let mut state = Self::new(pipeline, chat);
        state.jobs = JobRegistry::with_capacity(config.server.max_jobs);
        Ok(state)
    }

    fn language(&self, requested: Option<String>) -> String {
        requested
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| self.pipeline.settings().language.clone())
    }
}

pub fn router(state: AppState, cors_permissive: bool) -> Router {
    let router = Router::new()
        .route("/health", get(health))
        .route("/api/chat", post(chat))
        .route("/api/topic", post(detect_topic))
        .route("/api/search", post(search))
        .route("/api/scrape", post(scrape))
        .route("/api/summarize", post(summarize))
        .route("/api/documents", post(create_document))
        .route("/api/documents/:id", get(get_document))
        .route("/api/documents/:id/export", get(export_document))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if cors_permissive {
        router.layer(CorsLayer::permissive())
    } else {
        router
    }
}

pub async fn serve(config: &AppConfig) -> Result<()> {
    let state = AppState::from_config(config)?;
    let app = router(state, config.server.cors_permissive);

    let listener = TcpListener::bind(&config.server.bind).await?;
    tracing::info!("🚀 Server listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("👋 Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("⚠️ Failed to listen for Ctrl+C: {}", e);
    }
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "jobs": state.jobs.count().await }))
}

#[derive(Deserialize)]
struct ChatRequest {
    messages: Vec<ChatMessage>,
}

async fn chat(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChatRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let reply = state.chat.reply(&request.messages).await?;
    Ok(Json(json!({ "reply": reply })))
}

#[derive(Deserialize)]
struct TopicRequest {
    prompt: String,
    #[serde(default)]
    language: Option<String>,
}

async fn detect_topic(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<TopicRequest>,
) -> ApiResult<Json<TopicAnalysis>> {
    require_text("prompt", &request.prompt)?;
    let language = state.language(request.language);

    let messages = prompts::topic_prompt(&request.prompt, &language);
    let answer = state.pipeline.llm().complete(&messages).await?;
    let topic = parse_topic(&answer).ok_or(ScholarError::EmptyCompletion)?;
    Ok(Json(topic))
}

#[derive(Deserialize)]
struct SearchRequest {
    query: String,
    #[serde(default)]
    limit: Option<usize>,
}

async fn search(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SearchRequest>,
) -> ApiResult<Json<Vec<SearchResult>>> {
    require_text("query", &request.query)?;
    let limit = request.limit.unwrap_or(DEFAULT_SEARCH_LIMIT).max(1);

    let results = state
        .pipeline
        .search_engine()
        .search(request.query.trim(), limit)
        .await?;
    Ok(Json(results))
}

#[derive(Deserialize)]
struct ScrapeRequest {
    url: String,
}

async fn scrape(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ScrapeRequest>,
) -> ApiResult<Json<ScrapedSource>> {
    let url = require_http_url("url", &request.url)?;
    let page = state.pipeline.fetcher().fetch(url.as_str()).await?;

    Ok(Json(ScrapedSource {
        id: 1,
        title: page.title,
        url: page.url,
        site_name: page.site_name,
        content: truncate_chars(&page.content, state.pipeline.settings().max_content_chars),
        fetched_at: Utc::now(),
    }))
}

#[derive(Deserialize)]
struct SummarizeRequest {
    topic: String,
    source: ScrapedSource,
    #[serde(default)]
    language: Option<String>,
}

async fn summarize(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SummarizeRequest>,
) -> ApiResult<Json<SourceSummary>> {
    require_text("topic", &request.topic)?;
    require_text("source.content", &request.source.content)?;
    let language = state.language(request.language);

    let messages = prompts::summary_prompt(&request.topic, &request.source, &language);
    let answer = state.pipeline.llm().complete(&messages).await?;
    Ok(Json(parse_summary(&request.source, &answer)))
}

async fn create_document(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<DocumentRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    DocumentPipeline::validate_request(&request)?;

    let id = state.jobs.create(&request.prompt).await?;
    tracing::info!("📥 Document job {} queued", id);

    tokio::spawn(run_job(
        Arc::clone(&state.pipeline),
        state.jobs.clone(),
        id,
        request,
    ));

    Ok((StatusCode::ACCEPTED, Json(json!({ "id": id }))))
}

/// 背景執行文件生成，進度事件即時寫入工作紀錄
async fn run_job(
    pipeline: Arc<DocumentPipeline>,
    jobs: JobRegistry,
    id: Uuid,
    request: DocumentRequest,
) {
    jobs.mark_running(id).await;

    let (reporter, mut events) = ProgressReporter::channel();
    let event_jobs = jobs.clone();
    let consumer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            event_jobs.record_event(id, event).await;
        }
    });

    let outcome = pipeline.run(&id.to_string(), request, reporter).await;
    // reporter 已在 run 結束時釋放，等候剩餘事件寫入
    if let Err(e) = consumer.await {
        tracing::warn!("⚠️ Progress consumer for job {} ended abnormally: {}", id, e);
    }

    match outcome {
        Ok(run) => {
            tracing::info!("✅ Document job {} completed: {}", id, run.document.title);
            jobs.complete(id, run).await;
        }
        Err(e) => {
            tracing::error!("❌ Document job {} failed: {}", id, e);
            jobs.fail(id, e.user_friendly_message()).await;
        }
    }
}

async fn get_document(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
) -> ApiResult<Json<JobRecord>> {
    Ok(Json(state.jobs.get(id).await?))
}

#[derive(Deserialize)]
struct ExportQuery {
    #[serde(default)]
    format: Option<String>,
}

async fn export_document(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<Uuid>,
    ApiQuery(query): ApiQuery<ExportQuery>,
) -> ApiResult<Response> {
    let job = state.jobs.completed(id).await?;
    let slug = slugify(&job.document.title);

    match query.format.as_deref().unwrap_or("markdown") {
        "markdown" | "md" => Ok((
            [
                (header::CONTENT_TYPE, "text/markdown; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}.md\"", slug),
                ),
            ],
            job.document.to_markdown(),
        )
            .into_response()),
        "zip" => {
            let bundle = export_bundle(&job.document, job.outline.as_ref(), &job.summaries)?;
            Ok((
                [
                    (header::CONTENT_TYPE, "application/zip".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}.zip\"", slug),
                    ),
                ],
                bundle,
            )
                .into_response())
        }
        other => Err(ScholarError::ValidationError {
            message: format!("unsupported export format '{}' (use markdown or zip)", other),
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::toml_config::{ChatConfig, PipelineSettings};
    use crate::domain::model::{FetchedPage, ProgressStatus};
    use crate::domain::ports::{ContentFetcher, LanguageModel, SearchEngine};
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    struct StaticModel;

    #[async_trait]
    impl LanguageModel for StaticModel {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
            match messages[0].content.as_str() {
                prompts::TOPIC_ROLE => Ok(r#"{"title": "Soil", "topic": "Soil erosion", "search_query": "soil erosion"}"#.to_string()),
                prompts::SUMMARY_ROLE => Ok("Erosion removes topsoil.\n- wind\n- water".to_string()),
                _ => Ok(format!("echo: {}", messages.last().map(|m| m.content.as_str()).unwrap_or(""))),
            }
        }
    }

    struct DownSearch;

    #[async_trait]
    impl SearchEngine for DownSearch {
        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchResult>> {
            Err(ScholarError::SearchError {
                message: "HTTP 503".to_string(),
            })
        }
    }

    struct NoFetcher;

    #[async_trait]
    impl ContentFetcher for NoFetcher {
        async fn fetch(&self, url: &str) -> Result<FetchedPage> {
            Err(ScholarError::ScrapeError {
                url: url.to_string(),
                reason: "unreachable".to_string(),
            })
        }
    }

    fn state() -> AppState {
        let llm: Arc<dyn LanguageModel> = Arc::new(StaticModel);
        let pipeline = DocumentPipeline::new(
            Arc::clone(&llm),
            Arc::new(DownSearch),
            Arc::new(NoFetcher),
            PipelineSettings::default(),
        );
        AppState::new(pipeline, ChatService::new(llm, ChatConfig::default()))
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn json_body(response: Response) -> serde_json::Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = router(state(), false)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_and_topic_endpoints() {
        let app = router(state(), false);

        let response = app
            .clone()
            .oneshot(post_json(
                "/api/chat",
                json!({ "messages": [{ "role": "user", "content": "hello" }] }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["reply"], "echo: hello");

        let response = app
            .oneshot(post_json("/api/topic", json!({ "prompt": "write about erosion" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(json_body(response).await["search_query"], "soil erosion");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let app = router(state(), false);

        let response = app
            .clone()
            .oneshot(post_json("/api/chat", json!({ "messages": [] })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["category"], "validation");

        let response = app
            .clone()
            .oneshot(post_json("/api/search", json!({ "query": "soil" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let response = app
            .clone()
            .oneshot(post_json("/api/scrape", json!({ "url": "ftp://example.org" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/documents/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_malformed_requests_use_error_body() {
        let app = router(state(), false);

        let response = app
            .clone()
            .oneshot(post_json("/api/documents", json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = json_body(response).await;
        assert_eq!(body["category"], "validation");
        assert!(body["error"].as_str().unwrap().contains("prompt"));
        assert!(body["suggestion"].is_string());

        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/chat")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from("{not json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["category"], "validation");

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/documents/not-a-uuid")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(json_body(response).await["category"], "validation");
    }

    #[tokio::test]
    async fn test_summarize_endpoint() {
        let response = router(state(), false)
            .oneshot(post_json(
                "/api/summarize",
                json!({
                    "topic": "Soil erosion",
                    "source": {
                        "id": 3,
                        "title": "Erosion",
                        "url": "https://example.org/erosion",
                        "site_name": null,
                        "content": "Topsoil is lost to wind and water.",
                        "fetched_at": "2026-10-18T12:00:00Z"
                    }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = json_body(response).await;
        assert_eq!(body["source_id"], 3);
        assert_eq!(body["key_points"], json!(["wind", "water"]));
    }

    #[tokio::test]
    async fn test_failed_job_is_reported_and_not_exportable() {
        let state = state();
        let app = router(state.clone(), false);

        let response = app
            .clone()
            .oneshot(post_json("/api/documents", json!({ "prompt": "write about erosion" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let id: Uuid = serde_json::from_value(json_body(response).await["id"].clone()).unwrap();

        // 搜尋必定失敗，等候背景工作結束
        let mut record = state.jobs.get(id).await.unwrap();
        for _ in 0..100 {
            if record.error.is_some() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            record = state.jobs.get(id).await.unwrap();
        }
        assert!(record.error.unwrap().contains("web_search"));
        assert!(record
            .events
            .iter()
            .any(|e| e.status == ProgressStatus::Failed));

        let response = app
            .oneshot(
                Request::builder()
                    .uri(format!("/api/documents/{}/export?format=zip", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
