use std::net::SocketAddr;
use std::path::Path as FsPath;

use anyhow::Result;
use askama::Template;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::models::{
    InteractionRequest, InteractionSnapshot, ResultSnapshot, SearchRequest, SessionRequest,
    SessionResponse, SidebarEntry,
};
use crate::search::{SearchReply, SearchService};

#[derive(Clone)]
struct AppState {
    search: SearchService,
}

pub fn build_router(search: SearchService, static_dir: impl AsRef<FsPath>) -> Router {
    let state = AppState { search };

    Router::new()
        .route("/", get(index_page))
        .route("/session/:session_id", get(result_page))
        .route("/api/session", post(create_session))
        .route("/api/search", post(search_handler))
        .route("/api/session/:session_id", get(get_result))
        .route("/api/session/:session_id/events", post(interaction_handler))
        .nest_service("/static", ServeDir::new(static_dir.as_ref()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(config: AppConfig, search: SearchService) -> Result<()> {
    let app = build_router(search, &config.static_dir);

    let addr: SocketAddr = config.bind_addr.parse()?;
    tracing::info!("listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn index_page(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let session_id = state.search.create_session()?;

    let template = IndexTemplate { session_id };
    let body = template.render()?;

    Ok(Html(body))
}

async fn result_page(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let snapshot = state
        .search
        .snapshot(&session_id)?
        .ok_or_else(|| ApiError::not_found(format!("no result for session: {}", session_id)))?;

    let template = ResultTemplate {
        session_id,
        query: snapshot.query,
        answer_html: snapshot.rendered.answer_html,
        sidebar_html: snapshot.rendered.sidebar_html,
        sidebar: snapshot.rendered.sidebar,
        last_error: snapshot.last_error,
    };
    let body = template.render()?;

    Ok(Html(body))
}

async fn create_session(
    State(state): State<AppState>,
    Json(request): Json<SessionRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    if request.reset.unwrap_or(false) {
        if let Some(session_id) = request.session_id {
            if state.search.reset_session(&session_id)? {
                return Ok(Json(SessionResponse { session_id }));
            }
        }
    }

    let session_id = state.search.create_session()?;
    Ok(Json(SessionResponse { session_id }))
}

async fn search_handler(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<ResultSnapshot>, ApiError> {
    if request.query.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty".to_string()));
    }
    if request.query.store_names.is_empty() {
        return Err(ApiError::bad_request(
            "at least one file search store is required".to_string(),
        ));
    }

    match state
        .search
        .search(&request.session_id, &request.query)
        .await?
    {
        SearchReply::Displayed(snapshot) => Ok(Json(snapshot)),
        SearchReply::Superseded => Err(ApiError::conflict(
            "a newer search replaced this one".to_string(),
        )),
        SearchReply::Failed(message) => Err(ApiError::bad_gateway(message)),
        SearchReply::UnknownSession => Err(ApiError::not_found(format!(
            "unknown session: {}",
            request.session_id
        ))),
    }
}

async fn get_result(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ResultSnapshot>, ApiError> {
    match state.search.snapshot(&session_id)? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(ApiError::not_found(format!(
            "no result for session: {}",
            session_id
        ))),
    }
}

async fn interaction_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<InteractionRequest>,
) -> Result<Json<InteractionSnapshot>, ApiError> {
    match state.search.interact(&session_id, request.event)? {
        Some(snapshot) => Ok(Json(snapshot)),
        None => Err(ApiError::not_found(format!(
            "no result for session: {}",
            session_id
        ))),
    }
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate {
    session_id: String,
}

#[derive(Template)]
#[template(path = "result.html")]
struct ResultTemplate {
    session_id: String,
    query: String,
    answer_html: String,
    sidebar_html: String,
    sidebar: Vec<SidebarEntry>,
    last_error: Option<String>,
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(message: String) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message,
        }
    }

    fn bad_request(message: String) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message,
        }
    }

    fn conflict(message: String) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message,
        }
    }

    fn bad_gateway(message: String) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message,
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(value: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl From<askama::Error> for ApiError {
    fn from(value: askama::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: value.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}
