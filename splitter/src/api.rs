use crate::ServeError;
use crate::config::Listener as ListenerConfig;
use crate::errors::{ErrorCategory, SplitterError};
use crate::processor::{ProjectSelection, Processor, RunSummary};
use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::Method,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::net::TcpListener;

pub fn router(processor: Arc<Processor>) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/run", get(run).post(run))
        .with_state(processor)
}

pub async fn serve(listener: &ListenerConfig, processor: Arc<Processor>) -> Result<(), ServeError> {
    let addr = format!("{}:{}", listener.host, listener.port);

    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "serving api");
    axum::serve(listener, router(processor)).await?;
    Ok(())
}

#[derive(Deserialize, Debug)]
struct RunRequest {
    #[serde(default)]
    value: Option<ProjectValue>,
}

#[derive(Deserialize, Debug)]
#[serde(untagged)]
enum ProjectValue {
    One(String),
    Many(Vec<String>),
}

#[derive(Serialize)]
struct ApiErrorResponse {
    error: String,
    category: ErrorCategory,
}

async fn status() -> Json<Value> {
    Json(json!({
        "message": "Sheets splitter is running",
        "version": env!("CARGO_PKG_VERSION"),
        "usage": {
            "GET": "/run processes the configured default projects",
            "POST": "/run with JSON {\"value\": \"ProjectName\"} or {\"value\": [\"ProjectA\", \"ProjectB\"]}",
        },
    }))
}

async fn run(
    State(processor): State<Arc<Processor>>,
    method: Method,
    body: Bytes,
) -> Result<Json<RunSummary>, SplitterError> {
    let selection = if method == Method::POST {
        parse_selection(&body)?
    } else {
        ProjectSelection::Default
    };

    tracing::debug!(?selection, "run requested");
    let summary = processor.run(selection).await?;
    Ok(Json(summary))
}

/// An empty body, a missing `value` or a null `value` all mean "use the default".
fn parse_selection(body: &[u8]) -> Result<ProjectSelection, SplitterError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ProjectSelection::Default);
    }

    let request: RunRequest = serde_json::from_slice(body)
        .map_err(|e| SplitterError::InvalidRequest(format!("malformed JSON body: {e}")))?;

    Ok(match request.value {
        None => ProjectSelection::Default,
        Some(ProjectValue::One(project)) => ProjectSelection::One(project),
        Some(ProjectValue::Many(projects)) => ProjectSelection::Many(projects),
    })
}

impl IntoResponse for SplitterError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(ApiErrorResponse {
            error: self.to_string(),
            category: self.category(),
        });

        (status, body).into_response()
    }
}
