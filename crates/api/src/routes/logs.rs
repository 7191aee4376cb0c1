//! Log Routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use storage::{Analysis, LogStore};

use crate::{ApiError, SharedState};

/// Body of an analyze request
#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    /// Log file name inside the log directory
    pub path: String,
}

/// Stored logs
#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub data: Vec<String>,
    pub count: usize,
}

/// List stored logs
pub async fn list(State(state): State<SharedState>) -> Result<Json<LogsResponse>, ApiError> {
    let store = state.read().await.store.clone();
    let logs = tokio::task::spawn_blocking(move || store.list())
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    let data: Vec<String> = logs
        .iter()
        .filter_map(|p| p.file_name()?.to_str().map(String::from))
        .collect();
    Ok(Json(LogsResponse {
        count: data.len(),
        data,
    }))
}

/// Recompute statistics from a stored log
pub async fn analyze(
    State(state): State<SharedState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<Json<Analysis>, ApiError> {
    let name = Path::new(&request.path);
    let mut components = name.components();
    if !matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) {
        return Err(ApiError::BadRequest(format!(
            "{:?} is not a file name in the log directory",
            request.path
        )));
    }

    let path = state.read().await.store.resolve(name);
    let analysis = tokio::task::spawn_blocking(move || LogStore::analyze(path))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;
    Ok(Json(analysis))
}

#[cfg(test)]
mod tests {
    use crate::create_router;
    use crate::testing::{body_json, state};
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use storage::LogFormat;
    use tempfile::TempDir;
    use tower::ServiceExt;

    async fn analyze(app: &Router, path: &str) -> axum::response::Response {
        app.clone()
            .oneshot(
                Request::post("/api/v1/logs/analyze")
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(serde_json::json!({ "path": path }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_analyze_and_list() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("old.csv"),
            "timestamp,RPM\n2023-11-05T10:00:00,800\n2023-11-05T10:00:01,820\nbroken\n",
        )
        .unwrap();
        let app = create_router(state(&dir, LogFormat::Csv));

        let response = analyze(&app, "old.csv").await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["entries"], 2);
        assert_eq!(json["skipped"], 1);
        assert_eq!(json["stats"]["RPM"]["average"], 810.0);
        assert_eq!(json["malformed"][0]["line"], 4);

        let listing = body_json(
            app.clone()
                .oneshot(Request::get("/api/v1/logs").body(Body::empty()).unwrap())
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(listing["data"], serde_json::json!(["old.csv"]));
    }

    #[tokio::test]
    async fn test_analyze_errors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.txt"), "hi").unwrap();
        let app = create_router(state(&dir, LogFormat::Csv));

        assert_eq!(analyze(&app, "missing.csv").await.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            analyze(&app, "notes.txt").await.status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(analyze(&app, "../etc/passwd.csv").await.status(), StatusCode::BAD_REQUEST);
        assert_eq!(analyze(&app, "/tmp/x.csv").await.status(), StatusCode::BAD_REQUEST);
    }
}
