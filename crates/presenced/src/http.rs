//! Status endpoint and static page

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use presence_core::{StatusReader, TrackedStatus};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    status: StatusReader,
}

/// Body of `GET /status`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: TrackedStatus,
}

/// `GET /status` plus every file under `static_dir`
pub fn router(status: StatusReader, static_dir: impl AsRef<Path>) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .fallback_service(ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { status })
}

async fn get_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.status.read().await,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use presence_core::StatusStore;
    use tower::ServiceExt;

    const PUBLIC_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../../public");

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn status_is_offline_before_any_observation() {
        let store = StatusStore::new();
        let (code, body) = get(router(store.reader(), PUBLIC_DIR), "/status").await;

        assert_eq!(code, StatusCode::OK);
        assert_eq!(body, r#"{"status":"offline"}"#);
    }

    #[tokio::test]
    async fn status_follows_the_store() {
        let store = StatusStore::new();
        let app = router(store.reader(), PUBLIC_DIR);

        store.write(TrackedStatus::Online, None).await;
        let (_, body) = get(app.clone(), "/status").await;
        let parsed: StatusResponse = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed.status, TrackedStatus::Online);

        store.write(TrackedStatus::Offline, None).await;
        let (_, body) = get(app, "/status").await;
        assert_eq!(body, r#"{"status":"offline"}"#);
    }

    #[tokio::test]
    async fn static_page_is_served_at_root() {
        let store = StatusStore::new();
        let (code, body) = get(router(store.reader(), PUBLIC_DIR), "/").await;

        assert_eq!(code, StatusCode::OK);
        assert!(body.contains("script.js"));
    }

    #[tokio::test]
    async fn unknown_paths_are_not_found() {
        let store = StatusStore::new();
        let (code, _) = get(router(store.reader(), PUBLIC_DIR), "/missing.txt").await;

        assert_eq!(code, StatusCode::NOT_FOUND);
    }
}
