//! HTTP boundary: `POST /` with `{"apn": "..."}`.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::model::Identifier;
use crate::resolve::Resolver;

#[derive(Debug, Deserialize)]
pub struct LookupRequest {
    pub apn: String,
}

pub fn router(resolver: Arc<Resolver>) -> Router {
    Router::new()
        .route("/", post(lookup))
        .route("/health", get(|| async { "ok" }))
        .with_state(resolver)
}

async fn lookup(State(resolver): State<Arc<Resolver>>, Json(req): Json<LookupRequest>) -> Response {
    let identifier = match Identifier::parse(&req.apn) {
        Ok(id) => id,
        Err(e) => {
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(json!({ "error": e.to_string() })))
                .into_response()
        }
    };

    info!(apn = %identifier, "lookup requested");
    match resolver.resolve(&identifier).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            warn!(apn = %identifier, error = %e, "lookup failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "apn": identifier, "error": e.to_string(), "source": "database" })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedExplainer, CountingFallback, MemoryStore, StaticRetriever};
    use axum::{body::Body, http::Request};
    use serde_json::Value;
    use tower::ServiceExt;

    fn app(store: MemoryStore, fallback: CountingFallback) -> Router {
        router(Arc::new(Resolver::new(
            Arc::new(store),
            Arc::new(StaticRetriever::passages(["passage"])),
            Arc::new(CannedExplainer::new("explained")),
            Arc::new(fallback),
        )))
    }

    async fn post_json(app: Router, body: &str) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::post("/")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn miss_returns_webscraper_envelope() {
        let (status, v) = post_json(
            app(MemoryStore::default(), CountingFallback::succeeding()),
            r#"{"apn": "1234-001-002"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(v["source"], "webscraper");
        assert_eq!(v["zones"], serde_json::json!(["R1"]));
    }

    #[tokio::test]
    async fn blank_apn_is_rejected() {
        let (status, v) = post_json(
            app(MemoryStore::default(), CountingFallback::succeeding()),
            r#"{"apn": "  "}"#,
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(v["error"].as_str().unwrap().contains("non-empty"));
    }

    #[tokio::test]
    async fn store_failure_is_a_tagged_500() {
        let (status, v) = post_json(
            app(MemoryStore::failing(), CountingFallback::succeeding()),
            r#"{"apn": "1234-001-002"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(v["source"], "database");
        assert_eq!(v["apn"], "1234-001-002");
    }
}
