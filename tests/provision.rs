use axum::{http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use zonebot::{BrowserbaseProvisioner, ProvisionError};

async fn broker(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}/v1/sessions")
}

#[tokio::test]
async fn creates_proxied_session() {
    let router = Router::new().route(
        "/v1/sessions",
        post(|headers: HeaderMap, Json(body): Json<Value>| async move {
            let authorized = headers.get("x-bb-api-key").map(|v| v == "bb-key").unwrap_or(false);
            if !authorized || body != json!({"projectId": "proj-1", "proxies": true}) {
                return (StatusCode::BAD_REQUEST, Json(json!({"error": "unexpected request"})));
            }
            (
                StatusCode::CREATED,
                Json(json!({"id": "sess-9", "connectUrl": "wss://connect.example/sess-9", "status": "RUNNING"})),
            )
        }),
    );
    let url = broker(router).await;

    let provisioner = BrowserbaseProvisioner::new(url, "bb-key", "proj-1").unwrap();
    let session = provisioner.create_session().await.unwrap();
    assert_eq!(session.id, "sess-9");
    assert_eq!(session.connect_url, "wss://connect.example/sess-9");
    assert!(session.proxies);
}

#[tokio::test]
async fn rejection_carries_status_and_body() {
    let router = Router::new().route(
        "/v1/sessions",
        post(|| async { (StatusCode::TOO_MANY_REQUESTS, "concurrency limit reached") }),
    );
    let url = broker(router).await;

    let provisioner = BrowserbaseProvisioner::new(url, "bb-key", "proj-1").unwrap();
    let err = provisioner.create_session().await.unwrap_err();
    assert_eq!(err.status(), Some(429));
    match err {
        ProvisionError::Rejected { body, .. } => assert_eq!(body, "concurrency limit reached"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn body_without_connect_url_is_malformed() {
    let router = Router::new().route("/v1/sessions", post(|| async { Json(json!({"id": "x"})) }));
    let url = broker(router).await;

    let provisioner = BrowserbaseProvisioner::new(url, "bb-key", "proj-1").unwrap();
    let err = provisioner.create_session().await.unwrap_err();
    assert!(matches!(err, ProvisionError::MalformedBody { status: 200, .. }));
}

#[tokio::test]
async fn unreachable_broker_is_a_network_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let provisioner =
        BrowserbaseProvisioner::new(format!("http://{addr}/v1/sessions"), "bb-key", "proj-1").unwrap();
    let err = provisioner.create_session().await.unwrap_err();
    assert!(matches!(err, ProvisionError::Network(_)));
    assert_eq!(err.status(), None);
}
