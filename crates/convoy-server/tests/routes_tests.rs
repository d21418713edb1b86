//! HTTP-level tests for the conversion trigger and callback routes

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use axum::{
    body::Body,
    extract::connect_info::MockConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{Harness, JOB_ID, LOCAL_ORIGIN, PUBLIC_ORIGIN};
use convoy_server::config::DEFAULT_CALLBACK_PATH;
use convoy_server::conversion::Credential;
use convoy_server::features::{self, callback::MarkupStripper, FeatureState};
use convoy_server::remote::HttpFetcher;

fn app(harness: &Harness, origin: IpAddr) -> Router {
    let fetcher = Arc::new(HttpFetcher::new("http", Duration::from_secs(5)).unwrap());
    let state = FeatureState {
        dispatcher: harness.dispatcher.clone(),
        resolver: Arc::new(harness.resolver(fetcher)),
        store: harness.store.clone(),
        stripper: MarkupStripper::new().unwrap(),
    };
    features::router(state, DEFAULT_CALLBACK_PATH)
        .layer(MockConnectInfo(SocketAddr::new(origin, 40000)))
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn trigger(body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/api/v1/conversions")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn callback(query: &str) -> Request<Body> {
    Request::builder()
        .uri(format!("{}{}", DEFAULT_CALLBACK_PATH, query))
        .body(Body::empty())
        .unwrap()
}

fn report_command() -> Value {
    json!({"owner": "docs", "filename": "report.docx", "format_out": "pdf"})
}

#[tokio::test]
async fn test_trigger_async_conversion_is_accepted() {
    let harness = Harness::builder().build();
    harness.source("docs", "report.docx", b"source bytes").await;

    let (status, body) = send(app(&harness, PUBLIC_ORIGIN), trigger(report_command())).await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["data"], json!({"status": "pending", "job_id": JOB_ID}));
}

#[tokio::test]
async fn test_trigger_from_loopback_completes_inline() {
    let harness = Harness::builder().build();
    harness.source("docs", "report.docx", b"source bytes").await;

    let (status, body) = send(app(&harness, LOCAL_ORIGIN), trigger(report_command())).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("completed"));
    assert_eq!(body["data"]["artifact"]["filename"], json!("report.pdf"));
}

#[tokio::test]
async fn test_trigger_returns_cached_output() {
    let harness = Harness::builder().default_async(false).build();
    harness.source("docs", "report.docx", b"source bytes").await;

    let (first, _) = send(app(&harness, PUBLIC_ORIGIN), trigger(report_command())).await;
    assert_eq!(first, StatusCode::OK);

    let (status, body) = send(app(&harness, PUBLIC_ORIGIN), trigger(report_command())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("cached"));
}

#[tokio::test]
async fn test_trigger_validation_error() {
    let harness = Harness::builder().build();

    let (status, body) = send(
        app(&harness, PUBLIC_ORIGIN),
        trigger(json!({"owner": "docs", "filename": "report.docx"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_trigger_unknown_owner() {
    let harness = Harness::builder().build();

    let (status, body) = send(
        app(&harness, PUBLIC_ORIGIN),
        trigger(json!({"owner": "ghost", "filename": "report.docx", "format_out": "pdf"})),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("NOT_FOUND"));
}

#[tokio::test]
async fn test_trigger_without_credential() {
    let harness = Harness::builder().credential(Credential::None).build();
    harness.source("docs", "report.docx", b"source bytes").await;

    let (status, body) = send(app(&harness, PUBLIC_ORIGIN), trigger(report_command())).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], json!("NOT_CONFIGURED"));
}

#[tokio::test]
async fn test_trigger_remote_failure() {
    let harness = Harness::builder().strategy("blocking").fail_wait().build();
    harness.source("docs", "report.docx", b"source bytes").await;

    let (status, body) = send(app(&harness, PUBLIC_ORIGIN), trigger(report_command())).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], json!("REMOTE_ERROR"));
}

#[tokio::test]
async fn test_trigger_bare_path_reports_existence() {
    let harness = Harness::builder().build();
    let existing = harness.source("docs", "legacy.pdf", b"old output").await;

    let (status, body) = send(
        app(&harness, PUBLIC_ORIGIN),
        trigger(json!({"path": "/var/spool/in.docx", "output_path": existing.path})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], json!("untracked"));
    assert_eq!(body["data"]["exists"], json!(true));
}

#[tokio::test]
async fn test_callback_missing_params() {
    let harness = Harness::builder().build();

    let (status, body) = send(app(&harness, PUBLIC_ORIGIN), callback("")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({}));

    let (status, _) = send(app(&harness, PUBLIC_ORIGIN), callback("?id=job-1")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let (status, _) = send(
        app(&harness, PUBLIC_ORIGIN),
        callback("?id=%3Cb%3E%3C%2Fb%3E&url=x"),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn test_callback_unknown_job() {
    let harness = Harness::builder().build();

    let (status, body) = send(
        app(&harness, PUBLIC_ORIGIN),
        callback("?id=nope&url=%2F%2Fremote.test%2Fprocess%2Fnope"),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body, json!({}));
}

#[tokio::test]
async fn test_callback_completes_pending_job() {
    let harness = Harness::builder().build();
    harness.source("docs", "report.docx", b"source bytes").await;
    let (status, _) = send(app(&harness, PUBLIC_ORIGIN), trigger(report_command())).await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/process/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "step": "finished",
            "output": {"url": format!("//{}/download/job-1", server.address())},
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/job-1"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.7 callback".to_vec()))
        .mount(&server)
        .await;

    // Markup around the id is stripped before lookup
    let status_url = format!("//{}/process/job-1", server.address());
    let query = format!(
        "?id={}&url={}",
        urlencoding::encode("<b>job-1</b>"),
        urlencoding::encode(&status_url)
    );
    let (status, body) = send(app(&harness, PUBLIC_ORIGIN), callback(&query)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({}));
    assert_eq!(
        std::fs::read(harness.owner_root("docs").join("report.pdf")).unwrap(),
        b"%PDF-1.7 callback"
    );
}

#[tokio::test]
async fn test_trigger_bare_path_outside_store_is_rejected() {
    let harness = Harness::builder().build();

    let (status, body) = send(
        app(&harness, PUBLIC_ORIGIN),
        trigger(json!({"path": "/var/spool/in.docx", "output_path": "/etc/shadow"})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    assert!(body.get("data").map_or(true, Value::is_null));
}

#[tokio::test]
async fn test_trigger_output_outside_owner_directory_is_rejected() {
    let harness = Harness::builder().build();
    harness.source("docs", "report.docx", b"source bytes").await;
    let outside = tempfile::TempDir::new().unwrap();

    let mut command = report_command();
    command["output_path"] = json!(outside.path().join("report.pdf"));
    let (status, body) = send(app(&harness, PUBLIC_ORIGIN), trigger(command)).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));
    assert!(harness.client_calls().is_empty());
    assert!(std::fs::read_dir(outside.path()).unwrap().next().is_none());
}
