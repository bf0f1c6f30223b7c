#![allow(dead_code)]

use axum::body::{to_bytes, Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::Router;
use harvester_common::handshake::RsaPrivateKey;
use harvester_server::app;
use harvester_server::config::ServerConfig;
use harvester_server::state::AppState;
use harvester_storage::{MemStorage, SqlStorageEngine, StorageEngine};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub struct TestContext {
    pub temp_dir: TempDir,
    pub state: AppState,
    pub app: Router,
}

#[derive(Default)]
pub struct Options {
    pub sql: bool,
    pub key: Option<String>,
    pub private_key: Option<RsaPrivateKey>,
}

pub async fn build_test_context() -> TestContext {
    build_with(Options::default()).await
}

pub async fn build_with(options: Options) -> TestContext {
    let temp_dir = tempfile::tempdir().expect("temp dir");
    let storage: Arc<dyn StorageEngine> = if options.sql {
        let dsn = format!(
            "sqlite://{}?mode=rwc",
            temp_dir.path().join("metrics.db").display()
        );
        Arc::new(
            SqlStorageEngine::connect(&dsn, Duration::from_secs(10))
                .await
                .expect("sqlite engine"),
        )
    } else {
        Arc::new(MemStorage::new())
    };

    let config = ServerConfig {
        file_storage_path: temp_dir.path().join("metrics.json"),
        key: options.key,
        ..ServerConfig::default()
    };
    let state = AppState::new(storage, config, options.private_key);
    let app = app::build_http_app(state.clone());
    TestContext {
        temp_dir,
        state,
        app,
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl TestResponse {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

pub async fn send(app: &Router, req: Request<Body>) -> TestResponse {
    let resp = app
        .clone()
        .oneshot(req)
        .await
        .expect("request should complete");
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = to_bytes(resp.into_body(), usize::MAX)
        .await
        .expect("response body");
    TestResponse {
        status,
        headers,
        body,
    }
}

pub async fn get(app: &Router, uri: &str) -> TestResponse {
    let req = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request should build");
    send(app, req).await
}

pub async fn post(
    app: &Router,
    uri: &str,
    headers: &[(&str, &str)],
    body: impl Into<Body>,
) -> TestResponse {
    let mut builder = Request::builder().method("POST").uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    let req = builder.body(body.into()).expect("request should build");
    send(app, req).await
}

pub async fn post_json(app: &Router, uri: &str, body: serde_json::Value) -> TestResponse {
    post(
        app,
        uri,
        &[("Content-Type", "application/json")],
        body.to_string(),
    )
    .await
}
