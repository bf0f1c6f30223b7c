use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use harvester_common::error::{CodecError, MetricError};
use harvester_common::handshake::open_symmetric_key;
use harvester_common::metric::MetricRequest;
use harvester_common::{Metric, MetricKind};
use harvester_storage::error::StorageError;
use std::fmt::Write;

/// Errors surfaced by the HTTP handlers and the transport middleware.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("metric '{0}' not found")]
    NotFound(String),

    #[error("symmetric key already established")]
    KeyConflict,

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("{0}")]
    Unavailable(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Metric(_) | ApiError::Codec(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::KeyConflict => StatusCode::CONFLICT,
            ApiError::Storage(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            ApiError::Storage(e) if e.is_rejected_metric() => StatusCode::BAD_REQUEST,
            ApiError::Storage(_) | ApiError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(error = %self, status = status.as_u16(), "Request rejected");
        }
        (status, text_plain(), self.to_string()).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

fn text_plain() -> [(header::HeaderName, &'static str); 1] {
    [(header::CONTENT_TYPE, "text/plain; charset=utf-8")]
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("malformed JSON: {e}")))
}

/// Looks up `id` and checks that it holds a metric of `kind`.
async fn lookup(state: &AppState, kind: MetricKind, id: &str) -> ApiResult<Metric> {
    let metric = state.storage.get_metric(id).await?;
    if metric.kind() != kind {
        return Err(ApiError::NotFound(id.to_string()));
    }
    Ok(metric)
}

/// `POST /update/{kind}/{name}/{value}`
pub async fn update_from_path(
    State(state): State<AppState>,
    Path((kind, name, value)): Path<(String, String, String)>,
) -> ApiResult<impl IntoResponse> {
    let kind: MetricKind = kind.parse()?;
    let value = kind.parse_value(&value)?;
    state.storage.put_metric(Metric::new(name, value)).await?;
    Ok((text_plain(), ""))
}

/// `POST /update/`: returns the metric as stored after the merge.
pub async fn update_from_json(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Metric>> {
    let metric: Metric = parse_json(&body)?;
    let stored = state.storage.put_metric(metric).await?;
    Ok(Json(stored))
}

/// `POST /updates/`: all-or-nothing.
pub async fn update_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let metrics: Vec<Metric> = parse_json(&body)?;
    state.storage.put_batch(&metrics).await?;
    tracing::debug!(count = metrics.len(), "Batch stored");
    Ok((text_plain(), ""))
}

/// `POST /value/`
pub async fn value_from_json(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Metric>> {
    let request: MetricRequest = parse_json(&body)?;
    let kind = request.kind()?;
    Ok(Json(lookup(&state, kind, &request.id).await?))
}

/// `GET /value/{kind}/{name}`
pub async fn value_from_path(
    State(state): State<AppState>,
    Path((kind, name)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let kind: MetricKind = kind.parse()?;
    let metric = lookup(&state, kind, &name).await?;
    Ok((text_plain(), metric.render()))
}

/// `GET /`
pub async fn list_metrics(State(state): State<AppState>) -> ApiResult<Html<String>> {
    let metrics = state.storage.get_all_metrics().await?;
    Ok(Html(render_listing(&metrics)))
}

/// `GET /ping`
pub async fn ping(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    if !state.storage.supports_ping() {
        return Err(ApiError::Unavailable("the database is not in use".to_string()));
    }
    state.storage.ping().await?;
    Ok((text_plain(), "OK"))
}

/// `POST /key/`: body is the RSA-OAEP ciphertext of the symmetric key.
pub async fn receive_key(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<impl IntoResponse> {
    let Some(private_key) = &state.private_key else {
        return Err(ApiError::BadRequest(
            "encryption is not configured on this server".to_string(),
        ));
    };
    if state.symmetric_key.get().is_some() {
        return Err(ApiError::KeyConflict);
    }
    let key = open_symmetric_key(private_key, &body)?;
    state
        .symmetric_key
        .set(key)
        .map_err(|_| ApiError::KeyConflict)?;
    tracing::info!("Symmetric key established");
    Ok((text_plain(), ""))
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>Metrics</title>
    <style>
        body {
            background-color: #000000;
            color: #ffffff;
        }
    </style>
</head>
<body>
    <ul>
"#;

const PAGE_TAIL: &str = "    </ul>
</body>
</html>
";

/// One `<li>name: value</li>` per metric, in the given order.
pub fn render_listing(metrics: &[Metric]) -> String {
    let mut page = String::from(PAGE_HEAD);
    for metric in metrics {
        let _ = writeln!(
            page,
            "        <li>{}: {}</li>",
            escape_html(&metric.id),
            metric.render()
        );
    }
    page.push_str(PAGE_TAIL);
    page
}
