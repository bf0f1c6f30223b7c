//! Transport stages around the handlers.
//!
//! [`verify_and_sign`] runs outside response compression: it checks the
//! `HashSHA256` header against the raw request body and signs the final
//! (possibly gzipped) response body. [`decode_body`] runs inside it and
//! undoes gzip and AES-GCM on the request body before the handlers see it.

use crate::api::ApiError;
use crate::state::AppState;
use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use harvester_common::codec::{Codec, SigningKey, SIGNATURE_HEADER};
use harvester_common::handshake::KEY_ENDPOINT;

/// Largest request body accepted.
pub const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

static SIGNATURE: HeaderName = HeaderName::from_static("hashsha256");

async fn read_body(body: Body) -> Result<axum::body::Bytes, ApiError> {
    to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::BadRequest(format!("unreadable body: {e}")))
}

/// Verifies signed requests and signs every response when a signing key is
/// configured. Unsigned requests pass through.
pub async fn verify_and_sign(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let Some(signer) = state.signer.clone() else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let response = match read_body(body).await {
        Ok(bytes) => {
            let verified = match parts.headers.get(SIGNATURE_HEADER) {
                Some(value) => value
                    .to_str()
                    .map_err(|_| ApiError::BadRequest("malformed signature header".to_string()))
                    .and_then(|sig| signer.verify(&bytes, sig).map_err(ApiError::from)),
                None => Ok(()),
            };
            match verified {
                Ok(()) => next.run(Request::from_parts(parts, Body::from(bytes))).await,
                Err(e) => {
                    tracing::warn!(path = %parts.uri.path(), "Rejected request with bad signature");
                    e.into_response()
                }
            }
        }
        Err(e) => e.into_response(),
    };
    sign_response(&signer, response).await
}

async fn sign_response(signer: &SigningKey, response: Response) -> Response {
    let (mut parts, body) = response.into_parts();
    let bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(error = %e, "Failed to buffer response for signing");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    match signer.sign(&bytes) {
        Ok(signature) => {
            if let Ok(value) = HeaderValue::from_str(&signature) {
                parts.headers.insert(SIGNATURE.clone(), value);
            }
        }
        Err(e) => tracing::error!(error = %e, "Failed to sign response"),
    }
    Response::from_parts(parts, Body::from(bytes))
}

/// Gunzips (`Content-Encoding: gzip`) and decrypts (once a symmetric key is
/// established) request bodies. The key exchange body is never decrypted
/// and empty bodies are left alone.
pub async fn decode_body(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let gzipped = req
        .headers()
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("gzip"));
    let cipher = if req.uri().path() == KEY_ENDPOINT {
        None
    } else {
        state.symmetric_key.get().cloned()
    };
    if !gzipped && cipher.is_none() {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let bytes = match read_body(body).await {
        Ok(bytes) => bytes,
        Err(e) => return e.into_response(),
    };
    let plain = match Codec::new(cipher, None).unwrap_body(&bytes, None, gzipped) {
        Ok(plain) => plain,
        Err(e) => {
            tracing::warn!(path = %parts.uri.path(), error = %e, "Failed to decode request body");
            return ApiError::from(e).into_response();
        }
    };
    parts.headers.remove(header::CONTENT_ENCODING);
    parts.headers.remove(header::CONTENT_LENGTH);
    next.run(Request::from_parts(parts, Body::from(plain))).await
}
