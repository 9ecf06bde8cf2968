use axum::{
    Json,
    body::{Body, to_bytes},
    http::Request,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;

use acp_core::ProtocolError;

use crate::signature::{DEFAULT_TOLERANCE_SECS, SIGNATURE_HEADER, TIMESTAMP_HEADER, verify};

/// Inbound auth settings carried as a request extension. Unset fields turn
/// the corresponding check into a pass-through, so deployments can swap in
/// their own verifier layer.
#[derive(Clone)]
pub struct RequestAuthConfig {
    pub signature_secret: Option<String>,
    pub signature_tolerance_secs: i64,
    pub bearer_token: Option<String>,
}

impl Default for RequestAuthConfig {
    fn default() -> Self {
        Self {
            signature_secret: None,
            signature_tolerance_secs: DEFAULT_TOLERANCE_SECS,
            bearer_token: None,
        }
    }
}

/// Verifies the `Signature`/`Timestamp` headers against the raw body when a
/// secret is configured.
pub async fn verify_signature(req: Request<Body>, next: Next) -> Response {
    let cfg = req
        .extensions()
        .get::<RequestAuthConfig>()
        .cloned()
        .unwrap_or_default();
    let Some(secret) = cfg.signature_secret else {
        return next.run(req).await;
    };

    let (parts, body) = req.into_parts();
    let body_bytes = match to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(_) => {
            return reject(&ProtocolError::Internal(anyhow::anyhow!(
                "failed to buffer request body"
            )));
        }
    };
    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    let timestamp = parts
        .headers
        .get(TIMESTAMP_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(err) = verify(
        &secret,
        signature,
        timestamp,
        &body_bytes,
        cfg.signature_tolerance_secs,
    ) {
        warn!(error = %err, "rejected request signature");
        return reject(&ProtocolError::SignatureInvalid(err.to_string()));
    }

    let req = Request::from_parts(parts, Body::from(body_bytes));
    next.run(req).await
}

/// Bearer credential check on `Authorization` when a token is configured.
pub async fn verify_bearer(req: Request<Body>, next: Next) -> Response {
    let cfg = req
        .extensions()
        .get::<RequestAuthConfig>()
        .cloned()
        .unwrap_or_default();
    if let Some(token) = cfg.bearer_token {
        let ok = req
            .headers()
            .get("authorization")
            .and_then(|h| h.to_str().ok())
            .map(|s| s == format!("Bearer {token}"))
            .unwrap_or(false);
        if !ok {
            return reject(&ProtocolError::Unauthorized);
        }
    }
    next.run(req).await
}

fn reject(err: &ProtocolError) -> Response {
    (err.status(), Json(err.envelope())).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign;
    use axum::{Extension, Router, body::Body, http::StatusCode, middleware, routing::post};
    use http_body_util::BodyExt;
    use time::OffsetDateTime;
    use tower::ServiceExt;

    const SECRET: &str = "acp_test_secret";

    fn signed_app() -> Router {
        Router::new()
            .route("/", post(|| async { StatusCode::OK }))
            .layer(middleware::from_fn(verify_signature))
            .layer(Extension(RequestAuthConfig {
                signature_secret: Some(SECRET.into()),
                ..Default::default()
            }))
    }

    #[tokio::test]
    async fn verify_signature_allows_missing_config() {
        let app = Router::new()
            .route("/", post(|| async { StatusCode::OK }))
            .layer(middleware::from_fn(verify_signature));
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::from("payload"))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn verify_signature_accepts_valid_and_rejects_tampered() {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        let body = br#"{"items":[]}"#;
        let sig = sign(SECRET, now, body);

        let ok_req = Request::builder()
            .method("POST")
            .uri("/")
            .header("signature", &sig)
            .header("timestamp", now.to_string())
            .body(Body::from(&body[..]))
            .unwrap();
        let resp = signed_app().oneshot(ok_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let bad_req = Request::builder()
            .method("POST")
            .uri("/")
            .header("signature", &sig)
            .header("timestamp", now.to_string())
            .body(Body::from("{\"items\":[{}]}"))
            .unwrap();
        let resp = signed_app().oneshot(bad_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let payload: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(payload["error"]["code"], "signature_invalid");
        assert_eq!(payload["error"]["type"], "authentication_error");
    }

    #[tokio::test]
    async fn verify_signature_rejects_stale_timestamp() {
        let stale = OffsetDateTime::now_utc().unix_timestamp() - 600;
        let body = b"payload";
        let sig = sign(SECRET, stale, body);
        let req = Request::builder()
            .method("POST")
            .uri("/")
            .header("signature", &sig)
            .header("timestamp", stale.to_string())
            .body(Body::from(&body[..]))
            .unwrap();
        let resp = signed_app().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn verify_bearer_blocks_invalid_token() {
        let app = Router::new()
            .route("/", post(|| async { StatusCode::OK }))
            .layer(middleware::from_fn(verify_bearer))
            .layer(Extension(RequestAuthConfig {
                bearer_token: Some("expected".into()),
                ..Default::default()
            }));

        let req = Request::builder()
            .method("POST")
            .uri("/")
            .body(Body::empty())
            .unwrap();
        let resp = app.clone().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

        let ok_req = Request::builder()
            .method("POST")
            .uri("/")
            .header("authorization", "Bearer expected")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(ok_req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }
}
