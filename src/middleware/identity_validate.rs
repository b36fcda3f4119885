use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::{validate_internal_token, Principal};
use crate::config::TrustConfig;
use crate::error::ApiError;

use super::headers::{strip_spoofable_headers, INTERNAL_IDENTITY_HEADER};

/// Paths served unauthenticated regardless of enforcement
fn is_health_path(path: &str) -> bool {
    path == "/health" || path.starts_with("/health/")
}

/// Internal-service middleware: converts the internal identity token into a
/// verified principal, or rejects the request under enforcement.
///
/// The spoofable header set is stripped before anything downstream runs, so a
/// caller bypassing the edge cannot assert tenant or identity. With
/// enforcement disabled, bad or missing tokens degrade to an unauthenticated
/// request (staged rollout).
pub async fn identity_validate_middleware(
    State(trust): State<Arc<TrustConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    // Capture the token before the strip; nothing after this point can read
    // caller-supplied trust headers
    let token = request
        .headers()
        .get(INTERNAL_IDENTITY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned);
    strip_spoofable_headers(request.headers_mut());

    if is_health_path(request.uri().path()) {
        return Ok(next.run(request).await);
    }

    match token {
        Some(token) => match validate_internal_token(&token, &trust) {
            Ok(principal) => {
                // Adopt as the effective identity unless one is already set
                if request.extensions().get::<Principal>().is_none() {
                    request.extensions_mut().insert(principal);
                }
                Ok(next.run(request).await)
            }
            Err(e) => {
                if trust.enforce {
                    tracing::warn!("Rejecting request with invalid internal identity: {}", e);
                    Err(ApiError::unauthorized("Invalid internal identity token"))
                } else {
                    tracing::debug!(
                        "Invalid internal identity, continuing unauthenticated: {}",
                        e
                    );
                    Ok(next.run(request).await)
                }
            }
        },
        None => {
            if trust.enforce {
                Err(ApiError::unauthorized("Missing internal identity token"))
            } else {
                Ok(next.run(request).await)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::mint_internal_token;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware::from_fn_with_state,
        routing::get,
        Json, Router,
    };
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn trust(enforce: bool) -> Arc<TrustConfig> {
        Arc::new(TrustConfig {
            signing_key: Some("test-signing-key-0123456789abcdef".to_string()),
            issuer: "teck-edge".to_string(),
            audience: "teck-web-bff-internal".to_string(),
            token_lifetime_secs: 120,
            mint_skew_secs: 5,
            validation_leeway_secs: 15,
            enforce,
        })
    }

    async fn whoami(
        principal: Option<axum::Extension<Principal>>,
        headers: axum::http::HeaderMap,
    ) -> Json<Value> {
        Json(json!({
            "subject": principal.as_ref().and_then(|p| p.subject().map(str::to_owned)),
            "x-tenantid": headers.get("x-tenantid").and_then(|v| v.to_str().ok()),
        }))
    }

    fn app(trust: Arc<TrustConfig>) -> Router {
        Router::new()
            .route("/", get(whoami))
            .route("/health", get(|| async { "ok" }))
            .layer(from_fn_with_state(trust, identity_validate_middleware))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn valid_token_yields_verified_principal() {
        let trust = trust(true);
        let principal = Principal::new(vec![("sub".to_string(), json!("u1"))]);
        let token = mint_internal_token(&principal, &trust).unwrap();

        let request = HttpRequest::builder()
            .uri("/")
            .header(INTERNAL_IDENTITY_HEADER, token)
            .body(Body::empty())
            .unwrap();
        let response = app(trust).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["subject"], json!("u1"));
    }

    #[tokio::test]
    async fn missing_token_rejected_under_enforcement() {
        let request = HttpRequest::builder().uri("/").body(Body::empty()).unwrap();
        let response = app(trust(true)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn forged_token_rejected_under_enforcement() {
        let request = HttpRequest::builder()
            .uri("/")
            .header(INTERNAL_IDENTITY_HEADER, "not-a-real-token")
            .body(Body::empty())
            .unwrap();
        let response = app(trust(true)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn enforcement_off_continues_unauthenticated() {
        let request = HttpRequest::builder()
            .uri("/")
            .header(INTERNAL_IDENTITY_HEADER, "not-a-real-token")
            .body(Body::empty())
            .unwrap();
        let response = app(trust(false)).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["subject"], Value::Null);
    }

    #[tokio::test]
    async fn health_path_always_allowed() {
        let request = HttpRequest::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let response = app(trust(true)).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn spoofed_tenant_header_stripped_even_without_enforcement() {
        let request = HttpRequest::builder()
            .uri("/")
            .header("x-tenantid", "evil-tenant")
            .body(Body::empty())
            .unwrap();
        let response = app(trust(false)).oneshot(request).await.unwrap();

        let body = body_json(response).await;
        assert_eq!(body["x-tenantid"], Value::Null);
    }
}
