use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};

use crate::auth::{mint_internal_token, Principal};
use crate::config::TrustConfig;

use super::headers::{strip_spoofable_headers, INTERNAL_IDENTITY_HEADER};

/// Edge-boundary middleware: removes any trust-bearing headers the caller
/// sent and, when the request carries an authenticated principal, attaches a
/// freshly minted internal identity token for downstream services.
///
/// Minting never fails the request. Without a signing key the request is
/// forwarded unauthenticated internally.
pub async fn identity_mint_middleware(
    State(trust): State<Arc<TrustConfig>>,
    mut request: Request,
    next: Next,
) -> Response {
    strip_spoofable_headers(request.headers_mut());

    if let Some(principal) = request.extensions().get::<Principal>().cloned() {
        if trust.signing_key.is_none() {
            tracing::warn!(
                "No internal signing key configured; forwarding request without identity"
            );
        } else if let Some(token) = mint_internal_token(&principal, &trust) {
            if let Ok(value) = HeaderValue::from_str(&token) {
                request.headers_mut().insert(INTERNAL_IDENTITY_HEADER, value);
            }
        }
    }

    next.run(request).await
}
