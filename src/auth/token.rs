use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::auth::{Principal, RESERVED_CLAIMS};
use crate::config::TrustConfig;

#[derive(Debug, Error)]
pub enum TokenError {
    #[error("No signing key configured")]
    MissingKey,

    #[error("Invalid internal identity token: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),
}

/// Mint the internal identity token for an authenticated principal.
///
/// Returns None when no signing key is configured or signing fails; minting
/// never fails the request.
pub fn mint_internal_token(principal: &Principal, trust: &TrustConfig) -> Option<String> {
    let key = trust.signing_key.as_deref()?;

    let now = Utc::now();
    let mut claims = claims_to_map(principal.token_claims());
    claims.insert("iss".to_string(), Value::String(trust.issuer.clone()));
    claims.insert("aud".to_string(), Value::String(trust.audience.clone()));
    claims.insert(
        "iat".to_string(),
        Value::Number(now.timestamp().into()),
    );
    // Backdate nbf to tolerate clock skew between edge and internal hosts
    claims.insert(
        "nbf".to_string(),
        Value::Number((now - Duration::seconds(trust.mint_skew_secs as i64)).timestamp().into()),
    );
    claims.insert(
        "exp".to_string(),
        Value::Number(
            (now + Duration::seconds(trust.token_lifetime_secs as i64))
                .timestamp()
                .into(),
        ),
    );

    let header = Header::new(Algorithm::HS256);
    match encode(&header, &claims, &EncodingKey::from_secret(key.as_bytes())) {
        Ok(token) => Some(token),
        Err(e) => {
            tracing::warn!("Failed to sign internal identity token: {}", e);
            None
        }
    }
}

/// Validate an internal identity token and recover the caller's principal.
///
/// Only HMAC-SHA-256 is accepted; issuer and audience must match the
/// configured values. Envelope claims (exp/nbf/iat/aud/iss) are stripped
/// from the returned principal.
pub fn validate_internal_token(token: &str, trust: &TrustConfig) -> Result<Principal, TokenError> {
    let key = trust.signing_key.as_deref().ok_or(TokenError::MissingKey)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = trust.validation_leeway_secs;
    validation.set_issuer(&[&trust.issuer]);
    validation.set_audience(&[&trust.audience]);

    let data = decode::<Map<String, Value>>(
        token,
        &DecodingKey::from_secret(key.as_bytes()),
        &validation,
    )?;

    let claims = data
        .claims
        .into_iter()
        .filter(|(t, _)| !RESERVED_CLAIMS.contains(&t.as_str()))
        .collect();

    Ok(Principal::new(claims))
}

/// Collapse the ordered pair list into a JSON object for signing. Repeated
/// claim types fold into an array so none are lost in map form.
fn claims_to_map(pairs: Vec<(String, Value)>) -> Map<String, Value> {
    let mut map = Map::new();
    for (claim_type, value) in pairs {
        match map.get_mut(&claim_type) {
            Some(Value::Array(existing)) => existing.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                map.insert(claim_type, value);
            }
        }
    }
    map
}
