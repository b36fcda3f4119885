pub mod token;

use serde_json::Value;

pub use token::{mint_internal_token, validate_internal_token, TokenError};

/// Claim type carrying the caller's unique identifier in upstream identity
/// provider tokens. Used to derive `sub` when the principal lacks one.
pub const NAME_IDENTIFIER_CLAIM: &str =
    "http://schemas.xmlsoap.org/ws/2005/05/identity/claims/nameidentifier";

/// Claim types owned by the token envelope itself. These are never copied
/// from the source principal into a minted token, and are stripped from the
/// principal produced by validation.
pub const RESERVED_CLAIMS: [&str; 5] = ["exp", "nbf", "iat", "aud", "iss"];

/// Verified identity of a caller, carried as an ordered list of
/// (claim type, value) pairs. Order is preserved from the source token so
/// repeated claim types (e.g. multiple roles) survive the round trip.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Principal {
    claims: Vec<(String, Value)>,
}

impl Principal {
    pub fn new(claims: Vec<(String, Value)>) -> Self {
        Self { claims }
    }

    pub fn claims(&self) -> &[(String, Value)] {
        &self.claims
    }

    /// First value for a claim type, if present
    pub fn claim(&self, claim_type: &str) -> Option<&Value> {
        self.claims
            .iter()
            .find(|(t, _)| t == claim_type)
            .map(|(_, v)| v)
    }

    /// First string value for a claim type
    pub fn claim_str(&self, claim_type: &str) -> Option<&str> {
        self.claim(claim_type).and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.claim_str("sub")
    }

    /// True when the principal carries the given role, either as a repeated
    /// `role` claim or inside a `roles` array claim.
    pub fn has_role(&self, role: &str) -> bool {
        self.claims.iter().any(|(t, v)| match t.as_str() {
            "role" => v.as_str() == Some(role),
            "roles" => v
                .as_array()
                .map(|a| a.iter().any(|r| r.as_str() == Some(role)))
                .unwrap_or(false),
            _ => false,
        })
    }

    /// Claim set for a minted token: everything except the reserved envelope
    /// claims, with `sub` guaranteed. An explicit filtered copy over the
    /// pair list; no claim is ever trusted by position.
    pub fn token_claims(&self) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> = self
            .claims
            .iter()
            .filter(|(t, _)| !RESERVED_CLAIMS.contains(&t.as_str()))
            .cloned()
            .collect();

        if !out.iter().any(|(t, _)| t == "sub") {
            if let Some(name_id) = self.claim(NAME_IDENTIFIER_CLAIM).cloned() {
                out.push(("sub".to_string(), name_id));
            }
        }

        out
    }
}
