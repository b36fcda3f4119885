use axum::http::HeaderMap;

/// Header carrying the signed internal identity assertion, set only by the
/// edge after stripping whatever the caller sent.
pub const INTERNAL_IDENTITY_HEADER: &str = "x-internal-identity";

/// Headers a caller could forge to assert tenant or identity. Removed
/// unconditionally at every trust boundary before anything reads them.
pub const SPOOFABLE_HEADERS: [&str; 5] = [
    "x-tenantid",
    "x-tenant-dbstrategy",
    "x-internal-identity",
    "x-forwarded-user",
    "x-forwarded-roles",
];

/// Remove every spoofable header from the map. Repeated header values are
/// removed as well (`HeaderMap::remove` only drops the first occurrence).
pub fn strip_spoofable_headers(headers: &mut HeaderMap) {
    for name in SPOOFABLE_HEADERS {
        while headers.remove(name).is_some() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn strips_all_spoofable_headers_including_repeats() {
        let mut headers = HeaderMap::new();
        headers.insert("x-tenantid", HeaderValue::from_static("evil-tenant"));
        headers.insert("x-tenant-dbstrategy", HeaderValue::from_static("Shared"));
        headers.insert("x-internal-identity", HeaderValue::from_static("forged"));
        headers.append("x-internal-identity", HeaderValue::from_static("forged2"));
        headers.insert("x-forwarded-user", HeaderValue::from_static("admin"));
        headers.insert("x-forwarded-roles", HeaderValue::from_static("platform-admin"));
        headers.insert("accept", HeaderValue::from_static("application/json"));

        strip_spoofable_headers(&mut headers);

        for name in SPOOFABLE_HEADERS {
            assert!(headers.get(name).is_none(), "{} survived stripping", name);
        }
        assert!(headers.get("accept").is_some());
    }
}
