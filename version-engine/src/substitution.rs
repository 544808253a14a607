//! Derivation of sibling requests for other versions

use crate::types::{HttpRequestData, VersionToken, MARKER_HEADER, MARKER_VALUE};

/// A request derived from a base request by swapping its version segment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FuzzRequest {
    pub request: HttpRequestData,
    pub original_path: String,
    pub source: VersionToken,
    pub target: VersionToken,
}

/// Replace the leftmost `/source` in `path` with `/target`.
///
/// Only the first occurrence is rewritten.
pub fn substitute_path(path: &str, source: &str, target: &str) -> String {
    path.replacen(&format!("/{}", source), &format!("/{}", target), 1)
}

/// Build the request for `target`, leaving `base` untouched.
///
/// The result carries the marker header so it is recognised if it ever
/// comes back through the engine.
pub fn substitute(base: &HttpRequestData, source: &VersionToken, target: &VersionToken) -> FuzzRequest {
    let mut request = base.with_path(substitute_path(&base.path, source, target));
    request.set_header(MARKER_HEADER, MARKER_VALUE);

    FuzzRequest {
        request,
        original_path: base.path.clone(),
        source: source.clone(),
        target: target.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HttpService;

    fn token(raw: &str) -> VersionToken {
        VersionToken::new(raw).unwrap()
    }

    fn base(path: &str) -> HttpRequestData {
        HttpRequestData::new("GET", HttpService::new("https", "api.example.com", 443), path)
            .with_header("Authorization", "Bearer abc")
    }

    #[test]
    fn test_substitute_rewrites_path_and_marks_request() {
        let original = base("/api/v1/users");
        let fuzz = substitute(&original, &token("v1"), &token("v2"));

        assert_eq!(fuzz.request.path, "/api/v2/users");
        assert_eq!(fuzz.original_path, "/api/v1/users");
        assert!(fuzz.request.is_marked());
        assert_eq!(fuzz.request.header("authorization"), Some("Bearer abc"));
        assert_eq!(fuzz.request.service, original.service);

        // base is never mutated
        assert_eq!(original.path, "/api/v1/users");
        assert!(!original.is_marked());
    }

    #[test]
    fn test_only_first_occurrence_is_replaced() {
        assert_eq!(
            substitute_path("/v1/items/v1/detail", "v1", "v3"),
            "/v3/items/v1/detail"
        );
    }

    #[test]
    fn test_suffix_token() {
        assert_eq!(substitute_path("/api/v1", "v1", "v2beta1"), "/api/v2beta1");
    }

    #[test]
    fn test_first_textual_occurrence_even_inside_longer_segment() {
        // the leftmost "/v1" is the prefix of "/v1beta1"
        assert_eq!(
            substitute_path("/v1beta1/x/v1/y", "v1", "v2"),
            "/v2beta1/x/v1/y"
        );
    }

    #[test]
    fn test_query_string_is_preserved() {
        assert_eq!(
            substitute_path("/api/v1/users?version=v1", "v1", "v2"),
            "/api/v2/users?version=v1"
        );
    }

    #[test]
    fn test_existing_marker_variant_is_replaced() {
        let original = base("/v1").with_header("x-api-fuzzer", "maybe");
        let fuzz = substitute(&original, &token("v1"), &token("v2"));
        assert_eq!(fuzz.request.headers.len(), 2);
        assert!(fuzz.request.is_marked());
    }
}
