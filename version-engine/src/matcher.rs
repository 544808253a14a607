//! Version token detection in request paths

use crate::types::VersionToken;

/// Whether `token` appears in `path` as a whole segment: `/token/` anywhere,
/// or `/token` at the very end.
///
/// The token is matched literally.
pub fn matches_segment(path: &str, token: &str) -> bool {
    let segment = format!("/{}", token);
    path.ends_with(&segment) || path.contains(&format!("{}/", segment))
}

/// Find the first candidate, in list order, present as a path segment.
///
/// First match wins, not longest match: with `v1` listed before `v1beta1`,
/// a path such as `/v1/x/v1beta1` reports `v1`.
pub fn find_version<'a>(path: &str, candidates: &'a [VersionToken]) -> Option<&'a VersionToken> {
    candidates
        .iter()
        .find(|token| matches_segment(path, token.as_str()))
}
