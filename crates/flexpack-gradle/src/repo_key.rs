//! Turning repository URLs and property values into bare Artifactory repository keys, and
//! picking the key a build deploys to.

use url::Url;

use crate::error::RepoFinderError;
use crate::sources::PropertyMap;

const ARTIFACTORY_CONTEXT: &str = "artifactory";
const API_SEGMENT: &str = "api";
const API_KINDS: [&str; 3] = ["maven", "gradle", "ivy"];

const KEYWORD_SNAPSHOT: &str = "snapshot";
const KEYWORD_RELEASE: &str = "release";
const REPO_PROPERTY_KEYWORDS: [&str; 3] = ["repo", "url", "deploy"];

/// Extracts the repository key from an Artifactory repository URL.
///
/// `http://host:8081/artifactory/api/maven/libs-release-local` and
/// `http://host/artifactory/libs-release-local/` both yield `libs-release-local`. Query,
/// fragment and userinfo are ignored and path segments are percent-decoded.
pub fn extract_repo_key_from_url(raw: &str) -> Result<String, RepoFinderError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(RepoFinderError::invalid_url(raw, "empty URL"));
    }

    let url =
        Url::parse(trimmed).map_err(|err| RepoFinderError::invalid_url(raw, err.to_string()))?;
    if url.host_str().map_or(true, str::is_empty) {
        return Err(RepoFinderError::invalid_url(raw, "URL has no host"));
    }

    let segments: Vec<String> = url
        .path_segments()
        .into_iter()
        .flatten()
        .filter(|segment| !segment.is_empty())
        .map(|segment| percent_decode(segment).unwrap_or_else(|| segment.to_string()))
        .collect();

    repo_key_from_segments(&segments)
        .ok_or_else(|| RepoFinderError::invalid_url(raw, "no repository key in URL path"))
}

/// Last path segment after dropping the `artifactory` context and an `api/<kind>` prefix.
fn repo_key_from_segments(segments: &[String]) -> Option<String> {
    let mut rest = segments;
    if rest.first().is_some_and(|s| s == ARTIFACTORY_CONTEXT) {
        rest = &rest[1..];
    }
    if rest.len() >= 2 && rest[0] == API_SEGMENT && API_KINDS.contains(&rest[1].as_str()) {
        rest = &rest[2..];
    }
    rest.last().cloned()
}

fn percent_decode(s: &str) -> Option<String> {
    if !s.as_bytes().contains(&b'%') {
        return Some(s.to_string());
    }

    fn from_hex(b: u8) -> Option<u8> {
        Some(match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => 10 + (b - b'a'),
            b'A'..=b'F' => 10 + (b - b'A'),
            _ => return None,
        })
    }

    let bytes = s.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hi = *bytes.get(i + 1)?;
                let lo = *bytes.get(i + 2)?;
                out.push((from_hex(hi)? << 4) | from_hex(lo)?);
                i += 3;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8(out).ok()
}

/// Normalizes a candidate value (bare key, URL or URL path) to a repository key.
///
/// Returns `None` for values that cannot name a repository: empty strings, relative paths
/// (`./x`, `../x`), Maven coordinates (`group:artifact:version`), other slash-separated
/// values, values with whitespace and values that still contain a `$` placeholder.
#[must_use]
pub fn extract_repo_key_candidate(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty()
        || value.starts_with("./")
        || value.starts_with("../")
        || value.contains('$')
        || value.chars().any(char::is_whitespace)
    {
        return None;
    }

    if value.contains("://") {
        return match extract_repo_key_from_url(value) {
            Ok(key) => Some(key),
            Err(err) => {
                tracing::debug!(
                    target: "flexpack.gradle.repo",
                    value,
                    error = %err,
                    "ignoring repository candidate"
                );
                None
            }
        };
    }

    if value.starts_with('/') {
        let segments: Vec<String> = value
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| percent_decode(segment).unwrap_or_else(|| segment.to_string()))
            .collect();
        return repo_key_from_segments(&segments);
    }

    if value.contains('/') || value.contains(':') {
        return None;
    }

    Some(value.to_string())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_ascii_lowercase().contains(needle)
}

/// Picks the deploy repository among `candidates`.
///
/// Candidates are normalized with [`extract_repo_key_candidate`] and deduplicated (first
/// occurrence wins). Snapshot builds prefer the first key containing `snapshot`, release
/// builds the first containing `release` (both case-insensitive); otherwise the first key is
/// used.
pub fn select_best_repository<S: AsRef<str>>(
    candidates: &[S],
    is_snapshot: bool,
) -> Result<String, RepoFinderError> {
    let mut keys: Vec<String> = Vec::new();
    for candidate in candidates {
        let Some(key) = extract_repo_key_candidate(candidate.as_ref()) else {
            continue;
        };
        if !keys.contains(&key) {
            keys.push(key);
        }
    }

    if keys.is_empty() {
        return Err(RepoFinderError::NoRepositoryFound);
    }

    let preferred = if is_snapshot {
        KEYWORD_SNAPSHOT
    } else {
        KEYWORD_RELEASE
    };
    let chosen = keys
        .iter()
        .position(|key| contains_ignore_case(key, preferred))
        .unwrap_or(0);
    Ok(keys.swap_remove(chosen))
}

/// [`select_best_repository`] over URLs found in `origin`, with debug logging.
pub fn find_repository_key_from_matches<S: AsRef<str>>(
    urls: &[S],
    origin: &str,
    is_snapshot: bool,
) -> Result<String, RepoFinderError> {
    let result = select_best_repository(urls, is_snapshot);
    match &result {
        Ok(key) => tracing::debug!(
            target: "flexpack.gradle.repo",
            origin,
            repository = %key,
            candidates = urls.len(),
            "selected deploy repository"
        ),
        Err(err) => tracing::debug!(
            target: "flexpack.gradle.repo",
            origin,
            candidates = urls.len(),
            error = %err,
            "no usable repository URL"
        ),
    }
    result
}

/// Looks for a deploy repository among the property values themselves.
///
/// Only properties whose name contains `repo`, `url` or `deploy` (case-insensitive) are
/// considered, in alphabetical order. Names containing `snapshot` or `release` form
/// dedicated pools: the pool matching the build kind wins, then unclassified properties,
/// then the other pool.
pub fn find_repo_in_properties(
    props: &PropertyMap,
    is_snapshot: bool,
) -> Result<String, RepoFinderError> {
    let mut snapshot_pool = Vec::new();
    let mut release_pool = Vec::new();
    let mut general_pool = Vec::new();

    for (name, value) in props.iter() {
        let lower = name.to_ascii_lowercase();
        if !REPO_PROPERTY_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
            continue;
        }
        if value.eq_ignore_ascii_case("true") || value.eq_ignore_ascii_case("false") {
            continue;
        }
        let Some(key) = extract_repo_key_candidate(value) else {
            continue;
        };

        if lower.contains(KEYWORD_SNAPSHOT) {
            snapshot_pool.push(key);
        } else if lower.contains(KEYWORD_RELEASE) {
            release_pool.push(key);
        } else {
            general_pool.push(key);
        }
    }

    let (preferred, other) = if is_snapshot {
        (snapshot_pool, release_pool)
    } else {
        (release_pool, snapshot_pool)
    };

    preferred
        .into_iter()
        .chain(general_pool)
        .chain(other)
        .next()
        .ok_or(RepoFinderError::NoRepositoryFound)
}
