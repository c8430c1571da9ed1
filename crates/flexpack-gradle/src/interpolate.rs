//! `${...}` and `$name` placeholder resolution against a [`PropertyMap`], plus extraction of
//! properties that scripts define for themselves (`ext`, `extra`).

use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::block::find_all_blocks;
use crate::sources::PropertyMap;

/// Substituted values are resolved again up to this many levels deep.
const MAX_DEPTH: usize = 10;

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid regex"))
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)*)")
            .expect("valid regex")
    })
}

/// Replaces `${key}` and `$key` placeholders in `value` with properties from `props`.
///
/// - `${project.key}` and `${rootProject.key}` look up `key`; so does
///   `${findProperty("key")}`.
/// - `$a.b.c` tries `a.b.c`, then `a.b`, then `a`, appending the unmatched tail verbatim.
/// - Placeholders preceded by a backslash, unknown keys, blank keys and self-references are
///   left as written.
///
/// Substituted values are resolved recursively; past a depth of 10 the partially resolved
/// text is returned as is.
#[must_use]
pub fn resolve_property(value: &str, props: &PropertyMap) -> String {
    if value.is_empty() {
        return String::new();
    }
    resolve(value, props, 0)
}

fn resolve(s: &str, props: &PropertyMap, depth: usize) -> String {
    if depth > MAX_DEPTH {
        tracing::debug!(
            target: "flexpack.gradle.props",
            value = s,
            "property resolution depth limit reached"
        );
        return s.to_string();
    }

    let braced = placeholder_re().replace_all(s, |caps: &Captures<'_>| {
        let whole = &caps[0];
        if caps.get(0).is_some_and(|m| is_escaped(s, m.start())) {
            return whole.to_string();
        }
        resolve_braced(&caps[1], whole, props, depth).unwrap_or_else(|| whole.to_string())
    });

    variable_re()
        .replace_all(&braced, |caps: &Captures<'_>| {
            let whole = &caps[0];
            if caps.get(0).is_some_and(|m| is_escaped(&braced, m.start())) {
                return whole.to_string();
            }
            resolve_variable(&caps[1], whole, props, depth).unwrap_or_else(|| whole.to_string())
        })
        .into_owned()
}

fn resolve_braced(
    raw_key: &str,
    whole: &str,
    props: &PropertyMap,
    depth: usize,
) -> Option<String> {
    let mut key = raw_key.trim();
    if key.is_empty() {
        return None;
    }

    if let Some(rest) = key.strip_prefix("project.") {
        key = rest;
    } else if let Some(rest) = key.strip_prefix("rootProject.") {
        key = rest;
    }

    if let Some(inner) = find_property_argument(key) {
        key = inner;
    }

    if key.starts_with('$') {
        return None;
    }

    let value = props.get(key)?;
    if value == whole {
        tracing::debug!(
            target: "flexpack.gradle.props",
            key,
            "self-referencing property left unresolved"
        );
        return None;
    }
    Some(resolve(value, props, depth + 1))
}

fn resolve_variable(
    full_key: &str,
    whole: &str,
    props: &PropertyMap,
    depth: usize,
) -> Option<String> {
    if let Some(value) = props.get(full_key) {
        if value == whole {
            return None;
        }
        return Some(resolve(value, props, depth + 1));
    }

    // `$host.example.com` with only `host` defined keeps `.example.com` as literal text.
    for (dot, _) in full_key.rmatch_indices('.') {
        let (prefix, suffix) = full_key.split_at(dot);
        let Some(value) = props.get(prefix) else {
            continue;
        };
        if value.strip_prefix('$') == Some(prefix) {
            continue;
        }
        return Some(format!("{}{suffix}", resolve(value, props, depth + 1)));
    }
    None
}

/// `findProperty("key")` or `findProperty('key')` -> `key`.
fn find_property_argument(key: &str) -> Option<&str> {
    let args = key.strip_prefix("findProperty(")?.strip_suffix(')')?;
    let quote = args.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    args.strip_prefix(quote)?.strip_suffix(quote)
}

fn is_escaped(s: &str, start: usize) -> bool {
    let backslashes = s.as_bytes()[..start]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    backslashes % 2 == 1
}

fn ext_block_entry_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*([a-zA-Z_][a-zA-Z0-9_.]*)\s*=\s*['"]([^'"]+)['"]"#)
            .expect("valid regex")
    })
}

fn ext_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*(?:project\.)?ext\.([a-zA-Z_][a-zA-Z0-9_.]*)\s*=\s*['"]([^'"]+)['"]"#,
        )
        .expect("valid regex")
    })
}

fn kotlin_extra_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?m)^\s*(?:project\.)?extra(?:\[\s*["']([a-zA-Z_][a-zA-Z0-9_.]*)["']\s*\]\s*=|\.set\(\s*["']([a-zA-Z_][a-zA-Z0-9_.]*)["']\s*,)\s*["']([^'"]+)["']"#,
        )
        .expect("valid regex")
    })
}

/// Properties a script defines for itself.
///
/// Recognizes `ext { key = "value" }` blocks, `ext.key = "value"` and
/// `project.ext.key = "value"` assignments, and the Kotlin DSL forms
/// `extra["key"] = "value"` and `extra.set("key", "value")`. Later definitions win.
#[must_use]
pub fn extract_properties_from_script(content: &str) -> PropertyMap {
    let mut props = PropertyMap::new();

    for block in find_all_blocks(content, "ext") {
        for caps in ext_block_entry_re().captures_iter(block) {
            props.insert(caps[1].trim(), &caps[2]);
        }
    }

    for caps in ext_assignment_re().captures_iter(content) {
        props.insert(caps[1].trim(), &caps[2]);
    }

    for caps in kotlin_extra_re().captures_iter(content) {
        let Some(key) = caps.get(1).or_else(|| caps.get(2)) else {
            continue;
        };
        props.insert(key.as_str(), &caps[3]);
    }

    props
}
