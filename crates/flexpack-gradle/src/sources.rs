//! Gradle project property sources.
//!
//! Gradle merges project properties from several places. This module reproduces the
//! precedence order without running Gradle:
//!
//! 1. `<gradle user home>/gradle.properties`
//! 2. `<project>/gradle.properties`
//! 3. `ORG_GRADLE_PROJECT_<name>` environment variables
//! 4. `-P<key>=<value>` / `-D<key>=<value>` arguments of the current process
//! 5. the same fragments inside `GRADLE_OPTS`, then `JAVA_OPTS`
//!
//! Later sources overwrite earlier ones. Missing or unreadable sources contribute nothing.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub(crate) const GRADLE_PROPERTIES_FILE: &str = "gradle.properties";
const ENV_PROJECT_PREFIX: &str = "ORG_GRADLE_PROJECT_";
const ENV_GRADLE_OPTS: &str = "GRADLE_OPTS";
const ENV_JAVA_OPTS: &str = "JAVA_OPTS";
const ENV_GRADLE_USER_HOME: &str = "GRADLE_USER_HOME";

/// Case-sensitive property name to value mapping.
///
/// Iteration is alphabetical by name. Empty names and empty values are never stored, so a
/// successful lookup always yields a non-empty value.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PropertyMap(BTreeMap<String, String>);

impl PropertyMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `key -> value` unless either is empty. Returns whether the entry was stored.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        let value = value.into();
        if key.is_empty() || value.is_empty() {
            return false;
        }
        self.0.insert(key, value);
        true
    }

    /// Inserts only when `key` is not defined yet.
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<String>) {
        if !self.0.contains_key(key) {
            self.insert(key, value);
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Layers `other` on top of `self`; entries of `other` win.
    pub fn merge(&mut self, other: PropertyMap) {
        self.0.extend(other.0);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl<K, V> FromIterator<(K, V)> for PropertyMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = PropertyMap::new();
        map.extend(iter);
        map
    }
}

impl<K, V> Extend<(K, V)> for PropertyMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            self.insert(key, value);
        }
    }
}

/// Snapshot of the process state Gradle would see: environment variables, the argument
/// vector and an optional Gradle user home override.
///
/// Resolution never reads process-global state directly; callers either capture it with
/// [`GradleEnvironment::from_process`] or build one explicitly.
#[derive(Clone, Debug, Default)]
pub struct GradleEnvironment {
    vars: BTreeMap<String, String>,
    args: Vec<String>,
    gradle_user_home: Option<PathBuf>,
}

impl GradleEnvironment {
    /// Captures the current process environment and argument vector.
    ///
    /// Variables or arguments that are not valid Unicode are converted lossily.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars_os()
                .map(|(k, v)| {
                    (
                        k.to_string_lossy().into_owned(),
                        v.to_string_lossy().into_owned(),
                    )
                })
                .collect(),
            args: std::env::args_os()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            gradle_user_home: None,
        }
    }

    #[must_use]
    pub fn with_var(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_gradle_user_home(mut self, path: impl Into<PathBuf>) -> Self {
        self.gradle_user_home = Some(path.into());
        self
    }

    #[must_use]
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The Gradle user home: the explicit override, else `GRADLE_USER_HOME`, else
    /// `$HOME/.gradle` (`%USERPROFILE%\.gradle` on Windows).
    #[must_use]
    pub fn gradle_user_home(&self) -> Option<PathBuf> {
        if let Some(home) = &self.gradle_user_home {
            return Some(home.clone());
        }
        if let Some(home) = self.var(ENV_GRADLE_USER_HOME).filter(|v| !v.is_empty()) {
            return Some(PathBuf::from(home));
        }

        let home = self
            .var("HOME")
            .filter(|v| !v.is_empty())
            .or_else(|| self.var("USERPROFILE").filter(|v| !v.is_empty()))
            .map(PathBuf::from)?;
        Some(home.join(".gradle"))
    }
}

/// Merges every property source visible to a Gradle build rooted at `working_dir`.
#[must_use]
pub fn collect_properties(working_dir: &Path, env: &GradleEnvironment) -> PropertyMap {
    let mut props = PropertyMap::new();

    match env.gradle_user_home() {
        Some(home) => props.merge(read_properties_file(&home.join(GRADLE_PROPERTIES_FILE))),
        None => tracing::debug!(
            target: "flexpack.gradle.props",
            "no gradle user home; skipping user gradle.properties"
        ),
    }

    props.merge(read_properties_file(
        &working_dir.join(GRADLE_PROPERTIES_FILE),
    ));

    for (name, value) in env.vars() {
        let Some(key) = name.strip_prefix(ENV_PROJECT_PREFIX) else {
            continue;
        };
        props.insert(key.trim(), value.trim());
    }

    props.merge(parse_properties_from_args(env.args()));

    for opts_var in [ENV_GRADLE_OPTS, ENV_JAVA_OPTS] {
        if let Some(opts) = env.var(opts_var).filter(|v| !v.trim().is_empty()) {
            props.merge(parse_properties_from_opts(opts));
        }
    }

    tracing::trace!(
        target: "flexpack.gradle.props",
        working_dir = %working_dir.display(),
        count = props.len(),
        "collected gradle properties"
    );
    props
}

/// Reads a `gradle.properties`-style file. Values are trimmed and stripped of one pair of
/// surrounding quotes; entries left empty are dropped.
///
/// A missing or unreadable file yields an empty map.
#[must_use]
pub fn read_properties_file(path: &Path) -> PropertyMap {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            tracing::debug!(
                target: "flexpack.gradle.props",
                path = %path.display(),
                error = %err,
                "skipping properties file"
            );
            return PropertyMap::new();
        }
    };

    flexpack_properties::parse(&text)
        .entries
        .into_iter()
        .map(|entry| {
            let value = remove_quotes(entry.value.trim()).to_string();
            (entry.key.trim().to_string(), value)
        })
        .collect()
}

/// Strips one pair of matching surrounding single or double quotes.
#[must_use]
pub fn remove_quotes(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Extracts `-P<key>=<value>` and `-D<key>=<value>` fragments from an argument list.
///
/// The value may contain further `=` characters and may be quoted. Fragments with an empty
/// key or value are ignored.
#[must_use]
pub fn parse_properties_from_args<S: AsRef<str>>(args: &[S]) -> PropertyMap {
    let mut props = PropertyMap::new();
    for arg in args {
        let arg = arg.as_ref().trim();
        let Some(pair) = arg
            .strip_prefix("-P")
            .or_else(|| arg.strip_prefix("-D"))
            .filter(|pair| !pair.is_empty())
        else {
            continue;
        };
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        props.insert(key.trim(), remove_quotes(value.trim()));
    }
    props
}

/// Same as [`parse_properties_from_args`] for an options string such as `GRADLE_OPTS`.
#[must_use]
pub fn parse_properties_from_opts(opts: &str) -> PropertyMap {
    parse_properties_from_args(split_args_respecting_quotes(opts).as_slice())
}

/// Splits an options string on spaces and tabs, keeping `"..."` and `'...'` spans (quotes
/// included) inside a single token. An unterminated quote extends to the end of the input.
#[must_use]
pub fn split_args_respecting_quotes(s: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;

    for ch in s.chars() {
        match quote {
            Some(q) => {
                current.push(ch);
                if ch == q {
                    quote = None;
                }
            }
            None => match ch {
                ' ' | '\t' => {
                    if !current.is_empty() {
                        args.push(std::mem::take(&mut current));
                    }
                }
                '"' | '\'' => {
                    quote = Some(ch);
                    current.push(ch);
                }
                _ => current.push(ch),
            },
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}
