//! Repository declarations and `apply from` includes found in Gradle build scripts.

use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::block::find_all_blocks;
use crate::interpolate::resolve_property;
use crate::sources::PropertyMap;

/// Blocks whose nested `repositories { ... }` can declare a deploy target.
const REPOSITORY_PARENT_BLOCKS: [&str; 3] = [
    "publishing",
    "uploadArchives",
    "dependencyResolutionManagement",
];

/// Gradle build script dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DslFlavor {
    Groovy,
    Kotlin,
}

impl DslFlavor {
    /// `.kts` scripts are Kotlin DSL; everything else is treated as Groovy.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("kts") => DslFlavor::Kotlin,
            _ => DslFlavor::Groovy,
        }
    }

    fn url_re(self) -> &'static Regex {
        static GROOVY: OnceLock<Regex> = OnceLock::new();
        static KOTLIN: OnceLock<Regex> = OnceLock::new();
        match self {
            DslFlavor::Groovy => GROOVY.get_or_init(|| {
                Regex::new(r#"(?m)url\s*(?:[:=]?\s*|[:=]\s*uri\s*\(\s*)['"]([^'"]+)['"]"#)
                    .expect("valid regex")
            }),
            DslFlavor::Kotlin => KOTLIN.get_or_init(|| {
                Regex::new(r#"(?m)url(?:\.set)?\s*(?:\(\s*|\s*=\s*)(?:uri\s*\(\s*)?['"]([^'"]+)['"]"#)
                    .expect("valid regex")
            }),
        }
    }

    fn apply_from_re(self) -> &'static Regex {
        static GROOVY: OnceLock<Regex> = OnceLock::new();
        static KOTLIN: OnceLock<Regex> = OnceLock::new();
        match self {
            DslFlavor::Groovy => GROOVY.get_or_init(|| {
                Regex::new(r#"(?m)apply\s+from\s*:\s*['"]([^'"]+)['"]"#).expect("valid regex")
            }),
            DslFlavor::Kotlin => KOTLIN.get_or_init(|| {
                Regex::new(r#"(?m)apply\s*\(\s*from\s*=\s*['"]([^'"]+)['"]"#).expect("valid regex")
            }),
        }
    }
}

/// Raw repository URLs declared inside `publishing`, `uploadArchives` and
/// `dependencyResolutionManagement` blocks, in document order.
///
/// Placeholders are returned unresolved.
#[must_use]
pub fn find_declared_repository_urls(script: &str, flavor: DslFlavor) -> Vec<String> {
    let mut combined = String::new();
    for parent in REPOSITORY_PARENT_BLOCKS {
        for block in find_all_blocks(script, parent) {
            for repositories in find_all_blocks(block, "repositories") {
                combined.push_str(repositories);
                combined.push('\n');
            }
        }
    }

    if combined.is_empty() {
        return Vec::new();
    }

    flavor
        .url_re()
        .captures_iter(&combined)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Local scripts pulled in with `apply from: "..."` (Groovy) or `apply(from = "...")`
/// (Kotlin).
///
/// Paths are resolved against `props`, made absolute relative to the directory of
/// `current_script`, and lexically normalized. Remote scripts and paths that leave `root`
/// (a normalized directory, usually the project or the Gradle user home) are skipped.
#[must_use]
pub fn collect_applied_scripts(
    script: &str,
    flavor: DslFlavor,
    props: &PropertyMap,
    current_script: &Path,
    root: &Path,
) -> Vec<PathBuf> {
    let base_dir = current_script.parent();
    let mut paths = Vec::new();

    for caps in flavor.apply_from_re().captures_iter(script) {
        let resolved = resolve_property(&caps[1], props);

        if resolved.contains("://") {
            tracing::debug!(
                target: "flexpack.gradle.script",
                script = %resolved,
                "skipping remote script"
            );
            continue;
        }
        if resolved.contains('\0') {
            tracing::debug!(
                target: "flexpack.gradle.script",
                script = %resolved.escape_debug(),
                "skipping invalid script path"
            );
            continue;
        }

        let applied = Path::new(&resolved);
        let joined = match base_dir {
            Some(dir) if applied.is_relative() => dir.join(applied),
            _ => applied.to_path_buf(),
        };

        match normalize_path(&joined).filter(|path| path.starts_with(root)) {
            Some(path) => paths.push(path),
            None => tracing::debug!(
                target: "flexpack.gradle.script",
                path = %joined.display(),
                root = %root.display(),
                "skipping script path outside of its root"
            ),
        }
    }

    paths
}

/// Lexically normalizes `path`: drops `.` components and folds `..` into the preceding
/// component. Returns `None` when `..` would climb above the root (or above the first
/// component of a relative path).
pub(crate) fn normalize_path(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    let mut normal_depth = 0usize;

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if normal_depth == 0 {
                    return None;
                }
                out.pop();
                normal_depth -= 1;
            }
            Component::Normal(part) => {
                out.push(part);
                normal_depth += 1;
            }
            Component::RootDir | Component::Prefix(_) => out.push(component.as_os_str()),
        }
    }

    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn publishing(repositories: &str) -> String {
        format!("\npublishing {{\n    repositories {{\n{repositories}\n    }}\n}}\n")
    }

    #[test]
    fn finds_groovy_urls_in_declaration_order() {
        let script = publishing(
            r#"
        maven {
            url "http://localhost:8081/artifactory/libs-snapshot"
        }
        maven {
            url 'http://localhost:8081/artifactory/libs-release'
        }"#,
        );
        assert_eq!(
            find_declared_repository_urls(&script, DslFlavor::Groovy),
            vec![
                "http://localhost:8081/artifactory/libs-snapshot",
                "http://localhost:8081/artifactory/libs-release",
            ]
        );
    }

    #[test]
    fn finds_urls_in_every_parent_block() {
        let script = r#"
            uploadArchives {
                repositories {
                    mavenDeployer {
                        url "http://localhost:8081/artifactory/legacy-repo"
                    }
                }
            }
            dependencyResolutionManagement {
                repositories {
                    maven { url = "http://localhost:8081/artifactory/gradle-plugins" }
                }
            }
        "#;
        assert_eq!(
            find_declared_repository_urls(script, DslFlavor::Groovy),
            vec![
                "http://localhost:8081/artifactory/legacy-repo",
                "http://localhost:8081/artifactory/gradle-plugins",
            ]
        );
    }

    #[test]
    fn groovy_url_forms() {
        for line in [
            r#"url "http://example.com""#,
            r#"url 'http://example.com'"#,
            r#"url = "http://example.com""#,
            r#"url: "http://example.com""#,
            r#"url = uri("http://example.com")"#,
        ] {
            let script = publishing(&format!("maven {{ {line} }}"));
            assert_eq!(
                find_declared_repository_urls(&script, DslFlavor::Groovy),
                vec!["http://example.com"],
                "line: {line}"
            );
        }
    }

    #[test]
    fn kotlin_url_forms() {
        for line in [
            r#"url("http://example.com")"#,
            r#"url = uri("http://example.com")"#,
            r#"url.set(uri("http://example.com"))"#,
            r#"url = "http://example.com""#,
        ] {
            let script = publishing(&format!("maven {{ {line} }}"));
            assert_eq!(
                find_declared_repository_urls(&script, DslFlavor::Kotlin),
                vec!["http://example.com"],
                "line: {line}"
            );
        }
    }

    #[test]
    fn placeholders_are_returned_raw() {
        let script = publishing(r#"maven { url "${artifactoryUrl}/libs-release" }"#);
        assert_eq!(
            find_declared_repository_urls(&script, DslFlavor::Groovy),
            vec!["${artifactoryUrl}/libs-release"]
        );
    }

    #[test]
    fn no_declarations_yield_no_urls() {
        let script = "\ndependencies {\n    implementation \"com.example:lib:1.0\"\n}\n";
        assert!(find_declared_repository_urls(script, DslFlavor::Groovy).is_empty());
        assert!(find_declared_repository_urls(&publishing(""), DslFlavor::Groovy).is_empty());

        // Repositories outside a publishing block are resolution sources, not deploy targets.
        let script = "repositories {\n    maven { url \"http://example.com/libs\" }\n}\n";
        assert!(find_declared_repository_urls(script, DslFlavor::Groovy).is_empty());
    }

    #[test]
    fn flavor_follows_extension() {
        assert_eq!(DslFlavor::from_path(Path::new("build.gradle.kts")), DslFlavor::Kotlin);
        assert_eq!(DslFlavor::from_path(Path::new("build.gradle")), DslFlavor::Groovy);
        assert_eq!(DslFlavor::from_path(Path::new("init")), DslFlavor::Groovy);
    }

    #[test]
    fn collects_applied_scripts_relative_to_current_script() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let build = root.join("build.gradle");
        let none = PropertyMap::new();

        assert_eq!(
            collect_applied_scripts(
                "apply from: \"gradle/publish.gradle\"",
                DslFlavor::Groovy,
                &none,
                &build,
                root
            ),
            vec![root.join("gradle").join("publish.gradle")]
        );
        assert_eq!(
            collect_applied_scripts(
                "apply(from = 'gradle/publish.gradle.kts')",
                DslFlavor::Kotlin,
                &none,
                &root.join("build.gradle.kts"),
                root
            ),
            vec![root.join("gradle").join("publish.gradle.kts")]
        );
        assert_eq!(
            collect_applied_scripts(
                "apply from: \"gradle/a.gradle\"\napply from: './gradle/../b.gradle'",
                DslFlavor::Groovy,
                &none,
                &build,
                root
            ),
            vec![root.join("gradle").join("a.gradle"), root.join("b.gradle")]
        );
    }

    #[test]
    fn applied_scripts_stay_inside_the_root() {
        let none = PropertyMap::new();
        let root = Path::new("/home/u/proj");
        let nested = root.join("app").join("build.gradle");

        assert!(collect_applied_scripts(
            "apply from: \"../../../etc/evil.gradle\"",
            DslFlavor::Groovy,
            &none,
            &root.join("build.gradle"),
            root
        )
        .is_empty());
        assert!(collect_applied_scripts(
            "apply from: \"/etc/evil.gradle\"",
            DslFlavor::Groovy,
            &none,
            &nested,
            root
        )
        .is_empty());
        // Climbing out of a subproject is fine while the target stays in the root.
        assert_eq!(
            collect_applied_scripts(
                "apply from: \"../gradle/common.gradle\"\napply from: \"../../sibling/x.gradle\"",
                DslFlavor::Groovy,
                &none,
                &nested,
                root
            ),
            vec![PathBuf::from("/home/u/proj/gradle/common.gradle")]
        );
    }

    #[test]
    fn applied_script_paths_resolve_properties() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_string_lossy().into_owned();
        let props: PropertyMap = [("rootDir", root.as_str())].into_iter().collect();

        assert_eq!(
            collect_applied_scripts(
                "apply from: \"${rootDir}/gradle/publish.gradle\"",
                DslFlavor::Groovy,
                &props,
                &dir.path().join("sub").join("build.gradle"),
                dir.path()
            ),
            vec![dir.path().join("gradle").join("publish.gradle")]
        );
    }

    #[test]
    fn remote_and_missing_applies_are_skipped() {
        let root = Path::new("/project");
        let build = root.join("build.gradle");
        let none = PropertyMap::new();
        assert!(collect_applied_scripts(
            "apply from: \"https://example.com/script.gradle\"",
            DslFlavor::Groovy,
            &none,
            &build,
            root
        )
        .is_empty());
        assert!(
            collect_applied_scripts("dependencies { }", DslFlavor::Groovy, &none, &build, root)
                .is_empty()
        );
        // Groovy syntax is not recognized in a Kotlin script and vice versa.
        assert!(collect_applied_scripts(
            "apply from: \"a.gradle\"",
            DslFlavor::Kotlin,
            &none,
            &build,
            root
        )
        .is_empty());
    }

    #[test]
    fn normalizes_paths_lexically() {
        assert_eq!(
            normalize_path(Path::new("/a/./b/../c.gradle")),
            Some(PathBuf::from("/a/c.gradle"))
        );
        assert_eq!(
            normalize_path(Path::new("a/b/../../c")),
            Some(PathBuf::from("c"))
        );
        assert_eq!(normalize_path(Path::new("/../etc/passwd")), None);
        assert_eq!(normalize_path(Path::new("../outside.gradle")), None);
    }
}
