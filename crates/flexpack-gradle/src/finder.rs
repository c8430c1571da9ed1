//! Deploy repository discovery for a Gradle project.
//!
//! Sources are consulted in order and the first one that yields a repository key wins:
//!
//! 1. an explicit repository hint
//! 2. `build.gradle.kts`, `build.gradle`, `settings.gradle.kts`, `settings.gradle`
//!    (including scripts they `apply from`)
//! 3. init scripts in the Gradle user home
//! 4. repository-like project properties

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use walkdir::WalkDir;

use crate::error::RepoFinderError;
use crate::interpolate::{extract_properties_from_script, resolve_property};
use crate::repo_key::{extract_repo_key_candidate, find_repo_in_properties, find_repository_key_from_matches};
use crate::script::{collect_applied_scripts, find_declared_repository_urls, normalize_path, DslFlavor};
use crate::sources::{collect_properties, GradleEnvironment, PropertyMap};

const PROJECT_SCRIPTS: [&str; 4] = [
    "build.gradle.kts",
    "build.gradle",
    "settings.gradle.kts",
    "settings.gradle",
];
const BUILD_SCRIPTS: [&str; 2] = ["build.gradle.kts", "build.gradle"];
const INIT_SCRIPTS: [&str; 2] = ["init.gradle", "init.gradle.kts"];
const INIT_D_DIR: &str = "init.d";

const ROOT_DIR_PROP: &str = "rootDir";
const PROJECT_DIR_PROP: &str = "projectDir";
const VERSION_PROP: &str = "version";

/// Resolves the repository key a Gradle build in `working_dir` deploys to.
///
/// `explicit_repo_hint` short-circuits discovery when it names a repository (a bare key or
/// an Artifactory URL). `version` only decides between snapshot and release repositories.
/// Process environment and arguments are read via [`GradleEnvironment::from_process`].
pub fn resolve_deploy_repository(
    working_dir: impl AsRef<Path>,
    explicit_repo_hint: &str,
    version: &str,
) -> Result<String, RepoFinderError> {
    resolve_deploy_repository_with_env(
        working_dir.as_ref(),
        explicit_repo_hint,
        version,
        &GradleEnvironment::from_process(),
    )
}

/// [`resolve_deploy_repository`] against an explicit process snapshot.
pub fn resolve_deploy_repository_with_env(
    working_dir: &Path,
    explicit_repo_hint: &str,
    version: &str,
    env: &GradleEnvironment,
) -> Result<String, RepoFinderError> {
    validate_working_dir(working_dir)?;
    let working_dir = &absolute_dir(working_dir)?;

    if !explicit_repo_hint.trim().is_empty() {
        match extract_repo_key_candidate(explicit_repo_hint) {
            Some(key) => {
                tracing::debug!(
                    target: "flexpack.gradle.finder",
                    repository = %key,
                    "using explicit repository"
                );
                return Ok(key);
            }
            None => tracing::debug!(
                target: "flexpack.gradle.finder",
                hint = explicit_repo_hint,
                "explicit repository hint is not a repository key; discovering"
            ),
        }
    }

    let is_snapshot = is_snapshot_version(version);
    let props = project_properties(working_dir, env);

    for name in PROJECT_SCRIPTS {
        let path = working_dir.join(name);
        let Some(content) = read_script(&path) else {
            continue;
        };
        match find_repo_in_gradle_script(
            &content,
            DslFlavor::from_path(&path),
            &props,
            is_snapshot,
            &path,
            working_dir,
        ) {
            Ok(key) => return Ok(key),
            Err(err) => tracing::debug!(
                target: "flexpack.gradle.finder",
                path = %path.display(),
                error = %err,
                "no deploy repository in script"
            ),
        }
    }

    match env.gradle_user_home() {
        Some(home) => match check_init_scripts(&home, is_snapshot, &props) {
            Ok(key) => return Ok(key),
            Err(err) => tracing::debug!(
                target: "flexpack.gradle.finder",
                gradle_user_home = %home.display(),
                error = %err,
                "no deploy repository in init scripts"
            ),
        },
        None => tracing::debug!(
            target: "flexpack.gradle.finder",
            "no gradle user home; skipping init scripts"
        ),
    }

    find_repo_in_properties(&props, is_snapshot)
}

/// Merged project properties plus `rootDir`/`projectDir` pointing at `working_dir` unless
/// already defined.
#[must_use]
pub fn project_properties(working_dir: &Path, env: &GradleEnvironment) -> PropertyMap {
    let mut props = collect_properties(working_dir, env);
    let dir = working_dir.to_string_lossy();
    props.insert_if_absent(ROOT_DIR_PROP, dir.as_ref());
    props.insert_if_absent(PROJECT_DIR_PROP, dir.as_ref());
    props
}

fn validate_working_dir(working_dir: &Path) -> Result<(), RepoFinderError> {
    if working_dir.as_os_str().is_empty() {
        return Err(RepoFinderError::EmptyWorkingDirectory);
    }

    let metadata = std::fs::metadata(working_dir).map_err(|source| RepoFinderError::Io {
        path: working_dir.to_path_buf(),
        source,
    })?;
    if !metadata.is_dir() {
        return Err(RepoFinderError::NotADirectory {
            path: working_dir.to_path_buf(),
        });
    }

    // Listing catches directories we can stat but not read.
    std::fs::read_dir(working_dir).map_err(|source| RepoFinderError::Io {
        path: working_dir.to_path_buf(),
        source,
    })?;
    Ok(())
}

/// `working_dir` as an absolute, lexically normalized path.
fn absolute_dir(working_dir: &Path) -> Result<PathBuf, RepoFinderError> {
    let absolute = std::path::absolute(working_dir).map_err(|source| RepoFinderError::Io {
        path: working_dir.to_path_buf(),
        source,
    })?;
    Ok(normalize_path(&absolute).unwrap_or(absolute))
}

fn read_script(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            tracing::debug!(
                target: "flexpack.gradle.finder",
                path = %path.display(),
                error = %err,
                "skipping unreadable script"
            );
            None
        }
    }
}

/// Finds the deploy repository declared by a script, following `apply from` includes.
///
/// `script_path` locates relatively applied scripts; applied scripts outside of `root` are
/// ignored. URLs declared by the script itself come before those of scripts it applies; each
/// script sees its own `ext` properties layered over `props`.
pub fn find_repo_in_gradle_script(
    content: &str,
    flavor: DslFlavor,
    props: &PropertyMap,
    is_snapshot: bool,
    script_path: &Path,
    root: &Path,
) -> Result<String, RepoFinderError> {
    let root = normalize_path(root).unwrap_or_else(|| root.to_path_buf());
    let mut visited = BTreeSet::new();
    let mut urls = Vec::new();
    collect_script_urls(
        content,
        flavor,
        props,
        script_path,
        &root,
        &mut visited,
        &mut urls,
    );
    find_repository_key_from_matches(&urls, &script_path.display().to_string(), is_snapshot)
}

fn collect_script_urls(
    content: &str,
    flavor: DslFlavor,
    inherited: &PropertyMap,
    script_path: &Path,
    root: &Path,
    visited: &mut BTreeSet<PathBuf>,
    urls: &mut Vec<String>,
) {
    let key = normalize_path(script_path).unwrap_or_else(|| script_path.to_path_buf());
    if !visited.insert(key) {
        tracing::debug!(
            target: "flexpack.gradle.script",
            path = %script_path.display(),
            "script already visited"
        );
        return;
    }

    let mut props = inherited.clone();
    props.merge(extract_properties_from_script(content));

    urls.extend(
        find_declared_repository_urls(content, flavor)
            .iter()
            .map(|raw| resolve_property(raw, &props)),
    );

    for applied in collect_applied_scripts(content, flavor, &props, script_path, root) {
        if visited.contains(&applied) {
            tracing::debug!(
                target: "flexpack.gradle.script",
                path = %applied.display(),
                "skipping cyclic apply from"
            );
            continue;
        }
        let Some(applied_content) = read_script(&applied) else {
            tracing::debug!(
                target: "flexpack.gradle.script",
                path = %applied.display(),
                "applied script not found"
            );
            continue;
        };
        collect_script_urls(
            &applied_content,
            DslFlavor::from_path(&applied),
            &props,
            &applied,
            root,
            visited,
            urls,
        );
    }
}

/// Looks for a deploy repository in the init scripts of `gradle_user_home`.
///
/// `init.gradle` is checked first, then `init.gradle.kts`, then `init.d/*.gradle` and
/// `init.d/*.gradle.kts`, where the alphabetically last script takes precedence.
pub fn check_init_scripts(
    gradle_user_home: &Path,
    is_snapshot: bool,
    props: &PropertyMap,
) -> Result<String, RepoFinderError> {
    let mut scripts: Vec<PathBuf> = INIT_SCRIPTS
        .iter()
        .map(|name| gradle_user_home.join(name))
        .collect();
    scripts.extend(init_d_scripts(&gradle_user_home.join(INIT_D_DIR)));

    for path in scripts {
        let Some(content) = read_script(&path) else {
            continue;
        };
        match find_repo_in_gradle_script(
            &content,
            DslFlavor::from_path(&path),
            props,
            is_snapshot,
            &path,
            gradle_user_home,
        ) {
            Ok(key) => return Ok(key),
            Err(err) => tracing::debug!(
                target: "flexpack.gradle.finder",
                path = %path.display(),
                error = %err,
                "no deploy repository in init script"
            ),
        }
    }

    Err(RepoFinderError::NoRepositoryFound)
}

/// `init.d` scripts ordered so the alphabetically last one comes first.
fn init_d_scripts(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }

    let mut scripts: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(err) => {
                tracing::debug!(
                    target: "flexpack.gradle.finder",
                    error = %err,
                    "skipping init.d entry"
                );
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            name.ends_with(".gradle") || name.ends_with(".gradle.kts")
        })
        .map(walkdir::DirEntry::into_path)
        .collect();
    scripts.reverse();
    scripts
}

/// Snapshot versions contain `snapshot` in any case (`1.0.0-SNAPSHOT`, `1.0-snapshot-2`).
#[must_use]
pub fn is_snapshot_version(version: &str) -> bool {
    version.to_ascii_lowercase().contains("snapshot")
}

fn version_assignment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"(?m)^\s*version\s*=\s*['"]([^'"]+)['"]"#).expect("valid regex")
    })
}

/// The project version: the `version` property if set, else the first
/// `version = "..."` assignment in `build.gradle.kts` or `build.gradle`.
#[must_use]
pub fn detect_project_version(working_dir: &Path, props: &PropertyMap) -> Option<String> {
    if let Some(version) = props.get(VERSION_PROP) {
        return Some(version.to_string());
    }

    BUILD_SCRIPTS.iter().find_map(|name| {
        let content = read_script(&working_dir.join(name))?;
        let caps = version_assignment_re().captures(&content)?;
        Some(caps[1].to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const PUBLISH_GROOVY: &str = r#"
        publishing {
            repositories {
                maven {
                    url "http://localhost:8081/artifactory/libs-release"
                }
            }
        }
    "#;

    fn props(pairs: &[(&str, &str)]) -> PropertyMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn finds_repository_in_script_content() {
        let (path, root) = (Path::new("/project/test.gradle"), Path::new("/project"));
        assert_eq!(
            find_repo_in_gradle_script(
                PUBLISH_GROOVY,
                DslFlavor::Groovy,
                &PropertyMap::new(),
                false,
                path,
                root
            )
            .unwrap(),
            "libs-release"
        );

        let kotlin = r#"
            publishing {
                repositories {
                    maven {
                        url = uri("http://localhost:8081/artifactory/libs-release")
                    }
                }
            }
        "#;
        assert_eq!(
            find_repo_in_gradle_script(
                kotlin,
                DslFlavor::Kotlin,
                &PropertyMap::new(),
                false,
                path,
                root
            )
            .unwrap(),
            "libs-release"
        );
    }

    #[test]
    fn script_urls_resolve_inherited_and_ext_properties() {
        let (path, root) = (Path::new("/project/test.gradle"), Path::new("/project"));
        let templated = r#"
            publishing {
                repositories {
                    maven {
                        url "${artifactoryUrl}/libs-release"
                    }
                }
            }
        "#;
        let inherited = props(&[("artifactoryUrl", "http://localhost:8081/artifactory")]);
        assert_eq!(
            find_repo_in_gradle_script(
                templated,
                DslFlavor::Groovy,
                &inherited,
                false,
                path,
                root
            )
            .unwrap(),
            "libs-release"
        );

        let with_ext = r#"
            ext {
                artifactoryUrl = "http://localhost:8081/artifactory"
            }
            publishing {
                repositories {
                    maven {
                        url "${artifactoryUrl}/libs-snapshot"
                    }
                }
            }
        "#;
        assert_eq!(
            find_repo_in_gradle_script(
                with_ext,
                DslFlavor::Groovy,
                &PropertyMap::new(),
                true,
                path,
                root
            )
            .unwrap(),
            "libs-snapshot"
        );

        // Script-defined values override inherited ones.
        let inherited = props(&[("artifactoryUrl", "http://elsewhere/artifactory/other")]);
        assert_eq!(
            find_repo_in_gradle_script(with_ext, DslFlavor::Groovy, &inherited, true, path, root)
                .unwrap(),
            "libs-snapshot"
        );
    }

    #[test]
    fn scripts_without_usable_urls_fail() {
        let (path, root) = (Path::new("/project/test.gradle"), Path::new("/project"));
        let none = PropertyMap::new();

        let no_publishing = "dependencies {\n    implementation \"com.example:lib:1.0\"\n}";
        assert!(matches!(
            find_repo_in_gradle_script(no_publishing, DslFlavor::Groovy, &none, false, path, root),
            Err(RepoFinderError::NoRepositoryFound)
        ));

        let unresolved = r#"
            publishing {
                repositories {
                    maven { url "${unknownProp}/libs-release" }
                }
            }
        "#;
        assert!(
            find_repo_in_gradle_script(unresolved, DslFlavor::Groovy, &none, false, path, root)
                .is_err()
        );
    }

    #[test]
    fn snapshot_versions() {
        for version in ["1.0.0-SNAPSHOT", "1.0.0-snapshot", "1.0.0-SNAPSHOT-1", "SnapShot"] {
            assert!(is_snapshot_version(version), "{version}");
        }
        for version in ["1.0.0", "1.0.0-RC1", "1.0.0.RELEASE", ""] {
            assert!(!is_snapshot_version(version), "{version}");
        }
    }

    fn write(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn init_scripts_precedence() {
        let home = tempfile::tempdir().unwrap();
        let none = PropertyMap::new();
        let repo_script = |key: &str| PUBLISH_GROOVY.replace("libs-release", key);

        let err = check_init_scripts(home.path(), false, &none).unwrap_err();
        assert!(err.to_string().contains("no repository found"));

        write(&home.path().join("init.d/a-script.gradle"), &repo_script("a-repo"));
        write(&home.path().join("init.d/z-script.gradle"), &repo_script("z-repo"));
        write(&home.path().join("init.d/notes.txt"), &repo_script("txt-repo"));
        assert_eq!(check_init_scripts(home.path(), false, &none).unwrap(), "z-repo");

        write(
            &home.path().join("init.gradle.kts"),
            &repo_script("kts-repo").replace("url \"", "url = uri(\"").replace("\"\n", "\")\n"),
        );
        assert_eq!(check_init_scripts(home.path(), false, &none).unwrap(), "kts-repo");

        write(&home.path().join("init.gradle"), &repo_script("init-gradle-repo"));
        assert_eq!(
            check_init_scripts(home.path(), false, &none).unwrap(),
            "init-gradle-repo"
        );
    }

    #[test]
    fn init_scripts_apply_scripts_inside_the_user_home() {
        let parent = tempfile::tempdir().unwrap();
        let home = parent.path().join("gradle-home");
        let none = PropertyMap::new();
        let repo_script = |key: &str| PUBLISH_GROOVY.replace("libs-release", key);

        write(
            &home.join("init.d/publish.gradle"),
            "apply from: \"../shared.gradle\"\napply from: \"../../escaped.gradle\"\n",
        );
        write(&parent.path().join("escaped.gradle"), &repo_script("escaped-repo"));
        assert!(check_init_scripts(&home, false, &none).is_err());

        write(&home.join("shared.gradle"), &repo_script("shared-repo"));
        assert_eq!(check_init_scripts(&home, false, &none).unwrap(), "shared-repo");
    }

    #[test]
    fn init_script_selection_honors_snapshot() {
        let home = tempfile::tempdir().unwrap();
        write(
            &home.path().join("init.gradle"),
            r#"
            publishing {
                repositories {
                    maven { url "http://localhost:8081/artifactory/libs-snapshot" }
                    maven { url "http://localhost:8081/artifactory/libs-release" }
                }
            }
            "#,
        );
        assert_eq!(
            check_init_scripts(home.path(), true, &PropertyMap::new()).unwrap(),
            "libs-snapshot"
        );
    }

    #[test]
    fn detects_project_version() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(detect_project_version(dir.path(), &PropertyMap::new()), None);

        write(
            &dir.path().join("build.gradle"),
            "plugins { id 'java' }\n\ngroup = 'com.example'\nversion = '2.1.0-SNAPSHOT'\n",
        );
        assert_eq!(
            detect_project_version(dir.path(), &PropertyMap::new()).as_deref(),
            Some("2.1.0-SNAPSHOT")
        );

        assert_eq!(
            detect_project_version(dir.path(), &props(&[("version", "3.0.0")])).as_deref(),
            Some("3.0.0")
        );
    }

    #[test]
    fn project_properties_define_root_dir() {
        let dir = tempfile::tempdir().unwrap();
        let env = GradleEnvironment::default();
        let props = project_properties(dir.path(), &env);
        let expected = dir.path().to_string_lossy();
        assert_eq!(props.get("rootDir"), Some(expected.as_ref()));
        assert_eq!(props.get("projectDir"), Some(expected.as_ref()));

        let env = GradleEnvironment::default().with_var("ORG_GRADLE_PROJECT_rootDir", "/custom");
        assert_eq!(project_properties(dir.path(), &env).get("rootDir"), Some("/custom"));
    }
}
