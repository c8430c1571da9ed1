//! Static discovery of the repository a Gradle build publishes to.
//!
//! Nothing here runs Gradle. Build scripts, init scripts and property sources are read from
//! disk and scanned:
//! - property collection with Gradle's precedence ([`collect_properties`])
//! - `${...}` / `$name` interpolation ([`resolve_property`])
//! - brace-aware block extraction ([`find_all_blocks`])
//! - repository key extraction and snapshot/release selection
//! - the end-to-end lookup ([`resolve_deploy_repository`])

mod block;
mod error;
mod finder;
mod interpolate;
mod repo_key;
mod script;
mod sources;
mod tasks;

pub use block::{find_all_blocks, find_next_block};
pub use error::RepoFinderError;
pub use finder::{
    check_init_scripts, detect_project_version, find_repo_in_gradle_script,
    is_snapshot_version, project_properties, resolve_deploy_repository,
    resolve_deploy_repository_with_env,
};
pub use interpolate::{extract_properties_from_script, resolve_property};
pub use repo_key::{
    extract_repo_key_candidate, extract_repo_key_from_url, find_repo_in_properties,
    find_repository_key_from_matches, select_best_repository,
};
pub use script::{collect_applied_scripts, find_declared_repository_urls, DslFlavor};
pub use sources::{
    collect_properties, parse_properties_from_args, parse_properties_from_opts,
    read_properties_file, remove_quotes, split_args_respecting_quotes, GradleEnvironment,
    PropertyMap,
};
pub use tasks::{gradle_tasks, is_publish_invocation};
