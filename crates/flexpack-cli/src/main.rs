use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use flexpack_config::FlexpackConfig;
use flexpack_gradle::{
    collect_properties, detect_project_version, gradle_tasks, is_publish_invocation,
    is_snapshot_version, project_properties, resolve_deploy_repository_with_env,
    GradleEnvironment,
};
use serde::Serialize;

#[derive(Parser)]
#[command(
    name = "flexpack",
    version,
    about = "Find the repository a Gradle build deploys to, without running Gradle"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the deploy repository of a Gradle project
    DeployRepo(DeployRepoArgs),
    /// Print the merged Gradle project properties
    Properties(PropertiesArgs),
    /// Inspect a Gradle command line for publishing tasks
    Gradle(GradleArgs),
}

#[derive(Args)]
struct DeployRepoArgs {
    /// Gradle project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Repository key or URL to use instead of discovery
    #[arg(long)]
    repo: Option<String>,
    /// Project version; detected from the project when omitted
    #[arg(long)]
    project_version: Option<String>,
    /// Gradle user home (overrides config and GRADLE_USER_HOME)
    #[arg(long)]
    gradle_user_home: Option<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct PropertiesArgs {
    /// Gradle project directory (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,
    /// Gradle user home (overrides config and GRADLE_USER_HOME)
    #[arg(long)]
    gradle_user_home: Option<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct GradleArgs {
    /// Gradle project directory (defaults to current directory)
    #[arg(long, default_value = ".")]
    path: PathBuf,
    /// Gradle user home (overrides config and GRADLE_USER_HOME)
    #[arg(long)]
    gradle_user_home: Option<PathBuf>,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
    /// Gradle arguments, after `--`
    #[arg(last = true)]
    gradle_args: Vec<String>,
}

impl Command {
    fn project_dir(&self) -> &Path {
        match self {
            Command::DeployRepo(args) => &args.path,
            Command::Properties(args) => &args.path,
            Command::Gradle(args) => &args.path,
        }
    }
}

#[derive(Serialize)]
struct DeployRepoReport {
    repository: String,
    version: Option<String>,
    snapshot: bool,
}

#[derive(Serialize)]
struct GradleReport {
    tasks: Vec<String>,
    publish: bool,
    repository: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    let project_dir = cli.command.project_dir();
    let (config, config_path) = flexpack_config::load_for_workspace(project_dir)
        .with_context(|| format!("failed to load config for {}", project_dir.display()))?;
    flexpack_config::init_tracing(&config.logging);
    if let Some(path) = &config_path {
        tracing::debug!(target: "flexpack.cli", path = %path.display(), "loaded config");
    }

    match cli.command {
        Command::DeployRepo(args) => {
            let env = gradle_env(&config, args.gradle_user_home, &[]);
            let version = args.project_version.or_else(|| {
                detect_project_version(&args.path, &project_properties(&args.path, &env))
            });
            let repository = resolve_deploy_repository_with_env(
                &args.path,
                args.repo.as_deref().unwrap_or_default(),
                version.as_deref().unwrap_or_default(),
                &env,
            )
            .with_context(|| {
                format!(
                    "failed to resolve deploy repository for {}",
                    args.path.display()
                )
            })?;

            let report = DeployRepoReport {
                snapshot: version.as_deref().is_some_and(is_snapshot_version),
                repository,
                version,
            };
            if args.json {
                print_json(&report)?;
            } else {
                println!("{}", report.repository);
            }
            Ok(0)
        }
        Command::Properties(args) => {
            anyhow::ensure!(
                args.path.is_dir(),
                "{} is not a directory",
                args.path.display()
            );
            let env = gradle_env(&config, args.gradle_user_home, &[]);
            let props: BTreeMap<String, String> =
                collect_properties(&args.path, &env).into_inner();
            if args.json {
                print_json(&props)?;
            } else {
                for (key, value) in &props {
                    println!("{key}={value}");
                }
            }
            Ok(0)
        }
        Command::Gradle(args) => {
            let env = gradle_env(&config, args.gradle_user_home, &args.gradle_args);
            let tasks = gradle_tasks(args.gradle_args.as_slice());
            let publish = is_publish_invocation(tasks.as_slice());

            let repository = if publish {
                let version =
                    detect_project_version(&args.path, &project_properties(&args.path, &env));
                let key = resolve_deploy_repository_with_env(
                    &args.path,
                    "",
                    version.as_deref().unwrap_or_default(),
                    &env,
                )
                .with_context(|| {
                    format!(
                        "failed to resolve deploy repository for {}",
                        args.path.display()
                    )
                })?;
                Some(key)
            } else {
                None
            };

            let report = GradleReport {
                tasks,
                publish,
                repository,
            };
            if args.json {
                print_json(&report)?;
            } else {
                println!("tasks: {}", report.tasks.join(" "));
                println!("publish: {}", report.publish);
                if let Some(repository) = &report.repository {
                    println!("repository: {repository}");
                }
            }
            Ok(0)
        }
    }
}

/// The Gradle view of this process: its environment, the given Gradle arguments and the
/// user home from the command line or config.
fn gradle_env(
    config: &FlexpackConfig,
    gradle_user_home: Option<PathBuf>,
    gradle_args: &[String],
) -> GradleEnvironment {
    let env = GradleEnvironment::from_process().with_args(gradle_args.iter().cloned());
    match gradle_user_home.or_else(|| config.gradle.user_home.clone()) {
        Some(home) => env.with_gradle_user_home(home),
        None => env,
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}
