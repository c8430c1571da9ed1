//! Inspecting a Gradle command line for publishing tasks.

/// Options whose value is passed as the following argument (`-p subdir`).
const OPTIONS_WITH_VALUE: &[&str] = &[
    "-b",
    "--build-file",
    "-c",
    "--settings-file",
    "-p",
    "--project-dir",
    "-g",
    "--gradle-user-home",
    "-I",
    "--init-script",
    "-x",
    "--exclude-task",
    "--project-cache-dir",
    "--include-build",
    "--console",
    "--warning-mode",
    "--max-workers",
    "-P",
    "-D",
];

/// Task names from a Gradle argument list, skipping options and their values.
#[must_use]
pub fn gradle_tasks<S: AsRef<str>>(args: &[S]) -> Vec<String> {
    let mut tasks = Vec::new();
    let mut args = args.iter().map(|arg| arg.as_ref());
    while let Some(arg) = args.next() {
        let arg = arg.trim();
        if arg.is_empty() {
            continue;
        }
        if arg.starts_with('-') {
            if OPTIONS_WITH_VALUE.contains(&arg) {
                args.next();
            }
            continue;
        }
        tasks.push(arg.to_string());
    }
    tasks
}

/// Whether running `tasks` publishes to a remote repository.
///
/// A task publishes when its name (after the last `:` project path separator) is `publish`,
/// or starts with `publish`, targets a repository (`...To...`) and is not a local
/// publication such as `publishToMavenLocal`. Matching is case-sensitive.
#[must_use]
pub fn is_publish_invocation<S: AsRef<str>>(tasks: &[S]) -> bool {
    tasks.iter().any(|task| is_publish_task(task.as_ref()))
}

fn is_publish_task(task: &str) -> bool {
    let name = task.rsplit(':').next().unwrap_or(task);
    if name == "publish" {
        return true;
    }
    name.starts_with("publish") && name.contains("To") && !name.ends_with("Local")
}
