use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum RepoFinderError {
    #[error("working directory is empty")]
    EmptyWorkingDirectory,

    #[error("{} is not a directory", path.display())]
    NotADirectory { path: PathBuf },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid repository URL `{url}`: {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("no repository found")]
    NoRepositoryFound,
}

impl RepoFinderError {
    pub(crate) fn invalid_url(url: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRepositoryUrl {
            url: url.to_string(),
            reason: reason.into(),
        }
    }
}
