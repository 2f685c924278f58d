use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors that can occur when building the stylesheet bundle.
#[derive(Debug, Error)]
pub enum StyleError {
    /// One of the input stylesheets does not exist.
    #[error("Stylesheet '{0}' not found")]
    FileNotFound(Utf8PathBuf),

    /// The minifier rejected one of the units.
    #[error("Failed to minify '{unit}':\n{source}")]
    BuildFailure {
        unit: Utf8PathBuf,
        #[source]
        source: Box<grass::Error>,
    },

    /// An I/O error occurred while reading inputs or writing the output.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking build job was cancelled or panicked.
    #[error("Style build job failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Errors that can occur when bundling the script entry point.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The entry point or one of its imports could not be resolved.
    #[error("Resolution error: {0}")]
    Resolution(Diagnostic),

    /// A source unit in the module graph is malformed.
    #[error("Parse error: {0}")]
    Parse(Diagnostic),

    /// The bundler executable could not be started.
    #[error("Bundler '{0}' is not available: {1}")]
    BundlerUnavailable(String, std::io::Error),

    /// The bundler failed without reporting a diagnostic.
    #[error("Bundler failed:\n{0}")]
    Bundler(String),

    /// An I/O error occurred while writing the bundle.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking write job was cancelled or panicked.
    #[error("Script write job failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A single message reported by the bundler, with its source location if known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub message: String,
    pub location: Option<String>,
}

impl Diagnostic {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{} ({})", self.message, location),
            None => write!(f, "{}", self.message),
        }
    }
}

/// Errors raised while wiring up the task graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task '{0}' not found")]
    UnknownTask(String),

    #[error("Task '{0}' is already defined")]
    DuplicateTask(String),

    #[error("Cycle detected in task graph at '{0}'")]
    Cycle(String),
}

/// Errors raised while executing the task graph.
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("Task '{name}':\n{source}")]
    Task {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Task '{0}' panicked")]
    Panicked(String),
}

#[cfg(feature = "live")]
#[derive(Debug, Error)]
pub enum WatchError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Notify(#[from] notify::Error),

    #[error("Watch path '{path}' could not be resolved:\n{source}")]
    Resolve {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Couldn't read config file '{0}':\n{1}")]
    Read(Utf8PathBuf, std::io::Error),

    #[error("Couldn't parse config file '{0}':\n{1}")]
    Parse(Utf8PathBuf, toml::de::Error),
}
