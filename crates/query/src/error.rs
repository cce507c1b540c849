use keel_core::ConfigurationError;
use keel_registry::RegistryError;

/// Evaluation failures. Everything here aborts the whole evaluation.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("unknown shortcut: {0}")]
    UnknownShortcut(String),
    #[error("cyclic shortcut: {}", .0.join(" -> "))]
    CyclicShortcut(Vec<String>),
    #[error("shortcut {name} expects {expected} argument(s), got {got}")]
    ShortcutArity { name: String, expected: usize, got: usize },
    #[error("registry query failed: {0:#}")]
    Upstream(#[source] anyhow::Error),
    #[error("{stage} callback failed: {source:#}")]
    Mapper {
        stage: &'static str,
        #[source]
        source: anyhow::Error,
    },
}

impl From<RegistryError> for QueryError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::Configuration(c) => QueryError::Configuration(c),
            RegistryError::Upstream(u) => QueryError::Upstream(u),
        }
    }
}

pub type QueryResult<T> = Result<T, QueryError>;
