/// Orchestration error taxonomy.
///
/// `Validation`, `NotFound` and `Conflict` are caller mistakes and are never
/// retried internally. `Dependency` wraps a failed call into an external
/// collaborator (container runtime, reverse proxy, firewall) with the
/// operation that failed; the caller decides whether to retry the whole
/// operation. Errors raised during a cleanup pass are logged and swallowed at
/// the call site, they never surface through this type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("{system} failed during {operation}: {source}")]
    Dependency {
        system: &'static str,
        operation: &'static str,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Db(#[from] sqlx::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn dependency(
        system: &'static str,
        operation: &'static str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        Self::Dependency {
            system,
            operation,
            source: source.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
