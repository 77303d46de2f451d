use crate::Kind;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Errors returned by every storage backend.
///
/// Callers branch on the variant (or on the `is_*` predicates) rather than on messages so that
/// idempotent creates and reconcile loops can tell a collision from a missing item.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("{kind} {name:?} already exists")]
    AlreadyExists { kind: Kind, name: String },

    #[error("{kind} {name:?} not found")]
    NotFound { kind: Kind, name: String },

    #[error("{kind} {name:?}: resource version {provided:?} is stale")]
    VersionConflict {
        kind: Kind,
        name: String,
        provided: String,
        /// The stored version, when the backend exposes it.
        current: Option<String>,
    },

    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{context}: {source}")]
    Backend {
        context: String,
        #[source]
        source: BoxError,
    },
}

// === impl Error ===

impl Error {
    pub fn already_exists(kind: Kind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn not_found(kind: Kind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn conflict(
        kind: Kind,
        name: impl Into<String>,
        provided: impl Into<String>,
        current: Option<String>,
    ) -> Self {
        Self::VersionConflict {
            kind,
            name: name.into(),
            provided: provided.into(),
            current,
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn backend(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Backend {
            context: context.into(),
            source: source.into(),
        }
    }

    #[inline]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::VersionConflict { .. })
    }

    #[inline]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}
