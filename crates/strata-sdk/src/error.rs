//! Error types shared by the loader, the reflection caches and native libraries

/// Result type for every fallible loader operation
pub type LoadResult<T> = Result<T, LoadError>;

/// Loader error taxonomy
///
/// `NotFound` is the only expected, recoverable outcome; a caller may try
/// another loader or search path. Every other variant is fatal to the single
/// operation that produced it and leaves unrelated keys untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LoadError {
    /// Name or member absent anywhere in the searched graph
    #[error("Not found: {name}")]
    NotFound {
        /// The name that was looked up
        name: String,
    },

    /// Raw metadata could not be parsed
    #[error("Malformed metadata in {context}: {reason}")]
    Format {
        /// What was being parsed (type name, blob kind)
        context: String,
        /// Decoder diagnostic
        reason: String,
    },

    /// Conflicting ownership of a name or a native library
    #[error("Duplicate definition of {name}: {reason}")]
    DuplicateDefinition {
        /// Type, package or library identity
        name: String,
        /// Which owners conflicted
        reason: String,
    },

    /// The supertype graph or a definition request is inconsistent
    #[error("Linkage error in {name}: {reason}")]
    Linkage {
        /// Type being defined or linked
        name: String,
        /// What went wrong
        reason: String,
    },

    /// The access policy or a reserved namespace rejected the request
    #[error("Access denied: {0}")]
    Security(String),

    /// The host failed to load a native library
    #[error("Native library {name} failed to load: {reason}")]
    NativeLoad {
        /// Canonical library identity
        name: String,
        /// Host diagnostic
        reason: String,
    },

    /// An internal invariant was violated
    #[error("Internal consistency violated: {0}")]
    InternalConsistency(String),
}

impl LoadError {
    /// Create a `NotFound` error
    pub fn not_found(name: impl Into<String>) -> Self {
        LoadError::NotFound { name: name.into() }
    }

    /// Create a `Format` error
    pub fn format(context: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::Format {
            context: context.into(),
            reason: reason.into(),
        }
    }

    /// Create a `DuplicateDefinition` error
    pub fn duplicate(name: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::DuplicateDefinition {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a `Linkage` error
    pub fn linkage(name: impl Into<String>, reason: impl Into<String>) -> Self {
        LoadError::Linkage {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this is the ordinary "not found" outcome
    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_recoverable() {
        assert!(LoadError::not_found("pkg.Widget").is_not_found());
        assert!(!LoadError::format("pkg.Widget", "truncated").is_not_found());
        assert!(!LoadError::Security("denied".to_string()).is_not_found());
    }

    #[test]
    fn test_error_display() {
        let err = LoadError::duplicate("libfoo.so", "owned by loader 3");
        assert_eq!(
            err.to_string(),
            "Duplicate definition of libfoo.so: owned by loader 3"
        );

        let err = LoadError::not_found("pkg.Widget");
        assert_eq!(err.to_string(), "Not found: pkg.Widget");
    }
}
