use thiserror::Error;

/// Unified error type for treeflow operations
#[derive(Error, Debug)]
pub enum TreeflowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Working tree at '{0}' has uncommitted changes; commit or stash them first")]
    DirtyWorkingTree(String),

    #[error("Merge of '{branch}' reported conflicts")]
    MergeConflict { branch: String },

    #[error("git {command} failed with status {status}: {stderr}")]
    GitCommand {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("State key '{key}' holds a {found} where a {expected} was expected")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience type alias for Results in treeflow
pub type Result<T> = std::result::Result<T, TreeflowError>;

impl TreeflowError {
    /// Create a validation error with context
    pub fn validation(msg: impl Into<String>) -> Self {
        TreeflowError::Validation(msg.into())
    }

    /// Create a not-found error for a named thing of the given kind
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        TreeflowError::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a dirty-working-tree error for the given checkout path
    pub fn dirty(path: impl Into<String>) -> Self {
        TreeflowError::DirtyWorkingTree(path.into())
    }

    /// Create a merge-conflict error for the named work branch
    pub fn conflict(branch: impl Into<String>) -> Self {
        TreeflowError::MergeConflict {
            branch: branch.into(),
        }
    }
}

impl From<toml::de::Error> for TreeflowError {
    fn from(err: toml::de::Error) -> Self {
        TreeflowError::Serialization(err.to_string())
    }
}

impl From<toml::ser::Error> for TreeflowError {
    fn from(err: toml::ser::Error) -> Self {
        TreeflowError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TreeflowError::validation("bad document");
        assert_eq!(err.to_string(), "Validation error: bad document");
    }

    #[test]
    fn test_not_found_display() {
        let err = TreeflowError::not_found("feature", "checkout-flow");
        assert_eq!(err.to_string(), "feature 'checkout-flow' not found");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: TreeflowError = io_err.into();
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_dirty_mentions_stash() {
        let err = TreeflowError::dirty("/work/repo");
        assert!(err.to_string().contains("stash"));
        assert!(err.to_string().contains("/work/repo"));
    }

    #[test]
    fn test_type_mismatch_display() {
        let err = TreeflowError::TypeMismatch {
            key: "feature/x/closing/develop".to_string(),
            expected: "boolean",
            found: "string",
        };
        let msg = err.to_string();
        assert!(msg.contains("boolean"));
        assert!(msg.contains("string"));
    }

    #[test]
    fn test_git_command_display() {
        let err = TreeflowError::GitCommand {
            command: "merge --squash feature/x".to_string(),
            status: 128,
            stderr: "fatal: not a git repository".to_string(),
        };
        assert!(err.to_string().contains("128"));
        assert!(err.to_string().contains("merge --squash"));
    }
}
