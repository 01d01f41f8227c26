//! Git gateway abstraction.
//!
//! All git access goes through the [GitGateway] trait so the workflow logic
//! never touches the external tool directly. Implementations:
//!
//! - [process::ProcessGit]: shells out to the `git` binary
//! - [mock::MockGit]: scriptable in-memory gateway for tests

pub mod mock;
pub mod process;

pub use mock::{MockGit, MockGitFactory};
pub use process::{ProcessGit, ProcessGitFactory};

use crate::error::Result;
use std::path::Path;

/// Options for merging a work branch into the current branch.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    pub squash: bool,
    pub no_commit: bool,
    pub message: Option<String>,
    pub strategy: Option<String>,
}

impl MergeOptions {
    /// The squashed, uncommitted merge the close workflow performs.
    pub fn squashed() -> Self {
        MergeOptions {
            squash: true,
            no_commit: true,
            message: None,
            strategy: None,
        }
    }
}

/// Options for tag creation.
#[derive(Debug, Clone, Default)]
pub struct TagOptions {
    pub source: Option<String>,
    pub annotation: Option<String>,
}

impl TagOptions {
    pub fn annotated(annotation: impl Into<String>) -> Self {
        TagOptions {
            source: None,
            annotation: Some(annotation.into()),
        }
    }
}

/// Git operations against one node's working directory.
///
/// Mutating operations honor the gateway's dry-run mode by logging the
/// would-be command and doing nothing; read-only queries always execute so
/// command flow stays consistent. Boolean queries map a nonzero exit of the
/// underlying tool to `false` rather than an error; everything else
/// surfaces a [crate::error::TreeflowError::GitCommand].
pub trait GitGateway {
    fn checkout_branch(&self, name: &str) -> Result<()>;

    /// Create a branch, optionally from a source ref instead of HEAD.
    fn create_branch(&self, name: &str, source: Option<&str>) -> Result<()>;

    fn delete_branch(&self, name: &str) -> Result<()>;

    fn branch_exists(&self, name: &str) -> Result<bool>;

    fn remote_branch_exists(&self, name: &str, upstream: &str) -> Result<bool>;

    /// Merge `name` into the current branch. Reports a detected conflict as
    /// [crate::error::TreeflowError::MergeConflict].
    fn merge(&self, name: &str, options: &MergeOptions) -> Result<()>;

    fn abort_merge(&self) -> Result<()>;

    fn reset_merge(&self) -> Result<()>;

    fn tag(&self, name: &str, options: &TagOptions) -> Result<()>;

    fn commit(&self, message: &str, amend: bool) -> Result<()>;

    fn fetch(&self) -> Result<()>;

    fn is_dirty(&self) -> Result<bool>;

    fn has_staged_changes(&self) -> Result<bool>;

    fn is_merge_in_progress(&self) -> Result<bool>;

    fn current_branch(&self) -> Result<String>;

    fn resolve_commit_sha(&self, refname: &str) -> Result<String>;

    fn upstream_exists(&self, name: &str) -> Result<bool>;
}

/// Opens a gateway for a node's working directory. Batch operations visit
/// many nodes, each with its own checkout, so gateways are created per node.
pub trait GatewayFactory {
    fn open(&self, workdir: &Path) -> Result<Box<dyn GitGateway>>;
}
