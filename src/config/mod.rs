//! Hierarchical workflow configuration: one document per repository, loaded
//! recursively into a tree of registered nodes.

pub mod document;
pub mod entities;
pub mod node;

pub use document::ConfigDocument;
pub use entities::{EntityKind, Feature, Hotfix, Release, Support, Upstream};
pub use node::{ConfigNode, Submodule};

/// Filename of the per-node configuration document.
pub const CONFIG_FILE: &str = ".treeflow.toml";

/// Filename of the per-node workflow state document.
pub const STATE_FILE: &str = ".treeflow-state.toml";

/// Branch holding released history on every node.
pub const MASTER_BRANCH: &str = "master";

/// Integration branch on every node.
pub const DEVELOP_BRANCH: &str = "develop";

/// Pathspec of the tree root.
pub const ROOT_PATHSPEC: &str = "root";
