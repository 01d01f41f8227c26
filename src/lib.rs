//! Branch-based release workflow across a tree of nested repositories.
//!
//! A tree of git checkouts is described by per-repository configuration
//! documents, loaded into a registered node tree. Work lines (features,
//! releases, hotfixes, support lineages) are addressed by `type://value`
//! URIs, selected in batches by glob filters, and opened and closed through
//! a resumable workflow whose progress is persisted next to each checkout.
//!
//! Modules:
//! - [config]: configuration documents, registered nodes, work entities
//! - [address]: URI parsing and element/artifact resolution
//! - [filter]: glob-based node selection for batch operations
//! - [state]: per-node persisted workflow state
//! - [git]: the gateway trait plus process-backed and mock implementations
//! - [workflow]: start/close/status drivers over the filtered node set
//! - [ui]: console output and confirmation prompts

pub mod address;
pub mod config;
pub mod error;
pub mod filter;
pub mod git;
pub mod state;
pub mod ui;
pub mod workflow;

pub use error::{Result, TreeflowError};
