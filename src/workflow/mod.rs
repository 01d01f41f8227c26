//! Batch drivers over the filtered node set.
//!
//! Every operation runs per node with failures isolated: one node's error is
//! reported and recorded, and the batch moves on to the next node. Nodes
//! with nothing to do are skipped, not failed.

pub mod close;
pub mod start;

pub use close::{close_entity, CloseOptions, CloseOutcome, ACTIVE_CLOSING_KEY};
pub use start::{remove_support_line, start_entity, StartOptions};

use crate::address::{resolve_artifact_from_branch, Uri};
use crate::config::ConfigNode;
use crate::error::{Result, TreeflowError};
use crate::filter::{resolve_filtered_configs, FilterSpec};
use crate::git::GatewayFactory;
use crate::ui::{self, ConflictPrompt};

/// What happened on each node of a batch run.
#[derive(Debug, Default)]
pub struct BatchSummary {
    /// Pathspecs where the operation completed, with a short description.
    pub completed: Vec<(String, String)>,
    /// Pathspecs where there was nothing to do.
    pub skipped: Vec<String>,
    /// Pathspecs where the operation failed, with the error message.
    pub failed: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Pathspecs of the filtered node set, detached from the tree borrow so the
/// caller can mutate nodes one at a time.
fn filtered_pathspecs(
    root: &ConfigNode,
    filter: &FilterSpec,
    gateways: &dyn GatewayFactory,
) -> Result<Vec<String>> {
    Ok(resolve_filtered_configs(root, filter, gateways)?
        .into_iter()
        .map(|node| node.pathspec().to_string())
        .collect())
}

/// Close one entity on every filtered node.
///
/// With no URI, each node resumes (or skips) based on its own persisted
/// marker. A node that does not know the addressed entity is skipped rather
/// than failed; the tree is heterogeneous by design.
pub fn close_across(
    root: &mut ConfigNode,
    filter: &FilterSpec,
    uri: Option<&Uri>,
    gateways: &dyn GatewayFactory,
    prompt: &dyn ConflictPrompt,
    options: &CloseOptions,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    for pathspec in filtered_pathspecs(root, filter, gateways)? {
        let node = match root.node_at_mut(&pathspec) {
            Some(node) => node,
            None => continue,
        };
        let git = gateways.open(node.path())?;
        match close_entity(node, uri, git.as_ref(), prompt, options) {
            Ok(CloseOutcome::Closed { uri }) => {
                ui::display_success(&format!("{}: closed {}", pathspec, uri));
                summary.completed.push((pathspec, uri));
            }
            Ok(CloseOutcome::Nothing) => summary.skipped.push(pathspec),
            Err(TreeflowError::NotFound { .. }) => summary.skipped.push(pathspec),
            Err(err) => {
                ui::display_error(&format!("{}: {}", pathspec, err));
                summary.failed.push((pathspec, err.to_string()));
            }
        }
    }
    Ok(summary)
}

/// Start one entity on every filtered node.
pub fn start_across(
    root: &mut ConfigNode,
    filter: &FilterSpec,
    uri: &Uri,
    gateways: &dyn GatewayFactory,
    options: &StartOptions,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    for pathspec in filtered_pathspecs(root, filter, gateways)? {
        let node = match root.node_at_mut(&pathspec) {
            Some(node) => node,
            None => continue,
        };
        let git = gateways.open(node.path())?;
        match start_entity(node, uri, git.as_ref(), options) {
            Ok(branch) => {
                ui::display_success(&format!("{}: started {} on {}", pathspec, uri, branch));
                summary.completed.push((pathspec, branch));
            }
            Err(err) => {
                ui::display_error(&format!("{}: {}", pathspec, err));
                summary.failed.push((pathspec, err.to_string()));
            }
        }
    }
    Ok(summary)
}

/// Remove a support line from every filtered node that carries it.
pub fn remove_support_across(
    root: &mut ConfigNode,
    filter: &FilterSpec,
    name: &str,
    gateways: &dyn GatewayFactory,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    for pathspec in filtered_pathspecs(root, filter, gateways)? {
        let node = match root.node_at_mut(&pathspec) {
            Some(node) => node,
            None => continue,
        };
        match remove_support_line(node, name) {
            Ok(()) => {
                ui::display_success(&format!("{}: removed support '{}'", pathspec, name));
                summary.completed.push((pathspec, name.to_string()));
            }
            Err(TreeflowError::NotFound { .. }) => summary.skipped.push(pathspec),
            Err(err) => {
                ui::display_error(&format!("{}: {}", pathspec, err));
                summary.failed.push((pathspec, err.to_string()));
            }
        }
    }
    Ok(summary)
}

/// Print one status line per filtered node: pathspec, current branch, and
/// the branch's artifact classification.
pub fn report_status(
    root: &ConfigNode,
    filter: &FilterSpec,
    gateways: &dyn GatewayFactory,
) -> Result<()> {
    for node in resolve_filtered_configs(root, filter, gateways)? {
        let git = gateways.open(node.path())?;
        let branch = git.current_branch()?;
        let artifact = resolve_artifact_from_branch(node, &branch);
        ui::display_node_status(node.pathspec(), &branch, &artifact);
    }
    Ok(())
}
