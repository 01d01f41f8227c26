//! The resumable close workflow.
//!
//! Closing a feature/release/hotfix merges its branch into the target
//! branch(es), tags releases and hotfixes, deletes the work branch and
//! removes the entity from its owning collection. Progress is persisted in
//! the node's state store so an interrupted close resumes where it stopped:
//!
//! - `active_closing` holds the URI of the entity currently mid-close;
//! - `<state_key>/closing/develop` and `<state_key>/closing/master` record
//!   completed merge stages.
//!
//! Any failure before finalization leaves those markers untouched.

use crate::address::Uri;
use crate::config::{ConfigNode, EntityKind, DEVELOP_BRANCH, MASTER_BRANCH};
use crate::error::{Result, TreeflowError};
use crate::git::{GitGateway, MergeOptions, TagOptions};
use crate::state::StateStore;
use crate::ui::{self, ConflictPrompt};

/// Node-scoped marker naming the entity currently mid-close.
pub const ACTIVE_CLOSING_KEY: &str = "active_closing";

#[derive(Debug, Clone, Default)]
pub struct CloseOptions {
    /// Skip the merge stages entirely and go straight to deletion.
    pub abort: bool,
    /// Skip the confirmation prompt.
    pub force: bool,
    /// Log mutations instead of performing them.
    pub dry_run: bool,
}

/// What a single-node close actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseOutcome {
    Closed { uri: String },
    /// No entity to close on this node (no URI given and no resume marker).
    Nothing,
}

/// Everything resolved up front about the entity being closed, owned so the
/// node stays free for mutation during finalization.
struct ClosePlan {
    kind: EntityKind,
    name: String,
    support: Option<String>,
    branch: String,
    state_key: String,
    /// develop, or the owning support's develop branch.
    develop_target: String,
    /// For releases and hotfixes: master, or the support's master branch.
    master_target: Option<String>,
    workdir: String,
}

impl ClosePlan {
    fn resolve(node: &ConfigNode, uri: &Uri) -> Result<ClosePlan> {
        let kind = uri.entity_kind().ok_or_else(|| {
            TreeflowError::validation(format!("'{}' is not a closable entity address", uri))
        })?;
        let (support_name, entity_name) = match uri {
            Uri::Feature { support, name }
            | Uri::Release { support, name }
            | Uri::Hotfix { support, name } => (support.clone(), name.clone()),
            _ => unreachable!("entity_kind filtered the remaining variants"),
        };

        let (develop_target, master_target) = match &support_name {
            Some(owner) => {
                let support = node
                    .support(owner)
                    .ok_or_else(|| TreeflowError::not_found("support", owner.clone()))?;
                (
                    support.develop_branch_name.clone(),
                    support.master_branch_name.clone(),
                )
            }
            None => (DEVELOP_BRANCH.to_string(), MASTER_BRANCH.to_string()),
        };
        let master_target = match kind {
            EntityKind::Feature => None,
            EntityKind::Release | EntityKind::Hotfix => Some(master_target),
        };

        let (branch, state_key) = match kind {
            EntityKind::Feature => lookup(
                node,
                kind,
                &support_name,
                &entity_name,
                |n, name| n.feature(name).map(|f| (f.branch_name.clone(), f.state_key())),
                |s, name| {
                    s.features
                        .iter()
                        .find(|f| f.name == name)
                        .map(|f| (f.branch_name.clone(), f.state_key()))
                },
            )?,
            EntityKind::Release => lookup(
                node,
                kind,
                &support_name,
                &entity_name,
                |n, name| n.release(name).map(|r| (r.branch_name.clone(), r.state_key())),
                |s, name| {
                    s.releases
                        .iter()
                        .find(|r| r.name == name)
                        .map(|r| (r.branch_name.clone(), r.state_key()))
                },
            )?,
            EntityKind::Hotfix => lookup(
                node,
                kind,
                &support_name,
                &entity_name,
                |n, name| n.hotfix(name).map(|h| (h.branch_name.clone(), h.state_key())),
                |s, name| {
                    s.hotfixes
                        .iter()
                        .find(|h| h.name == name)
                        .map(|h| (h.branch_name.clone(), h.state_key()))
                },
            )?,
        };

        Ok(ClosePlan {
            kind,
            name: entity_name,
            support: support_name,
            branch,
            state_key,
            develop_target,
            master_target,
            workdir: node.path().display().to_string(),
        })
    }
}

fn lookup(
    node: &ConfigNode,
    kind: EntityKind,
    support: &Option<String>,
    name: &str,
    on_node: impl Fn(&ConfigNode, &str) -> Option<(String, String)>,
    on_support: impl Fn(&crate::config::Support, &str) -> Option<(String, String)>,
) -> Result<(String, String)> {
    let found = match support {
        Some(owner) => {
            let support = node
                .support(owner)
                .ok_or_else(|| TreeflowError::not_found("support", owner.clone()))?;
            on_support(support, name)
        }
        None => on_node(node, name),
    };
    found.ok_or_else(|| TreeflowError::not_found(kind.as_str(), name))
}

/// Close one entity on one node.
///
/// With no URI, the node's `active_closing` marker decides what (if
/// anything) to resume. Completed merge stages are skipped on re-entry, so
/// the call is idempotent per stage.
pub fn close_entity(
    node: &mut ConfigNode,
    uri: Option<&Uri>,
    git: &dyn GitGateway,
    prompt: &dyn ConflictPrompt,
    options: &CloseOptions,
) -> Result<CloseOutcome> {
    let state = StateStore::for_node(node);

    let uri = match uri {
        Some(uri) => uri.clone(),
        None => match state.get_str(ACTIVE_CLOSING_KEY)? {
            Some(raw) => raw.parse()?,
            None => return Ok(CloseOutcome::Nothing),
        },
    };
    let plan = ClosePlan::resolve(node, &uri)?;

    if !options.force {
        let question = if options.abort {
            format!(
                "Abort and discard {} '{}' on {}?",
                plan.kind,
                plan.name,
                node.pathspec()
            )
        } else {
            format!("Close {} '{}' on {}?", plan.kind, plan.name, node.pathspec())
        };
        if !prompt.confirm(&question)? {
            return Err(TreeflowError::Cancelled);
        }
    }

    if !options.dry_run {
        state.set_str(ACTIVE_CLOSING_KEY, &uri.to_string())?;
    }

    if options.abort {
        // Discard whatever merge work is lying around before switching away
        if git.is_merge_in_progress()? {
            git.abort_merge()?;
        }
        if git.has_staged_changes()? {
            git.reset_merge()?;
        }
    } else {
        run_merge_stage(git, prompt, &state, &plan, "develop", &plan.develop_target, None, options)?;
        if let Some(master_target) = plan.master_target.clone() {
            let tag = plan.name.clone();
            run_merge_stage(
                git,
                prompt,
                &state,
                &plan,
                "master",
                &master_target,
                Some(&tag),
                options,
            )?;
        }
    }

    finalize(node, git, &state, &plan, &uri, options)?;
    Ok(CloseOutcome::Closed {
        uri: uri.to_string(),
    })
}

/// One merge stage: clean-tree guard, checkout, squashed merge with the
/// conflict retry loop, commit of the staged result, optional tag, and the
/// completion marker.
#[allow(clippy::too_many_arguments)]
fn run_merge_stage(
    git: &dyn GitGateway,
    prompt: &dyn ConflictPrompt,
    state: &StateStore,
    plan: &ClosePlan,
    stage: &str,
    target: &str,
    tag: Option<&str>,
    options: &CloseOptions,
) -> Result<()> {
    let marker = format!("{}/closing/{}", plan.state_key, stage);
    if state.get_bool(&marker)?.unwrap_or(false) {
        return Ok(());
    }

    if git.is_dirty()? {
        return Err(TreeflowError::dirty(plan.workdir.clone()));
    }
    git.checkout_branch(target)?;
    // Untracked state specific to the target branch can surface only now
    if git.is_dirty()? {
        return Err(TreeflowError::dirty(plan.workdir.clone()));
    }

    match git.merge(&plan.branch, &MergeOptions::squashed()) {
        Ok(()) => {}
        Err(TreeflowError::MergeConflict { .. }) => loop {
            let resolved = prompt.confirm(&format!(
                "Merging '{}' into '{}' hit conflicts. Resolved and staged?",
                plan.branch, target
            ))?;
            if !resolved {
                return Err(TreeflowError::Cancelled);
            }
            if !git.is_merge_in_progress()? {
                break;
            }
        },
        Err(other) => return Err(other),
    }

    if git.has_staged_changes()? {
        git.commit(
            &format!("Close {} '{}' into {}", plan.kind, plan.name, target),
            false,
        )?;
    }

    if let Some(tag_name) = tag {
        git.tag(
            tag_name,
            &TagOptions::annotated(format!("{} {}", plan.kind, plan.name)),
        )?;
    }

    if !options.dry_run {
        state.set_bool(&marker, true)?;
    }
    Ok(())
}

/// Deletion tail shared by the normal and abort paths: go home, drop the
/// work branch, forget the entity, clear every marker.
fn finalize(
    node: &mut ConfigNode,
    git: &dyn GitGateway,
    state: &StateStore,
    plan: &ClosePlan,
    uri: &Uri,
    options: &CloseOptions,
) -> Result<()> {
    git.checkout_branch(&plan.develop_target)?;
    git.delete_branch(&plan.branch)?;

    if options.dry_run {
        ui::display_status(&format!(
            "dry-run: would remove {} from {} and clear its markers",
            uri,
            node.pathspec()
        ));
        return Ok(());
    }

    node.remove_entity(plan.kind, plan.support.as_deref(), &plan.name)?;
    node.save()?;

    state.set_matching(&format!("{}/closing/*", plan.state_key), None)?;
    state.remove(ACTIVE_CLOSING_KEY)?;
    Ok(())
}
