//! Opening new work lines.
//!
//! Starting an entity cuts its branch from the conventional source (develop
//! for features and releases, master for hotfixes, the support pair for
//! support-scoped work), records the source commit and registers the entity
//! in the node's configuration. Validation runs before any branch is
//! created.

use crate::address::Uri;
use crate::config::{
    ConfigNode, EntityKind, Feature, Hotfix, Release, Support, DEVELOP_BRANCH, MASTER_BRANCH,
};
use crate::error::{Result, TreeflowError};
use crate::git::GitGateway;
use crate::state::StateStore;
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct StartOptions {
    /// Ref to branch from, overriding the conventional source.
    pub source: Option<String>,
    /// Log config writes instead of performing them.
    pub dry_run: bool,
}

/// Start the entity the URI names on this node. Returns the name of the
/// branch that was created and checked out.
pub fn start_entity(
    node: &mut ConfigNode,
    uri: &Uri,
    git: &dyn GitGateway,
    options: &StartOptions,
) -> Result<String> {
    match uri {
        Uri::Feature { support, name } => {
            let source = source_branch(node, support.as_deref(), false)?;
            let branch = entity_branch(EntityKind::Feature, support.as_deref(), name);
            let sha = open_branch(node, git, &branch, options.source.as_deref().unwrap_or(&source))?;
            let mut feature = Feature::new(name.clone(), branch.clone(), sha);
            feature.support = support.clone();
            node.add_feature(feature)?;
            persist(node, options)?;
            Ok(branch)
        }
        Uri::Release { support, name } => {
            let source = source_branch(node, support.as_deref(), false)?;
            let branch = entity_branch(EntityKind::Release, support.as_deref(), name);
            let sha = open_branch(node, git, &branch, options.source.as_deref().unwrap_or(&source))?;
            let mut release = Release::new(name.clone(), branch.clone());
            release.source_sha = Some(sha);
            release.support = support.clone();
            node.add_release(release)?;
            persist(node, options)?;
            Ok(branch)
        }
        Uri::Hotfix { support, name } => {
            let source = source_branch(node, support.as_deref(), true)?;
            let branch = entity_branch(EntityKind::Hotfix, support.as_deref(), name);
            let sha = open_branch(node, git, &branch, options.source.as_deref().unwrap_or(&source))?;
            let mut hotfix = Hotfix::new(name.clone(), branch.clone());
            hotfix.source_sha = Some(sha);
            hotfix.support = support.clone();
            node.add_hotfix(hotfix)?;
            persist(node, options)?;
            Ok(branch)
        }
        Uri::Support(name) => start_support(node, name, git, options),
        _ => Err(TreeflowError::validation(format!(
            "'{}' is not a startable address",
            uri
        ))),
    }
}

/// Conventional source branch: master for hotfixes, develop otherwise, both
/// swapped for the support pair when the work is support-scoped.
fn source_branch(node: &ConfigNode, support: Option<&str>, from_master: bool) -> Result<String> {
    match support {
        Some(owner) => {
            let support = node
                .support(owner)
                .ok_or_else(|| TreeflowError::not_found("support", owner))?;
            Ok(if from_master {
                support.master_branch_name.clone()
            } else {
                support.develop_branch_name.clone()
            })
        }
        None => Ok(if from_master {
            MASTER_BRANCH.to_string()
        } else {
            DEVELOP_BRANCH.to_string()
        }),
    }
}

fn entity_branch(kind: EntityKind, support: Option<&str>, name: &str) -> String {
    let prefix = kind.branch_prefix();
    match support {
        Some(owner) => format!("{}/{}/{}", prefix, owner, name),
        None => format!("{}/{}", prefix, name),
    }
}

/// Create `branch` from `source` and check it out, returning the source
/// commit. Fails without touching the repository when the branch already
/// exists locally or on a configured upstream.
fn open_branch(
    node: &ConfigNode,
    git: &dyn GitGateway,
    branch: &str,
    source: &str,
) -> Result<String> {
    if git.branch_exists(branch)? {
        return Err(TreeflowError::validation(format!(
            "branch '{}' already exists on {}",
            branch,
            node.pathspec()
        )));
    }
    for upstream in &node.upstreams {
        if !git.upstream_exists(&upstream.name)? {
            continue;
        }
        git.fetch()?;
        if git.remote_branch_exists(branch, &upstream.name)? {
            return Err(TreeflowError::validation(format!(
                "branch '{}' already exists on upstream '{}'",
                branch, upstream.name
            )));
        }
    }

    let sha = git.resolve_commit_sha(source)?;
    git.create_branch(branch, Some(source))?;
    git.checkout_branch(branch)?;
    Ok(sha)
}

/// Open a support line: a parallel master/develop branch pair plus its
/// configuration entry. Ends with the support's develop branch checked out.
fn start_support(
    node: &mut ConfigNode,
    name: &str,
    git: &dyn GitGateway,
    options: &StartOptions,
) -> Result<String> {
    let master = format!("support/{}/master", name);
    let develop = format!("support/{}/develop", name);
    let source = options.source.as_deref().unwrap_or(MASTER_BRANCH);

    for branch in [&master, &develop] {
        if git.branch_exists(branch)? {
            return Err(TreeflowError::validation(format!(
                "branch '{}' already exists on {}",
                branch,
                node.pathspec()
            )));
        }
    }

    let sha = git.resolve_commit_sha(source)?;
    git.create_branch(&master, Some(source))?;
    git.create_branch(&develop, Some(&master))?;
    git.checkout_branch(&develop)?;

    let mut support = Support::new(name, master, develop.clone());
    support.source_sha = Some(sha);
    node.add_support(support)?;
    persist(node, options)?;
    Ok(develop)
}

/// Remove a support line from the node's configuration and cascade removal
/// of every state-store entry recorded for its entities.
pub fn remove_support_line(node: &mut ConfigNode, name: &str) -> Result<()> {
    let support = node.remove_support(name)?;
    node.save()?;

    let state = StateStore::for_node(node);
    for kind in ["feature", "release", "hotfix"] {
        state.set_matching(&format!("{}/{}/*", kind, support.name), None)?;
    }
    Ok(())
}

fn persist(node: &ConfigNode, options: &StartOptions) -> Result<()> {
    if options.dry_run {
        ui::display_status(&format!("dry-run: would update {}", node.pathspec()));
        return Ok(());
    }
    node.save()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigDocument, Upstream, CONFIG_FILE};
    use crate::git::MockGit;
    use std::fs;
    use tempfile::TempDir;

    fn empty_node(dir: &TempDir) -> ConfigNode {
        fs::write(
            dir.path().join(CONFIG_FILE),
            toml::to_string_pretty(&ConfigDocument::new()).unwrap(),
        )
        .unwrap();
        ConfigNode::load_root(dir.path()).unwrap()
    }

    #[test]
    fn test_start_feature_cuts_from_develop_and_persists() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new();
        let uri: Uri = "feature://checkout-flow".parse().unwrap();

        let branch = start_entity(&mut node, &uri, &git, &StartOptions::default()).unwrap();
        assert_eq!(branch, "feature/checkout-flow");
        assert_eq!(git.current_branch().unwrap(), "feature/checkout-flow");

        let state = git.state();
        assert!(state
            .borrow()
            .commands
            .contains(&"branch feature/checkout-flow develop".to_string()));

        let reloaded = ConfigNode::load_root(dir.path()).unwrap();
        let feature = reloaded.feature("checkout-flow").unwrap();
        assert_eq!(feature.branch_name, "feature/checkout-flow");
        assert_eq!(feature.source_sha, "mock-sha-develop");
    }

    #[test]
    fn test_start_hotfix_cuts_from_master() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new();
        let uri: Uri = "hotfix://crash-fix".parse().unwrap();

        start_entity(&mut node, &uri, &git, &StartOptions::default()).unwrap();
        let state = git.state();
        assert!(state
            .borrow()
            .commands
            .contains(&"branch hotfix/crash-fix master".to_string()));
        assert_eq!(
            node.hotfix("crash-fix").unwrap().source_sha.as_deref(),
            Some("mock-sha-master")
        );
    }

    #[test]
    fn test_start_release_with_explicit_source() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new().with_branch("staging");

        let uri: Uri = "release://1.2.0".parse().unwrap();
        let options = StartOptions {
            source: Some("staging".to_string()),
            dry_run: false,
        };
        start_entity(&mut node, &uri, &git, &options).unwrap();
        let state = git.state();
        assert!(state
            .borrow()
            .commands
            .contains(&"branch release/1.2.0 staging".to_string()));
    }

    #[test]
    fn test_start_support_scoped_feature_uses_support_develop() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new();

        start_entity(
            &mut node,
            &"support://1.x".parse().unwrap(),
            &git,
            &StartOptions::default(),
        )
        .unwrap();
        let branch = start_entity(
            &mut node,
            &"feature://1.x/legacy-fix".parse().unwrap(),
            &git,
            &StartOptions::default(),
        )
        .unwrap();

        assert_eq!(branch, "feature/1.x/legacy-fix");
        let state = git.state();
        assert!(state
            .borrow()
            .commands
            .contains(&"branch feature/1.x/legacy-fix support/1.x/develop".to_string()));

        let support = node.support("1.x").unwrap();
        assert_eq!(support.features[0].support.as_deref(), Some("1.x"));
    }

    #[test]
    fn test_start_support_creates_branch_pair() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new();

        let branch = start_entity(
            &mut node,
            &"support://1.x".parse().unwrap(),
            &git,
            &StartOptions::default(),
        )
        .unwrap();
        assert_eq!(branch, "support/1.x/develop");
        assert!(git.branch_exists("support/1.x/master").unwrap());
        assert!(git.branch_exists("support/1.x/develop").unwrap());
        assert_eq!(git.current_branch().unwrap(), "support/1.x/develop");
    }

    #[test]
    fn test_existing_local_branch_rejected_before_any_mutation() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new().with_branch("feature/checkout-flow");

        let uri: Uri = "feature://checkout-flow".parse().unwrap();
        let err = start_entity(&mut node, &uri, &git, &StartOptions::default());
        assert!(matches!(err, Err(TreeflowError::Validation(_))));
        let state = git.state();
        assert!(state
            .borrow()
            .commands
            .iter()
            .all(|c| !c.starts_with("branch ")));
    }

    #[test]
    fn test_remote_branch_collision_rejected_after_fetch() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        node.upstreams.push(Upstream::new("origin", "git@example.com:repo"));

        let git = MockGit::new();
        {
            let state = git.state();
            let mut state = state.borrow_mut();
            state.remotes.insert("origin".to_string());
            state
                .remote_branches
                .insert("origin/feature/checkout-flow".to_string());
        }

        let uri: Uri = "feature://checkout-flow".parse().unwrap();
        let err = start_entity(&mut node, &uri, &git, &StartOptions::default());
        assert!(matches!(err, Err(TreeflowError::Validation(_))));
        let state = git.state();
        assert!(state.borrow().commands.contains(&"fetch".to_string()));
    }

    #[test]
    fn test_dry_run_skips_persistence() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new();
        let uri: Uri = "feature://checkout-flow".parse().unwrap();

        let options = StartOptions {
            source: None,
            dry_run: true,
        };
        start_entity(&mut node, &uri, &git, &options).unwrap();

        let reloaded = ConfigNode::load_root(dir.path()).unwrap();
        assert!(reloaded.feature("checkout-flow").is_none());
    }

    #[test]
    fn test_remove_support_cascades_state_entries() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new();

        start_entity(
            &mut node,
            &"support://1.x".parse().unwrap(),
            &git,
            &StartOptions::default(),
        )
        .unwrap();

        let state = StateStore::for_node(&node);
        state
            .set_bool("feature/1.x/legacy-fix/closing/develop", true)
            .unwrap();
        state.set_bool("feature/other/closing/develop", true).unwrap();

        remove_support_line(&mut node, "1.x").unwrap();

        assert!(node.support("1.x").is_none());
        assert_eq!(
            state
                .get_bool("feature/1.x/legacy-fix/closing/develop")
                .unwrap(),
            None
        );
        // Entries outside the support's scope survive
        assert_eq!(
            state.get_bool("feature/other/closing/develop").unwrap(),
            Some(true)
        );
    }

    #[test]
    fn test_branch_uri_is_not_startable() {
        let dir = TempDir::new().unwrap();
        let mut node = empty_node(&dir);
        let git = MockGit::new();
        let uri: Uri = "branch://wip".parse().unwrap();
        assert!(start_entity(&mut node, &uri, &git, &StartOptions::default()).is_err());
    }
}
