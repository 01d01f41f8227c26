use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use super::{GatewayFactory, GitGateway, MergeOptions, TagOptions};
use crate::error::{Result, TreeflowError};

/// Observable state of a [MockGit] repository.
#[derive(Debug, Default)]
pub struct MockState {
    pub branches: HashSet<String>,
    pub current_branch: String,
    pub dirty: bool,
    pub staged_changes: bool,
    /// Set by a conflicted merge (squash merges included, mirroring the
    /// unmerged-index detection of the process gateway); cleared by aborting
    /// or concluding the merge, or by the test standing in for the user
    /// staging a resolution.
    pub merge_in_progress: bool,
    /// Branch names whose merge reports a conflict.
    pub conflict_branches: HashSet<String>,
    pub remotes: HashSet<String>,
    pub remote_branches: HashSet<String>,
    pub shas: HashMap<String, String>,
    pub tags: Vec<String>,
    pub commits: Vec<String>,
    /// Every gateway call, in invocation order.
    pub commands: Vec<String>,
}

/// Scriptable in-memory gateway for testing without actual git operations.
///
/// Clones share state, so a test can keep a handle while the workflow under
/// test drives a boxed copy.
#[derive(Clone)]
pub struct MockGit {
    state: Rc<RefCell<MockState>>,
}

impl MockGit {
    /// A repository sitting on `develop` with the standard branch pair.
    pub fn new() -> Self {
        let mut state = MockState::default();
        state.branches.insert("master".to_string());
        state.branches.insert("develop".to_string());
        state.current_branch = "develop".to_string();
        MockGit {
            state: Rc::new(RefCell::new(state)),
        }
    }

    pub fn with_branch(self, name: impl Into<String>) -> Self {
        self.state.borrow_mut().branches.insert(name.into());
        self
    }

    pub fn with_current_branch(self, name: impl Into<String>) -> Self {
        self.state.borrow_mut().current_branch = name.into();
        self
    }

    pub fn with_dirty(self, dirty: bool) -> Self {
        self.state.borrow_mut().dirty = dirty;
        self
    }

    /// Script a conflict for merges of the named branch.
    pub fn with_conflict_on(self, branch: impl Into<String>) -> Self {
        self.state
            .borrow_mut()
            .conflict_branches
            .insert(branch.into());
        self
    }

    /// Shared handle onto the mock's state for assertions and mid-test
    /// scripting (e.g. clearing the in-progress merge flag).
    pub fn state(&self) -> Rc<RefCell<MockState>> {
        Rc::clone(&self.state)
    }

    fn log(&self, command: String) {
        self.state.borrow_mut().commands.push(command);
    }
}

impl Default for MockGit {
    fn default() -> Self {
        Self::new()
    }
}

impl GitGateway for MockGit {
    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.log(format!("checkout {}", name));
        let mut state = self.state.borrow_mut();
        if !state.branches.contains(name) {
            return Err(TreeflowError::GitCommand {
                command: format!("checkout {}", name),
                status: 1,
                stderr: format!("pathspec '{}' did not match any file(s)", name),
            });
        }
        state.current_branch = name.to_string();
        Ok(())
    }

    fn create_branch(&self, name: &str, source: Option<&str>) -> Result<()> {
        self.log(format!("branch {} {}", name, source.unwrap_or("HEAD")));
        self.state.borrow_mut().branches.insert(name.to_string());
        Ok(())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.log(format!("branch -D {}", name));
        self.state.borrow_mut().branches.remove(name);
        Ok(())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.borrow().branches.contains(name))
    }

    fn remote_branch_exists(&self, name: &str, upstream: &str) -> Result<bool> {
        let key = format!("{}/{}", upstream, name);
        Ok(self.state.borrow().remote_branches.contains(&key))
    }

    fn merge(&self, name: &str, options: &MergeOptions) -> Result<()> {
        self.log(format!(
            "merge{}{} {}",
            if options.squash { " --squash" } else { "" },
            if options.no_commit { " --no-commit" } else { "" },
            name
        ));
        let mut state = self.state.borrow_mut();
        if state.conflict_branches.contains(name) {
            state.merge_in_progress = true;
            return Err(TreeflowError::conflict(name));
        }
        state.staged_changes = true;
        Ok(())
    }

    fn abort_merge(&self) -> Result<()> {
        self.log("merge --abort".to_string());
        let mut state = self.state.borrow_mut();
        state.merge_in_progress = false;
        state.staged_changes = false;
        Ok(())
    }

    fn reset_merge(&self) -> Result<()> {
        self.log("reset --merge".to_string());
        self.state.borrow_mut().staged_changes = false;
        Ok(())
    }

    fn tag(&self, name: &str, options: &TagOptions) -> Result<()> {
        self.log(match &options.annotation {
            Some(annotation) => format!("tag -a -m '{}' {}", annotation, name),
            None => format!("tag {}", name),
        });
        self.state.borrow_mut().tags.push(name.to_string());
        Ok(())
    }

    fn commit(&self, message: &str, amend: bool) -> Result<()> {
        self.log(format!(
            "commit{} -m '{}'",
            if amend { " --amend" } else { "" },
            message
        ));
        let mut state = self.state.borrow_mut();
        state.staged_changes = false;
        state.merge_in_progress = false;
        state.commits.push(message.to_string());
        Ok(())
    }

    fn fetch(&self) -> Result<()> {
        self.log("fetch".to_string());
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(self.state.borrow().dirty)
    }

    fn has_staged_changes(&self) -> Result<bool> {
        Ok(self.state.borrow().staged_changes)
    }

    fn is_merge_in_progress(&self) -> Result<bool> {
        Ok(self.state.borrow().merge_in_progress)
    }

    fn current_branch(&self) -> Result<String> {
        Ok(self.state.borrow().current_branch.clone())
    }

    fn resolve_commit_sha(&self, refname: &str) -> Result<String> {
        let state = self.state.borrow();
        Ok(state
            .shas
            .get(refname)
            .cloned()
            .unwrap_or_else(|| format!("mock-sha-{}", refname)))
    }

    fn upstream_exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.borrow().remotes.contains(name))
    }
}

/// Hands out shared [MockGit] handles keyed by working directory, so a test
/// can pre-script each node's repository and inspect it afterwards.
#[derive(Default)]
pub struct MockGitFactory {
    gateways: RefCell<HashMap<PathBuf, MockGit>>,
}

impl MockGitFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-register a scripted gateway for a working directory.
    pub fn insert(&self, workdir: impl Into<PathBuf>, git: MockGit) {
        self.gateways.borrow_mut().insert(workdir.into(), git);
    }

    /// Handle for the gateway at `workdir`, creating a default one if the
    /// test did not script it.
    pub fn get(&self, workdir: &Path) -> MockGit {
        self.gateways
            .borrow_mut()
            .entry(workdir.to_path_buf())
            .or_insert_with(MockGit::new)
            .clone()
    }
}

impl GatewayFactory for MockGitFactory {
    fn open(&self, workdir: &Path) -> Result<Box<dyn GitGateway>> {
        Ok(Box::new(self.get(workdir)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_git_branch_lifecycle() {
        let git = MockGit::new();
        assert!(git.branch_exists("develop").unwrap());
        assert!(!git.branch_exists("feature/x").unwrap());

        git.create_branch("feature/x", Some("develop")).unwrap();
        assert!(git.branch_exists("feature/x").unwrap());

        git.checkout_branch("feature/x").unwrap();
        assert_eq!(git.current_branch().unwrap(), "feature/x");

        git.checkout_branch("develop").unwrap();
        git.delete_branch("feature/x").unwrap();
        assert!(!git.branch_exists("feature/x").unwrap());
    }

    #[test]
    fn test_mock_git_checkout_missing_branch_fails() {
        let git = MockGit::new();
        assert!(git.checkout_branch("missing").is_err());
    }

    #[test]
    fn test_mock_git_merge_stages_changes() {
        let git = MockGit::new().with_branch("feature/x");
        assert!(!git.has_staged_changes().unwrap());
        git.merge("feature/x", &MergeOptions::squashed()).unwrap();
        assert!(git.has_staged_changes().unwrap());
        git.commit("done", false).unwrap();
        assert!(!git.has_staged_changes().unwrap());
    }

    #[test]
    fn test_mock_git_scripted_conflict() {
        let git = MockGit::new()
            .with_branch("feature/x")
            .with_conflict_on("feature/x");
        let err = git.merge("feature/x", &MergeOptions::squashed());
        assert!(matches!(err, Err(TreeflowError::MergeConflict { .. })));
        assert!(git.is_merge_in_progress().unwrap());

        git.state().borrow_mut().merge_in_progress = false;
        assert!(!git.is_merge_in_progress().unwrap());
    }

    #[test]
    fn test_mock_git_commit_concludes_pending_merge() {
        let git = MockGit::new()
            .with_branch("feature/x")
            .with_conflict_on("feature/x");
        git.merge("feature/x", &MergeOptions::squashed()).unwrap_err();
        assert!(git.is_merge_in_progress().unwrap());

        git.commit("resolved", false).unwrap();
        assert!(!git.is_merge_in_progress().unwrap());
        assert!(!git.has_staged_changes().unwrap());
    }

    #[test]
    fn test_mock_git_clones_share_state() {
        let git = MockGit::new();
        let clone = git.clone();
        clone.create_branch("feature/x", None).unwrap();
        assert!(git.branch_exists("feature/x").unwrap());
    }

    #[test]
    fn test_factory_hands_out_shared_handles() {
        let factory = MockGitFactory::new();
        let path = Path::new("/repo");
        let handle = factory.get(path);
        let boxed = factory.open(path).unwrap();
        boxed.create_branch("feature/x", None).unwrap();
        assert!(handle.branch_exists("feature/x").unwrap());
    }
}
