use std::path::{Path, PathBuf};
use std::process::Command;

use super::{GatewayFactory, GitGateway, MergeOptions, TagOptions};
use crate::error::{Result, TreeflowError};
use crate::ui;

/// Gateway over the external `git` binary.
///
/// Every call spawns `git` in the gateway's working directory and blocks
/// until it exits. In dry-run mode mutating calls print the command they
/// would have run and return success; read-only queries still execute.
pub struct ProcessGit {
    workdir: PathBuf,
    dry_run: bool,
}

impl ProcessGit {
    pub fn new(workdir: impl Into<PathBuf>, dry_run: bool) -> Self {
        ProcessGit {
            workdir: workdir.into(),
            dry_run,
        }
    }

    /// Run git with the given arguments, returning trimmed stdout.
    fn run(&self, args: &[&str]) -> Result<String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            Err(TreeflowError::GitCommand {
                command: args.join(" "),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    /// Run a boolean query where a nonzero exit means "no".
    fn query(&self, args: &[&str]) -> Result<bool> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()?;
        Ok(output.status.success())
    }

    /// Run a mutating command, or log it and skip in dry-run mode.
    fn mutate(&self, args: &[&str]) -> Result<String> {
        if self.dry_run {
            ui::display_status(&format!(
                "dry-run [{}]: git {}",
                self.workdir.display(),
                args.join(" ")
            ));
            return Ok(String::new());
        }
        self.run(args)
    }
}

impl GitGateway for ProcessGit {
    fn checkout_branch(&self, name: &str) -> Result<()> {
        self.mutate(&["checkout", name]).map(|_| ())
    }

    fn create_branch(&self, name: &str, source: Option<&str>) -> Result<()> {
        let mut args = vec!["branch", name];
        if let Some(source) = source {
            args.push(source);
        }
        self.mutate(&args).map(|_| ())
    }

    fn delete_branch(&self, name: &str) -> Result<()> {
        self.mutate(&["branch", "-D", name]).map(|_| ())
    }

    fn branch_exists(&self, name: &str) -> Result<bool> {
        let refname = format!("refs/heads/{}", name);
        self.query(&["rev-parse", "--verify", "--quiet", &refname])
    }

    fn remote_branch_exists(&self, name: &str, upstream: &str) -> Result<bool> {
        let refname = format!("refs/remotes/{}/{}", upstream, name);
        self.query(&["rev-parse", "--verify", "--quiet", &refname])
    }

    fn merge(&self, name: &str, options: &MergeOptions) -> Result<()> {
        let mut args = vec!["merge"];
        if options.squash {
            args.push("--squash");
        }
        if options.no_commit {
            args.push("--no-commit");
        }
        if let Some(strategy) = &options.strategy {
            args.push("-s");
            args.push(strategy);
        }
        if let Some(message) = &options.message {
            args.push("-m");
            args.push(message);
        }
        args.push(name);

        match self.mutate(&args) {
            Ok(_) => Ok(()),
            Err(TreeflowError::GitCommand { status: 1, .. }) => {
                // Exit 1 from merge is the conflict signal; real failures
                // (bad ref, not a repository) exit with other codes.
                Err(TreeflowError::conflict(name))
            }
            Err(e) => Err(e),
        }
    }

    fn abort_merge(&self) -> Result<()> {
        // A conflicted squash merge leaves no MERGE_HEAD, and `merge --abort`
        // refuses to run without one; `reset --merge` discards it instead.
        if self.query(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])? {
            self.mutate(&["merge", "--abort"]).map(|_| ())
        } else {
            self.mutate(&["reset", "--merge"]).map(|_| ())
        }
    }

    fn reset_merge(&self) -> Result<()> {
        self.mutate(&["reset", "--merge"]).map(|_| ())
    }

    fn tag(&self, name: &str, options: &TagOptions) -> Result<()> {
        let mut args = vec!["tag"];
        if let Some(annotation) = &options.annotation {
            args.push("-a");
            args.push("-m");
            args.push(annotation);
        }
        args.push(name);
        if let Some(source) = &options.source {
            args.push(source);
        }
        self.mutate(&args).map(|_| ())
    }

    fn commit(&self, message: &str, amend: bool) -> Result<()> {
        let mut args = vec!["commit"];
        if amend {
            args.push("--amend");
        }
        args.push("-m");
        args.push(message);
        self.mutate(&args).map(|_| ())
    }

    fn fetch(&self) -> Result<()> {
        self.mutate(&["fetch"]).map(|_| ())
    }

    fn is_dirty(&self) -> Result<bool> {
        let status = self.run(&["status", "--porcelain"])?;
        Ok(!status.is_empty())
    }

    fn has_staged_changes(&self) -> Result<bool> {
        // diff --cached exits 1 when staged changes exist
        Ok(!self.query(&["diff", "--cached", "--quiet"])?)
    }

    fn is_merge_in_progress(&self) -> Result<bool> {
        // MERGE_HEAD covers regular merges only; a squash merge records
        // nothing there, so unresolved conflicts show up solely as unmerged
        // index entries.
        if self.query(&["rev-parse", "--verify", "--quiet", "MERGE_HEAD"])? {
            return Ok(true);
        }
        let unmerged = self.run(&["ls-files", "-u"])?;
        Ok(!unmerged.is_empty())
    }

    fn current_branch(&self) -> Result<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn resolve_commit_sha(&self, refname: &str) -> Result<String> {
        self.run(&["rev-parse", refname])
    }

    fn upstream_exists(&self, name: &str) -> Result<bool> {
        let remotes = self.run(&["remote"])?;
        Ok(remotes.lines().any(|line| line.trim() == name))
    }
}

/// Opens a [ProcessGit] per node working directory.
pub struct ProcessGitFactory {
    dry_run: bool,
}

impl ProcessGitFactory {
    pub fn new(dry_run: bool) -> Self {
        ProcessGitFactory { dry_run }
    }
}

impl GatewayFactory for ProcessGitFactory {
    fn open(&self, workdir: &Path) -> Result<Box<dyn GitGateway>> {
        Ok(Box::new(ProcessGit::new(workdir, self.dry_run)))
    }
}
