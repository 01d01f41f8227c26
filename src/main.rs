use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use treeflow::address::Uri;
use treeflow::config::ConfigNode;
use treeflow::filter::FilterSpec;
use treeflow::git::ProcessGitFactory;
use treeflow::ui::{self, StdinPrompt};
use treeflow::workflow::{self, BatchSummary, CloseOptions, StartOptions};

#[derive(Parser)]
#[command(
    name = "treeflow",
    about = "Branch-based release workflow across a tree of nested repositories",
    version
)]
struct Args {
    #[arg(short, long, help = "Root of the repository tree (defaults to the current directory)")]
    path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show each selected node with its current branch
    Status {
        #[arg(short, long, help = "Include pattern, e.g. repo://api-* (repeatable)")]
        include: Vec<String>,

        #[arg(short, long, help = "Exclude pattern (repeatable)")]
        exclude: Vec<String>,
    },

    /// Open a work line: feature://x, release://1.2.0, hotfix://y, support://1.x
    Start {
        uri: String,

        #[arg(long, help = "Ref to branch from, overriding the conventional source")]
        source: Option<String>,

        #[arg(short, long, help = "Include pattern (repeatable)")]
        include: Vec<String>,

        #[arg(short, long, help = "Exclude pattern (repeatable)")]
        exclude: Vec<String>,

        #[arg(long, help = "Preview without writing configuration")]
        dry_run: bool,
    },

    /// Close a work line: merge it out, tag releases and hotfixes, delete the branch
    Close {
        /// Entity address; omit to resume an interrupted close
        uri: Option<String>,

        #[arg(long, help = "Discard merge work and delete the work line")]
        abort: bool,

        #[arg(short, long, help = "Skip confirmation prompts")]
        force: bool,

        #[arg(long, help = "Preview without making changes")]
        dry_run: bool,

        #[arg(short, long, help = "Include pattern (repeatable)")]
        include: Vec<String>,

        #[arg(short, long, help = "Exclude pattern (repeatable)")]
        exclude: Vec<String>,
    },

    /// Remove a support line and its recorded workflow state
    RemoveSupport {
        name: String,

        #[arg(short, long, help = "Include pattern (repeatable)")]
        include: Vec<String>,

        #[arg(short, long, help = "Exclude pattern (repeatable)")]
        exclude: Vec<String>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let root_path = match args.path {
        Some(path) => path,
        None => std::env::current_dir()?,
    };
    let mut root = match ConfigNode::load_root(&root_path) {
        Ok(root) => root,
        Err(e) => {
            ui::display_error(&format!("Failed to load configuration tree: {}", e));
            std::process::exit(1);
        }
    };

    match args.command {
        Command::Status { include, exclude } => {
            let gateways = ProcessGitFactory::new(false);
            let filter = FilterSpec::from_lists(include, exclude);
            if let Err(e) = workflow::report_status(&root, &filter, &gateways) {
                ui::display_error(&e.to_string());
                std::process::exit(1);
            }
        }

        Command::Start {
            uri,
            source,
            include,
            exclude,
            dry_run,
        } => {
            let uri = parse_uri(&uri);
            let gateways = ProcessGitFactory::new(dry_run);
            let filter = FilterSpec::from_lists(include, exclude);
            let options = StartOptions { source, dry_run };
            run_batch(workflow::start_across(
                &mut root, &filter, &uri, &gateways, &options,
            ));
        }

        Command::Close {
            uri,
            abort,
            force,
            dry_run,
            include,
            exclude,
        } => {
            let uri = uri.map(|raw| parse_uri(&raw));
            let gateways = ProcessGitFactory::new(dry_run);
            let filter = FilterSpec::from_lists(include, exclude);
            let options = CloseOptions {
                abort,
                force,
                dry_run,
            };
            run_batch(workflow::close_across(
                &mut root,
                &filter,
                uri.as_ref(),
                &gateways,
                &StdinPrompt,
                &options,
            ));
        }

        Command::RemoveSupport {
            name,
            include,
            exclude,
        } => {
            let gateways = ProcessGitFactory::new(false);
            let filter = FilterSpec::from_lists(include, exclude);
            run_batch(workflow::remove_support_across(
                &mut root, &filter, &name, &gateways,
            ));
        }
    }

    Ok(())
}

fn parse_uri(raw: &str) -> Uri {
    match raw.parse() {
        Ok(uri) => uri,
        Err(e) => {
            ui::display_error(&e.to_string());
            std::process::exit(1);
        }
    }
}

/// Report a batch result and exit nonzero if any node failed.
fn run_batch(result: treeflow::Result<BatchSummary>) {
    match result {
        Ok(summary) => {
            if !summary.completed.is_empty() || !summary.failed.is_empty() {
                ui::display_status(&format!(
                    "{} completed, {} skipped, {} failed",
                    summary.completed.len(),
                    summary.skipped.len(),
                    summary.failed.len()
                ));
            }
            if !summary.all_succeeded() {
                std::process::exit(1);
            }
        }
        Err(e) => {
            ui::display_error(&e.to_string());
            std::process::exit(1);
        }
    }
}
