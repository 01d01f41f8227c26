//! Console output and user interaction.
//!
//! Display helpers format through the `console` crate; interactive
//! confirmation goes through the [ConflictPrompt] trait so workflows can be
//! driven by a scripted prompt in tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, Write};

use console::style;

use crate::address::Artifact;
use crate::error::Result;

/// Print an error message in red to stderr.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Print a success message with a green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Print a status message with a yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Print a warning to stderr.
pub fn display_warning(message: &str) {
    eprintln!("{} {}", style("⚠ WARNING:").yellow(), message);
}

/// One line of the tree status listing: pathspec, checked-out branch, and
/// its artifact classification.
pub fn display_node_status(pathspec: &str, branch: &str, artifact: &Artifact) {
    println!(
        "  {:<24} {:<32} {}",
        style(pathspec).bold(),
        branch,
        style(artifact).cyan()
    );
}

/// Yes/no confirmation, answered by a human or by a test script.
pub trait ConflictPrompt {
    /// Returns `Ok(true)` when the user confirms, `Ok(false)` when they
    /// decline. Callers decide whether a decline aborts.
    fn confirm(&self, message: &str) -> Result<bool>;
}

/// Prompt on the controlling terminal. Defaults to "no" on empty input.
pub struct StdinPrompt;

impl ConflictPrompt for StdinPrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        print!("{} [y/N]: ", message);
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;
        let answer = input.trim().to_lowercase();
        Ok(answer == "y" || answer == "yes")
    }
}

/// Queue-backed prompt for tests. Each confirmation pops the next scripted
/// answer; an optional callback runs on every answer so tests can mutate
/// mock state mid-workflow (e.g. mark a conflicted merge as finished).
pub struct ScriptedPrompt {
    answers: RefCell<VecDeque<bool>>,
    on_answer: Option<Box<dyn Fn()>>,
    asked: RefCell<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(answers: impl IntoIterator<Item = bool>) -> Self {
        ScriptedPrompt {
            answers: RefCell::new(answers.into_iter().collect()),
            on_answer: None,
            asked: RefCell::new(Vec::new()),
        }
    }

    /// Always answers yes.
    pub fn always_yes() -> Self {
        ScriptedPrompt {
            answers: RefCell::new(VecDeque::new()),
            on_answer: None,
            asked: RefCell::new(Vec::new()),
        }
    }

    pub fn with_on_answer(mut self, callback: impl Fn() + 'static) -> Self {
        self.on_answer = Some(Box::new(callback));
        self
    }

    /// The messages this prompt was asked, in order.
    pub fn asked(&self) -> Vec<String> {
        self.asked.borrow().clone()
    }
}

impl ConflictPrompt for ScriptedPrompt {
    fn confirm(&self, message: &str) -> Result<bool> {
        self.asked.borrow_mut().push(message.to_string());
        let answer = self.answers.borrow_mut().pop_front().unwrap_or(true);
        if let Some(callback) = &self.on_answer {
            callback();
        }
        Ok(answer)
    }
}
