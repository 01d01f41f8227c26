use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use uuid::Uuid;

use super::entities::{Feature, Hotfix, Release, Support, Upstream};
use super::CONFIG_FILE;
use crate::error::{Result, TreeflowError};

/// A named pointer to a child document at a relative path. Children are
/// stored by reference only; each node owns its own document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmoduleRef {
    pub name: String,
    pub path: String,
}

/// The declarative, on-disk shape of one node's configuration.
///
/// A document is the *unregistered* form: it carries no filesystem path and
/// no tree position. [crate::config::ConfigNode::register] is the only way
/// to turn it into a usable node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    pub identifier: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub upstreams: Vec<Upstream>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub submodules: Vec<SubmoduleRef>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<Release>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hotfixes: Vec<Hotfix>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub supports: Vec<Support>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub included: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

impl ConfigDocument {
    /// Create a fresh document with a newly generated identifier and empty
    /// collections. The identifier is generated exactly once here and never
    /// changes afterwards.
    pub fn new() -> Self {
        ConfigDocument {
            identifier: Uuid::new_v4().to_string(),
            upstreams: Vec::new(),
            submodules: Vec::new(),
            features: Vec::new(),
            releases: Vec::new(),
            hotfixes: Vec::new(),
            supports: Vec::new(),
            included: Vec::new(),
            excluded: Vec::new(),
        }
    }

    /// Load the document stored in `dir`, or create a fresh one if no
    /// document exists there yet.
    ///
    /// # Returns
    /// * `Ok(ConfigDocument)` - Parsed and validated (or fresh) document
    /// * `Err` - If the file exists but cannot be read, parsed or validated
    pub fn load(dir: &Path) -> Result<ConfigDocument> {
        let file = dir.join(CONFIG_FILE);
        if !file.exists() {
            return Ok(ConfigDocument::new());
        }

        let text = fs::read_to_string(&file)?;
        let doc: ConfigDocument = toml::from_str(&text)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Serialize the document into `dir`.
    pub fn save(&self, dir: &Path) -> Result<()> {
        self.validate()?;
        let text = toml::to_string_pretty(self)?;
        fs::write(dir.join(CONFIG_FILE), text)?;
        Ok(())
    }

    /// Schema validation beyond what serde enforces: non-empty identifier,
    /// entity names unique within their owning scope, branch names unique
    /// within the node.
    pub fn validate(&self) -> Result<()> {
        if self.identifier.trim().is_empty() {
            return Err(TreeflowError::validation("document identifier is empty"));
        }

        check_unique_names(
            "feature",
            self.features.iter().map(|f| f.name.as_str()),
        )?;
        check_unique_names(
            "release",
            self.releases.iter().map(|r| r.name.as_str()),
        )?;
        check_unique_names("hotfix", self.hotfixes.iter().map(|h| h.name.as_str()))?;
        check_unique_names("support", self.supports.iter().map(|s| s.name.as_str()))?;
        check_unique_names(
            "submodule",
            self.submodules.iter().map(|s| s.name.as_str()),
        )?;

        for support in &self.supports {
            check_unique_names(
                "support feature",
                support.features.iter().map(|f| f.name.as_str()),
            )?;
            check_unique_names(
                "support release",
                support.releases.iter().map(|r| r.name.as_str()),
            )?;
            check_unique_names(
                "support hotfix",
                support.hotfixes.iter().map(|h| h.name.as_str()),
            )?;
        }

        check_unique_names("branch", self.branch_names().into_iter())?;
        Ok(())
    }

    /// Every branch name declared by this document, across node-scoped and
    /// support-scoped entities and the support branch pairs themselves.
    fn branch_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        names.extend(self.features.iter().map(|f| f.branch_name.as_str()));
        names.extend(self.releases.iter().map(|r| r.branch_name.as_str()));
        names.extend(self.hotfixes.iter().map(|h| h.branch_name.as_str()));
        for support in &self.supports {
            names.push(support.master_branch_name.as_str());
            names.push(support.develop_branch_name.as_str());
            names.extend(support.features.iter().map(|f| f.branch_name.as_str()));
            names.extend(support.releases.iter().map(|r| r.branch_name.as_str()));
            names.extend(support.hotfixes.iter().map(|h| h.branch_name.as_str()));
        }
        names
    }
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self::new()
    }
}

fn check_unique_names<'a>(
    scope: &str,
    names: impl Iterator<Item = &'a str>,
) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(TreeflowError::validation(format!(
                "duplicate {} name '{}'",
                scope, name
            )));
        }
    }
    Ok(())
}
