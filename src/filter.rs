//! Glob-based node selection for batch operations.
//!
//! Patterns are URI-shaped (`repo://api-*`, `branch://develop`,
//! `feature://pay-*`) and evaluated per node against its pathspec, current
//! branch and artifact classification.

use regex::Regex;

use crate::address::{resolve_artifact_from_branch, Artifact};
use crate::config::ConfigNode;
use crate::error::{Result, TreeflowError};
use crate::git::GatewayFactory;

/// Include/exclude pattern lists accepted by every batch operation. Absent
/// lists fall back to the root node's own defaults.
#[derive(Debug, Clone, Default)]
pub struct FilterSpec {
    pub included: Option<Vec<String>>,
    pub excluded: Option<Vec<String>>,
}

impl FilterSpec {
    /// Build from raw CLI lists, treating empty as absent.
    pub fn from_lists(included: Vec<String>, excluded: Vec<String>) -> Self {
        FilterSpec {
            included: if included.is_empty() {
                None
            } else {
                Some(included)
            },
            excluded: if excluded.is_empty() {
                None
            } else {
                Some(excluded)
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    Repo,
    Branch,
    Feature,
    Release,
    Hotfix,
}

/// One compiled URI-glob.
struct Pattern {
    kind: PatternKind,
    glob: Regex,
    /// True when the raw glob contains no slash, in which case repo patterns
    /// also match against the final pathspec segment.
    bare: bool,
}

impl Pattern {
    fn parse(raw: &str) -> Result<Pattern> {
        let (scheme, glob) = raw
            .split_once("://")
            .ok_or_else(|| TreeflowError::validation(format!("malformed pattern '{}'", raw)))?;
        let kind = match scheme {
            "repo" => PatternKind::Repo,
            "branch" => PatternKind::Branch,
            "feature" => PatternKind::Feature,
            "release" => PatternKind::Release,
            "hotfix" => PatternKind::Hotfix,
            other => {
                return Err(TreeflowError::validation(format!(
                    "unknown pattern type '{}'",
                    other
                )))
            }
        };
        Ok(Pattern {
            kind,
            glob: compile_glob(glob)?,
            bare: !glob.contains('/'),
        })
    }

    fn matches(&self, node: &ConfigNode, branch: &str, artifact: &Artifact) -> bool {
        match self.kind {
            PatternKind::Repo => {
                if self.glob.is_match(node.pathspec()) {
                    return true;
                }
                if self.bare {
                    let last = node.pathspec().rsplit('/').next().unwrap_or_default();
                    return self.glob.is_match(last);
                }
                false
            }
            PatternKind::Branch => self.glob.is_match(branch),
            PatternKind::Feature => {
                matches!(artifact, Artifact::Feature(name) if self.glob.is_match(name))
            }
            PatternKind::Release => {
                matches!(artifact, Artifact::Release(name) if self.glob.is_match(name))
            }
            PatternKind::Hotfix => {
                matches!(artifact, Artifact::Hotfix(name) if self.glob.is_match(name))
            }
        }
    }
}

/// Translate a glob into an anchored regex: `*` matches any run of
/// characters, `?` exactly one, everything else is literal.
pub(crate) fn compile_glob(glob: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(glob.len() + 8);
    pattern.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            other => pattern.push_str(&regex::escape(&other.to_string())),
        }
    }
    pattern.push('$');
    Regex::new(&pattern)
        .map_err(|e| TreeflowError::validation(format!("bad glob '{}': {}", glob, e)))
}

fn compile_patterns(raw: &[String]) -> Result<Vec<Pattern>> {
    raw.iter().map(|p| Pattern::parse(p)).collect()
}

/// Select the subset of tree nodes matching the filter, in pre-order.
///
/// Each node is evaluated independently: its current branch is read through
/// a gateway opened on its own checkout, classified into an artifact, and
/// matched. A node is selected iff no include list is in effect or at least
/// one include pattern matches, and no exclude pattern matches.
pub fn resolve_filtered_configs<'a>(
    root: &'a ConfigNode,
    spec: &FilterSpec,
    gateways: &dyn GatewayFactory,
) -> Result<Vec<&'a ConfigNode>> {
    let included_raw = match &spec.included {
        Some(list) => Some(list.clone()),
        None if !root.included.is_empty() => Some(root.included.clone()),
        None => None,
    };
    let excluded_raw = match &spec.excluded {
        Some(list) => Some(list.clone()),
        None if !root.excluded.is_empty() => Some(root.excluded.clone()),
        None => None,
    };

    let included = included_raw.as_deref().map(compile_patterns).transpose()?;
    let excluded = excluded_raw.as_deref().map(compile_patterns).transpose()?;

    let mut selected = Vec::new();
    for node in root.flatten() {
        let git = gateways.open(node.path())?;
        let branch = git.current_branch()?;
        let artifact = resolve_artifact_from_branch(node, &branch);

        let include_ok = match &included {
            None => true,
            Some(patterns) => patterns.iter().any(|p| p.matches(node, &branch, &artifact)),
        };
        if !include_ok {
            continue;
        }
        let exclude_hit = match &excluded {
            None => false,
            Some(patterns) => patterns.iter().any(|p| p.matches(node, &branch, &artifact)),
        };
        if !exclude_hit {
            selected.push(node);
        }
    }
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::document::SubmoduleRef;
    use crate::config::{ConfigDocument, Feature, CONFIG_FILE};
    use crate::git::{MockGit, MockGitFactory};
    use std::fs;
    use std::path::Path;
    use tempfile::TempDir;

    fn write_doc(dir: &Path, doc: &ConfigDocument) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join(CONFIG_FILE), toml::to_string_pretty(doc).unwrap()).unwrap();
    }

    /// root with children `alpha` and `feature-lib`.
    fn three_node_tree() -> (TempDir, ConfigNode) {
        let dir = TempDir::new().unwrap();
        let mut root = ConfigDocument::new();
        for name in ["alpha", "feature-lib"] {
            root.submodules.push(SubmoduleRef {
                name: name.to_string(),
                path: name.to_string(),
            });
        }
        write_doc(dir.path(), &root);
        write_doc(&dir.path().join("alpha"), &ConfigDocument::new());

        let mut lib = ConfigDocument::new();
        lib.features
            .push(Feature::new("pay-later", "feature/pay-later", "abc"));
        write_doc(&dir.path().join("feature-lib"), &lib);

        let node = ConfigNode::load_root(dir.path()).unwrap();
        (dir, node)
    }

    #[test]
    fn test_no_filter_selects_every_node_in_preorder() {
        let (_dir, root) = three_node_tree();
        let gateways = MockGitFactory::new();
        let selected =
            resolve_filtered_configs(&root, &FilterSpec::default(), &gateways).unwrap();
        let specs: Vec<&str> = selected.iter().map(|n| n.pathspec()).collect();
        assert_eq!(specs, vec!["root", "root/alpha", "root/feature-lib"]);
    }

    #[test]
    fn test_repo_glob_selects_by_node_name() {
        let (_dir, root) = three_node_tree();
        let gateways = MockGitFactory::new();
        let spec = FilterSpec::from_lists(vec!["repo://feature-*".to_string()], vec![]);
        let selected = resolve_filtered_configs(&root, &spec, &gateways).unwrap();
        let specs: Vec<&str> = selected.iter().map(|n| n.pathspec()).collect();
        assert_eq!(specs, vec!["root/feature-lib"]);
    }

    #[test]
    fn test_repo_glob_with_slash_matches_full_pathspec() {
        let (_dir, root) = three_node_tree();
        let gateways = MockGitFactory::new();
        let spec = FilterSpec::from_lists(vec!["repo://root/a*".to_string()], vec![]);
        let selected = resolve_filtered_configs(&root, &spec, &gateways).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].pathspec(), "root/alpha");
    }

    #[test]
    fn test_exclude_wins_over_include() {
        let (_dir, root) = three_node_tree();
        let gateways = MockGitFactory::new();
        let spec = FilterSpec {
            included: Some(vec!["repo://*".to_string()]),
            excluded: Some(vec!["repo://alpha".to_string()]),
        };
        let selected = resolve_filtered_configs(&root, &spec, &gateways).unwrap();
        let specs: Vec<&str> = selected.iter().map(|n| n.pathspec()).collect();
        assert_eq!(specs, vec!["root", "root/feature-lib"]);
    }

    #[test]
    fn test_feature_pattern_requires_matching_artifact() {
        let (dir, root) = three_node_tree();
        let gateways = MockGitFactory::new();
        // Put the feature-lib checkout on its feature branch
        gateways.insert(
            dir.path().join("feature-lib"),
            MockGit::new()
                .with_branch("feature/pay-later")
                .with_current_branch("feature/pay-later"),
        );

        let spec = FilterSpec::from_lists(vec!["feature://pay-*".to_string()], vec![]);
        let selected = resolve_filtered_configs(&root, &spec, &gateways).unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].pathspec(), "root/feature-lib");
    }

    #[test]
    fn test_branch_pattern_matches_checked_out_branch() {
        let (_dir, root) = three_node_tree();
        let gateways = MockGitFactory::new();
        let spec = FilterSpec::from_lists(vec!["branch://develop".to_string()], vec![]);
        // Every mock sits on develop by default
        let selected = resolve_filtered_configs(&root, &spec, &gateways).unwrap();
        assert_eq!(selected.len(), 3);
    }

    #[test]
    fn test_root_default_lists_apply_when_spec_is_empty() {
        let (dir, _) = three_node_tree();
        // Rewrite the root document with a default exclude
        let mut doc = ConfigDocument::load(dir.path()).unwrap();
        doc.excluded.push("repo://alpha".to_string());
        doc.save(dir.path()).unwrap();
        let root = ConfigNode::load_root(dir.path()).unwrap();

        let gateways = MockGitFactory::new();
        let selected =
            resolve_filtered_configs(&root, &FilterSpec::default(), &gateways).unwrap();
        let specs: Vec<&str> = selected.iter().map(|n| n.pathspec()).collect();
        assert_eq!(specs, vec!["root", "root/feature-lib"]);
    }

    #[test]
    fn test_glob_question_mark() {
        let re = compile_glob("1.?.0").unwrap();
        assert!(re.is_match("1.2.0"));
        assert!(!re.is_match("1.12.0"));
    }

    #[test]
    fn test_bad_pattern_type_rejected() {
        assert!(Pattern::parse("widget://*").is_err());
        assert!(Pattern::parse("no-scheme").is_err());
    }
}
