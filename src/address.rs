//! URI-based addressing: `<type>://<value>` strings parsed into a tagged
//! grammar up front, then resolved against a node into borrowed elements.

use std::fmt;
use std::str::FromStr;

use crate::config::{
    ConfigNode, EntityKind, Feature, Hotfix, Release, Support, DEVELOP_BRANCH, MASTER_BRANCH,
};
use crate::error::{Result, TreeflowError};
use crate::git::GitGateway;

/// A parsed address. Malformed or unknown-type strings are rejected here,
/// never deeper in the lookup logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Uri {
    Branch(String),
    Repo(Vec<String>),
    Feature {
        support: Option<String>,
        name: String,
    },
    Release {
        support: Option<String>,
        name: String,
    },
    Hotfix {
        support: Option<String>,
        name: String,
    },
    Support(String),
}

impl Uri {
    /// For work-entity addresses, the entity kind.
    pub fn entity_kind(&self) -> Option<EntityKind> {
        match self {
            Uri::Feature { .. } => Some(EntityKind::Feature),
            Uri::Release { .. } => Some(EntityKind::Release),
            Uri::Hotfix { .. } => Some(EntityKind::Hotfix),
            _ => None,
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Uri::Branch(name) => write!(f, "branch://{}", name),
            Uri::Repo(segments) => write!(f, "repo://{}", segments.join("/")),
            Uri::Feature { support, name } => write_entity(f, "feature", support, name),
            Uri::Release { support, name } => write_entity(f, "release", support, name),
            Uri::Hotfix { support, name } => write_entity(f, "hotfix", support, name),
            Uri::Support(name) => write!(f, "support://{}", name),
        }
    }
}

fn write_entity(
    f: &mut fmt::Formatter<'_>,
    scheme: &str,
    support: &Option<String>,
    name: &str,
) -> fmt::Result {
    match support {
        Some(support) => write!(f, "{}://{}/{}", scheme, support, name),
        None => write!(f, "{}://{}", scheme, name),
    }
}

impl FromStr for Uri {
    type Err = TreeflowError;

    fn from_str(s: &str) -> Result<Uri> {
        let (scheme, value) = s
            .split_once("://")
            .ok_or_else(|| TreeflowError::validation(format!("malformed address '{}'", s)))?;
        if value.is_empty() {
            return Err(TreeflowError::validation(format!(
                "address '{}' has an empty value",
                s
            )));
        }

        match scheme {
            "branch" => Ok(Uri::Branch(value.to_string())),
            "repo" => {
                let segments: Vec<String> = value.split('/').map(str::to_string).collect();
                if segments.iter().any(|seg| seg.is_empty()) {
                    return Err(TreeflowError::validation(format!(
                        "address '{}' has an empty path segment",
                        s
                    )));
                }
                Ok(Uri::Repo(segments))
            }
            "feature" | "release" | "hotfix" => {
                let (support, name) = split_entity_value(s, value)?;
                Ok(match scheme {
                    "feature" => Uri::Feature { support, name },
                    "release" => Uri::Release { support, name },
                    _ => Uri::Hotfix { support, name },
                })
            }
            "support" => {
                if value.contains('/') {
                    return Err(TreeflowError::validation(format!(
                        "support address '{}' takes a single name",
                        s
                    )));
                }
                Ok(Uri::Support(value.to_string()))
            }
            other => Err(TreeflowError::validation(format!(
                "unknown address type '{}'",
                other
            ))),
        }
    }
}

fn split_entity_value(whole: &str, value: &str) -> Result<(Option<String>, String)> {
    let mut parts = value.split('/');
    let first = parts.next().unwrap_or_default();
    match (parts.next(), parts.next()) {
        (None, _) => Ok((None, first.to_string())),
        (Some(second), None) if !first.is_empty() && !second.is_empty() => {
            Ok((Some(first.to_string()), second.to_string()))
        }
        _ => Err(TreeflowError::validation(format!(
            "address '{}' must be <name> or <support>/<name>",
            whole
        ))),
    }
}

/// Derived classification of a branch name on a node at a point in time.
/// Computed on demand, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Master,
    Develop,
    Feature(String),
    Release(String),
    Hotfix(String),
    Unknown(String),
}

impl Artifact {
    pub fn kind(&self) -> &'static str {
        match self {
            Artifact::Master => "master",
            Artifact::Develop => "develop",
            Artifact::Feature(_) => "feature",
            Artifact::Release(_) => "release",
            Artifact::Hotfix(_) => "hotfix",
            Artifact::Unknown(_) => "unknown",
        }
    }

    /// The entity name (or raw branch name for unknown artifacts).
    pub fn name(&self) -> Option<&str> {
        match self {
            Artifact::Master | Artifact::Develop => None,
            Artifact::Feature(name) | Artifact::Release(name) | Artifact::Hotfix(name) => {
                Some(name)
            }
            Artifact::Unknown(branch) => Some(branch),
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} {}", self.kind(), name),
            None => f.write_str(self.kind()),
        }
    }
}

/// Classify a branch name against a node's entity lists.
///
/// Precedence is strict: the `master` and `develop` literals win over any
/// entity whose branch name happens to collide with them; then features,
/// releases, hotfixes are searched in that order (node-scoped entities
/// before support-scoped within each kind).
pub fn resolve_artifact_from_branch(node: &ConfigNode, branch: &str) -> Artifact {
    if branch == MASTER_BRANCH {
        return Artifact::Master;
    }
    if branch == DEVELOP_BRANCH {
        return Artifact::Develop;
    }
    if let Some(feature) = feature_by_branch(node, branch) {
        return Artifact::Feature(feature.name.clone());
    }
    if let Some(release) = release_by_branch(node, branch) {
        return Artifact::Release(release.name.clone());
    }
    if let Some(hotfix) = hotfix_by_branch(node, branch) {
        return Artifact::Hotfix(hotfix.name.clone());
    }
    Artifact::Unknown(branch.to_string())
}

fn feature_by_branch<'a>(node: &'a ConfigNode, branch: &str) -> Option<&'a Feature> {
    node.features
        .iter()
        .find(|f| f.branch_name == branch)
        .or_else(|| {
            node.supports
                .iter()
                .flat_map(|s| s.features.iter())
                .find(|f| f.branch_name == branch)
        })
}

fn release_by_branch<'a>(node: &'a ConfigNode, branch: &str) -> Option<&'a Release> {
    node.releases
        .iter()
        .find(|r| r.branch_name == branch)
        .or_else(|| {
            node.supports
                .iter()
                .flat_map(|s| s.releases.iter())
                .find(|r| r.branch_name == branch)
        })
}

fn hotfix_by_branch<'a>(node: &'a ConfigNode, branch: &str) -> Option<&'a Hotfix> {
    node.hotfixes
        .iter()
        .find(|h| h.branch_name == branch)
        .or_else(|| {
            node.supports
                .iter()
                .flat_map(|s| s.hotfixes.iter())
                .find(|h| h.branch_name == branch)
        })
}

/// A resolved addressable reference borrowing into the tree.
#[derive(Debug)]
pub enum Element<'a> {
    Branch(String),
    Repo(&'a ConfigNode),
    Feature(&'a Feature),
    Release(&'a Release),
    Hotfix(&'a Hotfix),
    Support(&'a Support),
}

/// Resolve a parsed address against `node`.
///
/// `branch://` verifies existence through the gateway; `repo://` descends
/// one submodule level per segment after the initial `root` literal; the
/// two-segment entity forms look the support up first, then the entity
/// inside it.
pub fn resolve_element<'a>(
    node: &'a ConfigNode,
    uri: &Uri,
    git: &dyn GitGateway,
) -> Result<Element<'a>> {
    match uri {
        Uri::Branch(name) => {
            if git.branch_exists(name)? {
                Ok(Element::Branch(name.clone()))
            } else {
                Err(TreeflowError::not_found("branch", name.clone()))
            }
        }
        Uri::Repo(segments) => {
            let mut segments = segments.iter();
            match segments.next() {
                Some(head) if head == "root" => {}
                _ => {
                    return Err(TreeflowError::not_found("repo", uri.to_string()));
                }
            }
            let mut current = node;
            for segment in segments {
                current = &current
                    .submodule(segment)
                    .ok_or_else(|| TreeflowError::not_found("repo", uri.to_string()))?
                    .node;
            }
            Ok(Element::Repo(current))
        }
        Uri::Feature { support, name } => match support {
            Some(owner) => {
                let support = node
                    .support(owner)
                    .ok_or_else(|| TreeflowError::not_found("support", owner.clone()))?;
                support
                    .features
                    .iter()
                    .find(|f| f.name == *name)
                    .map(Element::Feature)
                    .ok_or_else(|| TreeflowError::not_found("feature", name.clone()))
            }
            None => node
                .feature(name)
                .map(Element::Feature)
                .ok_or_else(|| TreeflowError::not_found("feature", name.clone())),
        },
        Uri::Release { support, name } => match support {
            Some(owner) => {
                let support = node
                    .support(owner)
                    .ok_or_else(|| TreeflowError::not_found("support", owner.clone()))?;
                support
                    .releases
                    .iter()
                    .find(|r| r.name == *name)
                    .map(Element::Release)
                    .ok_or_else(|| TreeflowError::not_found("release", name.clone()))
            }
            None => node
                .release(name)
                .map(Element::Release)
                .ok_or_else(|| TreeflowError::not_found("release", name.clone())),
        },
        Uri::Hotfix { support, name } => match support {
            Some(owner) => {
                let support = node
                    .support(owner)
                    .ok_or_else(|| TreeflowError::not_found("support", owner.clone()))?;
                support
                    .hotfixes
                    .iter()
                    .find(|h| h.name == *name)
                    .map(Element::Hotfix)
                    .ok_or_else(|| TreeflowError::not_found("hotfix", name.clone()))
            }
            None => node
                .hotfix(name)
                .map(Element::Hotfix)
                .ok_or_else(|| TreeflowError::not_found("hotfix", name.clone())),
        },
        Uri::Support(name) => node
            .support(name)
            .map(Element::Support)
            .ok_or_else(|| TreeflowError::not_found("support", name.clone())),
    }
}

/// Locate what a branch name refers to on a node, without restricting the
/// search to direct entities: entity branches resolve to their entity,
/// support master/develop branches resolve to their support, and the
/// master/develop literals resolve to plain branch elements.
pub fn resolve_element_from_branch<'a>(node: &'a ConfigNode, branch: &str) -> Option<Element<'a>> {
    if branch == MASTER_BRANCH || branch == DEVELOP_BRANCH {
        return Some(Element::Branch(branch.to_string()));
    }
    if let Some(feature) = feature_by_branch(node, branch) {
        return Some(Element::Feature(feature));
    }
    if let Some(release) = release_by_branch(node, branch) {
        return Some(Element::Release(release));
    }
    if let Some(hotfix) = hotfix_by_branch(node, branch) {
        return Some(Element::Hotfix(hotfix));
    }
    node.supports
        .iter()
        .find(|s| s.master_branch_name == branch || s.develop_branch_name == branch)
        .map(Element::Support)
}
