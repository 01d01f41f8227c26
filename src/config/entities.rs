use serde::{Deserialize, Serialize};

/// A named remote recorded for a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Upstream {
    pub name: String,
    pub url: String,
}

impl Upstream {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Upstream {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// Kind of a work-branch entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Feature,
    Release,
    Hotfix,
}

impl EntityKind {
    /// The URI scheme and display name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Feature => "feature",
            EntityKind::Release => "release",
            EntityKind::Hotfix => "hotfix",
        }
    }

    /// The conventional branch prefix for newly started entities.
    pub fn branch_prefix(&self) -> &'static str {
        self.as_str()
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn entity_uri(kind: EntityKind, support: Option<&str>, name: &str) -> String {
    match support {
        Some(support) => format!("{}://{}/{}", kind.as_str(), support, name),
        None => format!("{}://{}", kind.as_str(), name),
    }
}

fn entity_state_key(kind: EntityKind, support: Option<&str>, name: &str) -> String {
    match support {
        Some(support) => format!("{}/{}/{}", kind.as_str(), support, name),
        None => format!("{}/{}", kind.as_str(), name),
    }
}

/// A feature line: a short-lived work branch cut from develop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    pub name: String,
    pub branch_name: String,
    pub source_sha: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    /// Name of the owning support line, bound at registration. Never
    /// serialized; ownership is implied by document nesting.
    #[serde(skip)]
    pub support: Option<String>,
}

impl Feature {
    pub fn new(
        name: impl Into<String>,
        branch_name: impl Into<String>,
        source_sha: impl Into<String>,
    ) -> Self {
        Feature {
            name: name.into(),
            branch_name: branch_name.into(),
            source_sha: source_sha.into(),
            sources: Vec::new(),
            support: None,
        }
    }

    pub fn uri(&self) -> String {
        entity_uri(EntityKind::Feature, self.support.as_deref(), &self.name)
    }

    pub fn state_key(&self) -> String {
        entity_state_key(EntityKind::Feature, self.support.as_deref(), &self.name)
    }
}

/// A release line: a stabilization branch headed for master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub name: String,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip)]
    pub support: Option<String>,
}

impl Release {
    pub fn new(name: impl Into<String>, branch_name: impl Into<String>) -> Self {
        Release {
            name: name.into(),
            branch_name: branch_name.into(),
            source_sha: None,
            sources: Vec::new(),
            support: None,
        }
    }

    pub fn uri(&self) -> String {
        entity_uri(EntityKind::Release, self.support.as_deref(), &self.name)
    }

    pub fn state_key(&self) -> String {
        entity_state_key(EntityKind::Release, self.support.as_deref(), &self.name)
    }
}

/// A hotfix line: an urgent fix branch cut from master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hotfix {
    pub name: String,
    pub branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
    #[serde(skip)]
    pub support: Option<String>,
}

impl Hotfix {
    pub fn new(name: impl Into<String>, branch_name: impl Into<String>) -> Self {
        Hotfix {
            name: name.into(),
            branch_name: branch_name.into(),
            source_sha: None,
            sources: Vec::new(),
            support: None,
        }
    }

    pub fn uri(&self) -> String {
        entity_uri(EntityKind::Hotfix, self.support.as_deref(), &self.name)
    }

    pub fn state_key(&self) -> String {
        entity_state_key(EntityKind::Hotfix, self.support.as_deref(), &self.name)
    }
}

/// A long-lived parallel lineage with its own master/develop pair, carrying
/// its own feature/release/hotfix collections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Support {
    pub name: String,
    pub master_branch_name: String,
    pub develop_branch_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_sha: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub releases: Vec<Release>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hotfixes: Vec<Hotfix>,
}

impl Support {
    pub fn new(
        name: impl Into<String>,
        master_branch_name: impl Into<String>,
        develop_branch_name: impl Into<String>,
    ) -> Self {
        Support {
            name: name.into(),
            master_branch_name: master_branch_name.into(),
            develop_branch_name: develop_branch_name.into(),
            source_sha: None,
            features: Vec::new(),
            releases: Vec::new(),
            hotfixes: Vec::new(),
        }
    }

    pub fn uri(&self) -> String {
        format!("support://{}", self.name)
    }
}
