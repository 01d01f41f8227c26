use std::collections::HashSet;
use std::path::{Path, PathBuf};

use super::document::{ConfigDocument, SubmoduleRef};
use super::entities::{EntityKind, Feature, Hotfix, Release, Support, Upstream};
use super::ROOT_PATHSPEC;
use crate::error::{Result, TreeflowError};

/// A named pointer from a parent node to a recursively registered child.
/// The submodule owns the child node; the parent is reachable by pathspec,
/// never by back-pointer.
#[derive(Debug, Clone)]
pub struct Submodule {
    pub name: String,
    /// Path of the child directory, relative to the parent node.
    pub rel_path: String,
    pub node: ConfigNode,
}

/// One repository's registered configuration in the tree.
///
/// A `ConfigNode` only exists in fully registered form: its path and
/// pathspec are bound at construction by [ConfigNode::register], which is
/// the sole way in from a [ConfigDocument]. There is no partially
/// initialized state to guard against.
#[derive(Debug, Clone)]
pub struct ConfigNode {
    identifier: String,
    path: PathBuf,
    pathspec: String,
    pub upstreams: Vec<Upstream>,
    pub submodules: Vec<Submodule>,
    pub features: Vec<Feature>,
    pub releases: Vec<Release>,
    pub hotfixes: Vec<Hotfix>,
    pub supports: Vec<Support>,
    pub included: Vec<String>,
    pub excluded: Vec<String>,
}

impl ConfigNode {
    /// Load the document stored at `path` and register it as the tree root,
    /// recursively loading and registering every submodule.
    pub fn load_root(path: &Path) -> Result<ConfigNode> {
        let doc = ConfigDocument::load(path)?;
        let root = Self::register(doc, path.to_path_buf(), ROOT_PATHSPEC.to_string())?;
        root.check_identifiers_unique()?;
        Ok(root)
    }

    /// Bind a loaded document into the tree at the given path and pathspec.
    ///
    /// Registration passes run in order: submodules (each recursively
    /// loading its own document), then features, releases, hotfixes and
    /// finally supports, whose nested entities receive their owning support
    /// name. Each pass fully completes before the next.
    pub fn register(doc: ConfigDocument, path: PathBuf, pathspec: String) -> Result<ConfigNode> {
        let ConfigDocument {
            identifier,
            upstreams,
            submodules: submodule_refs,
            features,
            releases,
            hotfixes,
            mut supports,
            included,
            excluded,
        } = doc;

        let mut submodules = Vec::with_capacity(submodule_refs.len());
        for sub in submodule_refs {
            let child_path = path.join(&sub.path);
            let child_doc = ConfigDocument::load(&child_path)?;
            let child = Self::register(
                child_doc,
                child_path,
                format!("{}/{}", pathspec, sub.name),
            )?;
            submodules.push(Submodule {
                name: sub.name,
                rel_path: sub.path,
                node: child,
            });
        }

        let features = features
            .into_iter()
            .map(|mut f| {
                f.support = None;
                f
            })
            .collect();
        let releases = releases
            .into_iter()
            .map(|mut r| {
                r.support = None;
                r
            })
            .collect();
        let hotfixes = hotfixes
            .into_iter()
            .map(|mut h| {
                h.support = None;
                h
            })
            .collect();

        for support in &mut supports {
            let owner = support.name.clone();
            for feature in &mut support.features {
                feature.support = Some(owner.clone());
            }
            for release in &mut support.releases {
                release.support = Some(owner.clone());
            }
            for hotfix in &mut support.hotfixes {
                hotfix.support = Some(owner.clone());
            }
        }

        Ok(ConfigNode {
            identifier,
            path,
            pathspec,
            upstreams,
            submodules,
            features,
            releases,
            hotfixes,
            supports,
            included,
            excluded,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Filesystem location of the node's checkout, bound at registration.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Slash-delimited address of the node from the tree root.
    pub fn pathspec(&self) -> &str {
        &self.pathspec
    }

    /// Serialize the node's declarative fields back to its own document.
    /// Submodule children are written by reference only; each child owns its
    /// document at its own path.
    pub fn save(&self) -> Result<()> {
        self.to_document().save(&self.path)
    }

    /// The declarative projection of this node.
    pub fn to_document(&self) -> ConfigDocument {
        ConfigDocument {
            identifier: self.identifier.clone(),
            upstreams: self.upstreams.clone(),
            submodules: self
                .submodules
                .iter()
                .map(|s| SubmoduleRef {
                    name: s.name.clone(),
                    path: s.rel_path.clone(),
                })
                .collect(),
            features: self.features.clone(),
            releases: self.releases.clone(),
            hotfixes: self.hotfixes.clone(),
            supports: self.supports.clone(),
            included: self.included.clone(),
            excluded: self.excluded.clone(),
        }
    }

    /// Pre-order traversal of the node and every submodule subtree, as an
    /// explicit worklist rather than recursion.
    pub fn flatten(&self) -> Vec<&ConfigNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            // Reverse so declared submodule order is preserved on pop
            for sub in node.submodules.iter().rev() {
                stack.push(&sub.node);
            }
        }
        out
    }

    /// Locate a node anywhere in this subtree by its pathspec.
    pub fn node_at(&self, pathspec: &str) -> Option<&ConfigNode> {
        self.flatten().into_iter().find(|n| n.pathspec == pathspec)
    }

    /// Mutable lookup by pathspec, descending one submodule level per
    /// segment past this node's own pathspec.
    pub fn node_at_mut(&mut self, pathspec: &str) -> Option<&mut ConfigNode> {
        if pathspec == self.pathspec {
            return Some(self);
        }
        let rest = pathspec.strip_prefix(&format!("{}/", self.pathspec))?;
        let (head, _) = rest.split_once('/').unwrap_or((rest, ""));
        let head = head.to_string();
        let sub = self.submodules.iter_mut().find(|s| s.name == head)?;
        sub.node.node_at_mut(pathspec)
    }

    pub fn submodule(&self, name: &str) -> Option<&Submodule> {
        self.submodules.iter().find(|s| s.name == name)
    }

    pub fn feature(&self, name: &str) -> Option<&Feature> {
        self.features.iter().find(|f| f.name == name)
    }

    pub fn release(&self, name: &str) -> Option<&Release> {
        self.releases.iter().find(|r| r.name == name)
    }

    pub fn hotfix(&self, name: &str) -> Option<&Hotfix> {
        self.hotfixes.iter().find(|h| h.name == name)
    }

    pub fn support(&self, name: &str) -> Option<&Support> {
        self.supports.iter().find(|s| s.name == name)
    }

    /// Depth-first search over the whole subtree for every feature matching
    /// the fully-qualified name. Within each node, node-scoped features come
    /// before support-scoped ones; nodes are visited in pre-order.
    pub fn find_features(&self, fqn: &str) -> Vec<&Feature> {
        let mut out = Vec::new();
        for node in self.flatten() {
            out.extend(node.features.iter().filter(|f| f.name == fqn));
            for support in &node.supports {
                out.extend(support.features.iter().filter(|f| f.name == fqn));
            }
        }
        out
    }

    /// Whole-tree search for releases by fully-qualified name, with the same
    /// ordering contract as [ConfigNode::find_features].
    pub fn find_releases(&self, fqn: &str) -> Vec<&Release> {
        let mut out = Vec::new();
        for node in self.flatten() {
            out.extend(node.releases.iter().filter(|r| r.name == fqn));
            for support in &node.supports {
                out.extend(support.releases.iter().filter(|r| r.name == fqn));
            }
        }
        out
    }

    /// Every branch name this node knows about, including master/develop and
    /// support branch pairs. Used for uniqueness checks when opening lines.
    pub fn branch_names(&self) -> Vec<&str> {
        let mut names = vec![super::MASTER_BRANCH, super::DEVELOP_BRANCH];
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

    /// Append a feature to its owning collection (node-scoped, or the named
    /// support's), enforcing scope-level name uniqueness and node-level
    /// branch uniqueness.
    pub fn add_feature(&mut self, feature: Feature) -> Result<()> {
        self.check_new_entity(
            EntityKind::Feature,
            feature.support.as_deref(),
            &feature.name,
            &feature.branch_name,
        )?;
        match feature.support.clone() {
            Some(owner) => self.support_mut(&owner)?.features.push(feature),
            None => self.features.push(feature),
        }
        Ok(())
    }

    pub fn add_release(&mut self, release: Release) -> Result<()> {
        self.check_new_entity(
            EntityKind::Release,
            release.support.as_deref(),
            &release.name,
            &release.branch_name,
        )?;
        match release.support.clone() {
            Some(owner) => self.support_mut(&owner)?.releases.push(release),
            None => self.releases.push(release),
        }
        Ok(())
    }

    pub fn add_hotfix(&mut self, hotfix: Hotfix) -> Result<()> {
        self.check_new_entity(
            EntityKind::Hotfix,
            hotfix.support.as_deref(),
            &hotfix.name,
            &hotfix.branch_name,
        )?;
        match hotfix.support.clone() {
            Some(owner) => self.support_mut(&owner)?.hotfixes.push(hotfix),
            None => self.hotfixes.push(hotfix),
        }
        Ok(())
    }

    pub fn add_support(&mut self, support: Support) -> Result<()> {
        if self.support(&support.name).is_some() {
            return Err(TreeflowError::validation(format!(
                "support '{}' already exists on {}",
                support.name, self.pathspec
            )));
        }
        let taken = self.branch_names();
        for branch in [&support.master_branch_name, &support.develop_branch_name] {
            if taken.contains(&branch.as_str()) {
                return Err(TreeflowError::validation(format!(
                    "branch '{}' already exists on {}",
                    branch, self.pathspec
                )));
            }
        }
        self.supports.push(support);
        Ok(())
    }

    /// Detach an entity from its owning collection (node-scoped, or the
    /// named support's).
    pub fn remove_entity(
        &mut self,
        kind: EntityKind,
        support: Option<&str>,
        name: &str,
    ) -> Result<()> {
        let removed = match support {
            Some(owner) => {
                let support = self.support_mut(owner)?;
                match kind {
                    EntityKind::Feature => remove_named(&mut support.features, |f| &f.name, name),
                    EntityKind::Release => remove_named(&mut support.releases, |r| &r.name, name),
                    EntityKind::Hotfix => remove_named(&mut support.hotfixes, |h| &h.name, name),
                }
            }
            None => match kind {
                EntityKind::Feature => remove_named(&mut self.features, |f| &f.name, name),
                EntityKind::Release => remove_named(&mut self.releases, |r| &r.name, name),
                EntityKind::Hotfix => remove_named(&mut self.hotfixes, |h| &h.name, name),
            },
        };
        if removed {
            Ok(())
        } else {
            Err(TreeflowError::not_found(kind.as_str(), name))
        }
    }

    /// Remove a support line and return it so the caller can cascade removal
    /// of its state-store entries.
    pub fn remove_support(&mut self, name: &str) -> Result<Support> {
        let idx = self
            .supports
            .iter()
            .position(|s| s.name == name)
            .ok_or_else(|| TreeflowError::not_found("support", name))?;
        Ok(self.supports.remove(idx))
    }

    fn support_mut(&mut self, name: &str) -> Result<&mut Support> {
        let pathspec = self.pathspec.clone();
        self.supports
            .iter_mut()
            .find(|s| s.name == name)
            .ok_or_else(|| {
                TreeflowError::not_found("support", format!("{} on {}", name, pathspec))
            })
    }

    fn check_new_entity(
        &self,
        kind: EntityKind,
        support: Option<&str>,
        name: &str,
        branch_name: &str,
    ) -> Result<()> {
        let name_taken = match support {
            Some(owner) => {
                let support = self
                    .support(owner)
                    .ok_or_else(|| TreeflowError::not_found("support", owner))?;
                match kind {
                    EntityKind::Feature => support.features.iter().any(|f| f.name == name),
                    EntityKind::Release => support.releases.iter().any(|r| r.name == name),
                    EntityKind::Hotfix => support.hotfixes.iter().any(|h| h.name == name),
                }
            }
            None => match kind {
                EntityKind::Feature => self.feature(name).is_some(),
                EntityKind::Release => self.release(name).is_some(),
                EntityKind::Hotfix => self.hotfix(name).is_some(),
            },
        };
        if name_taken {
            return Err(TreeflowError::validation(format!(
                "{} '{}' already exists in its scope on {}",
                kind, name, self.pathspec
            )));
        }
        if self.branch_names().contains(&branch_name) {
            return Err(TreeflowError::validation(format!(
                "branch '{}' already exists on {}",
                branch_name, self.pathspec
            )));
        }
        Ok(())
    }

    fn check_identifiers_unique(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for node in self.flatten() {
            if !seen.insert(node.identifier.as_str()) {
                return Err(TreeflowError::validation(format!(
                    "identifier '{}' appears on more than one node",
                    node.identifier
                )));
            }
        }
        Ok(())
    }
}

fn remove_named<T>(items: &mut Vec<T>, name_of: impl Fn(&T) -> &str, name: &str) -> bool {
    match items.iter().position(|i| name_of(i) == name) {
        Some(idx) => {
            items.remove(idx);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CONFIG_FILE;
    use std::fs;
    use tempfile::TempDir;

    fn write_doc(dir: &Path, doc: &ConfigDocument) {
        fs::create_dir_all(dir).unwrap();
        fs::write(
            dir.join(CONFIG_FILE),
            toml::to_string_pretty(doc).unwrap(),
        )
        .unwrap();
    }

    fn tree_with_two_children() -> (TempDir, ConfigNode) {
        let dir = TempDir::new().unwrap();

        let mut root = ConfigDocument::new();
        root.submodules.push(SubmoduleRef {
            name: "api".to_string(),
            path: "services/api".to_string(),
        });
        root.submodules.push(SubmoduleRef {
            name: "web".to_string(),
            path: "web".to_string(),
        });
        write_doc(dir.path(), &root);

        let mut api = ConfigDocument::new();
        api.features
            .push(Feature::new("checkout-flow", "feature/checkout-flow", "abc"));
        write_doc(&dir.path().join("services/api"), &api);

        let web = ConfigDocument::new();
        write_doc(&dir.path().join("web"), &web);

        let node = ConfigNode::load_root(dir.path()).unwrap();
        (dir, node)
    }

    #[test]
    fn test_register_binds_path_and_pathspec() {
        let (dir, root) = tree_with_two_children();
        assert_eq!(root.pathspec(), "root");
        assert_eq!(root.path(), dir.path());

        let api = &root.submodules[0].node;
        assert_eq!(api.pathspec(), "root/api");
        assert_eq!(api.path(), dir.path().join("services/api"));
    }

    #[test]
    fn test_flatten_is_preorder() {
        let (_dir, root) = tree_with_two_children();
        let specs: Vec<&str> = root.flatten().iter().map(|n| n.pathspec()).collect();
        assert_eq!(specs, vec!["root", "root/api", "root/web"]);
    }

    #[test]
    fn test_node_at() {
        let (_dir, mut root) = tree_with_two_children();
        assert!(root.node_at("root/api").is_some());
        assert!(root.node_at("root/missing").is_none());
        assert_eq!(
            root.node_at_mut("root/web").unwrap().pathspec(),
            "root/web"
        );
        assert_eq!(root.node_at_mut("root").unwrap().pathspec(), "root");
    }

    #[test]
    fn test_support_entities_get_owner_bound() {
        let dir = TempDir::new().unwrap();
        let mut doc = ConfigDocument::new();
        let mut support = Support::new("1.x", "support/1.x/master", "support/1.x/develop");
        support
            .features
            .push(Feature::new("legacy-fix", "feature/1.x/legacy-fix", "abc"));
        doc.supports.push(support);
        write_doc(dir.path(), &doc);

        let root = ConfigNode::load_root(dir.path()).unwrap();
        assert_eq!(
            root.supports[0].features[0].support.as_deref(),
            Some("1.x")
        );
        assert_eq!(
            root.supports[0].features[0].uri(),
            "feature://1.x/legacy-fix"
        );
    }

    #[test]
    fn test_find_features_orders_node_scope_first() {
        let dir = TempDir::new().unwrap();
        let mut doc = ConfigDocument::new();
        doc.features.push(Feature::new("fix", "feature/fix", "a"));
        let mut support = Support::new("1.x", "support/1.x/master", "support/1.x/develop");
        support
            .features
            .push(Feature::new("fix", "feature/1.x/fix", "b"));
        doc.supports.push(support);
        write_doc(dir.path(), &doc);

        let root = ConfigNode::load_root(dir.path()).unwrap();
        let matches = root.find_features("fix");
        assert_eq!(matches.len(), 2);
        assert!(matches[0].support.is_none());
        assert_eq!(matches[1].support.as_deref(), Some("1.x"));
    }

    #[test]
    fn test_save_round_trips_declarative_fields() {
        let (dir, root) = tree_with_two_children();
        root.save().unwrap();
        let reloaded = ConfigNode::load_root(dir.path()).unwrap();
        assert_eq!(reloaded.identifier(), root.identifier());
        assert_eq!(reloaded.to_document(), root.to_document());
    }

    #[test]
    fn test_add_feature_rejects_duplicate_branch() {
        let (_dir, mut root) = tree_with_two_children();
        let api = root.node_at_mut("root/api").unwrap();
        let clash = Feature::new("other", "feature/checkout-flow", "abc");
        assert!(api.add_feature(clash).is_err());
    }

    #[test]
    fn test_remove_entity() {
        let (_dir, mut root) = tree_with_two_children();
        let api = root.node_at_mut("root/api").unwrap();
        api.remove_entity(EntityKind::Feature, None, "checkout-flow")
            .unwrap();
        assert!(api.feature("checkout-flow").is_none());
        assert!(api
            .remove_entity(EntityKind::Feature, None, "checkout-flow")
            .is_err());
    }

    #[test]
    fn test_duplicate_identifiers_rejected() {
        let dir = TempDir::new().unwrap();
        let mut root = ConfigDocument::new();
        root.submodules.push(SubmoduleRef {
            name: "api".to_string(),
            path: "api".to_string(),
        });
        write_doc(dir.path(), &root);

        let mut child = ConfigDocument::new();
        child.identifier = root.identifier.clone();
        write_doc(&dir.path().join("api"), &child);

        assert!(ConfigNode::load_root(dir.path()).is_err());
    }
}
