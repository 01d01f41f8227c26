//! Per-node workflow state store.
//!
//! Progress markers live in a nested key/value document kept separate from
//! the declarative configuration, one per node checkout. Keys are
//! slash-delimited paths into nested tables. Every access is a full
//! read-modify-write of the document; nothing is cached between calls.

use std::fs;
use std::path::PathBuf;

use toml::value::Table;
use toml::Value;

use crate::config::{ConfigNode, STATE_FILE};
use crate::error::{Result, TreeflowError};
use crate::filter;

/// Handle on one node's state document.
pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn for_node(node: &ConfigNode) -> StateStore {
        StateStore {
            path: node.path().join(STATE_FILE),
        }
    }

    fn read(&self) -> Result<Table> {
        if !self.path.exists() {
            return Ok(Table::new());
        }
        let text = fs::read_to_string(&self.path)?;
        let table: Table = toml::from_str(&text)?;
        Ok(table)
    }

    fn write(&self, table: &Table) -> Result<()> {
        if table.is_empty() {
            if self.path.exists() {
                fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        fs::write(&self.path, toml::to_string_pretty(table)?)?;
        Ok(())
    }

    /// Read a boolean marker, failing if the stored value has another type.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(Value::Boolean(b)) => Ok(Some(b)),
            Some(other) => Err(type_mismatch(key, "boolean", &other)),
        }
    }

    pub fn get_str(&self, key: &str) -> Result<Option<String>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s)),
            Some(other) => Err(type_mismatch(key, "string", &other)),
        }
    }

    pub fn get_int(&self, key: &str) -> Result<Option<i64>> {
        match self.get_value(key)? {
            None => Ok(None),
            Some(Value::Integer(i)) => Ok(Some(i)),
            Some(other) => Err(type_mismatch(key, "integer", &other)),
        }
    }

    /// Set a boolean marker. Writing `false` deletes the key: absent and
    /// false are the same answer on read-back resumption.
    pub fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        if value {
            self.set_value(key, Some(Value::Boolean(true)))
        } else {
            self.set_value(key, None)
        }
    }

    /// Set a string value; the empty string deletes the key.
    pub fn set_str(&self, key: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            self.set_value(key, None)
        } else {
            self.set_value(key, Some(Value::String(value.to_string())))
        }
    }

    pub fn set_int(&self, key: &str, value: i64) -> Result<()> {
        self.set_value(key, Some(Value::Integer(value)))
    }

    pub fn remove(&self, key: &str) -> Result<()> {
        self.set_value(key, None)
    }

    /// Apply a value to every flattened key path matching the glob. A `None`
    /// value deletes the matching keys; used to clear whole marker families
    /// like `feature/x/closing/*` in one pass.
    ///
    /// Falsy values delete here exactly as they do in the single-key
    /// setters, so absent and false stay the same answer on read-back.
    pub fn set_matching(&self, glob: &str, value: Option<Value>) -> Result<()> {
        let value = match value {
            Some(Value::Boolean(false)) => None,
            Some(Value::String(s)) if s.is_empty() => None,
            other => other,
        };
        let matcher = filter::compile_glob(glob)?;
        let table = self.read()?;
        let keys: Vec<String> = flatten_keys(&table, "")
            .into_iter()
            .filter(|k| matcher.is_match(k))
            .collect();
        for key in keys {
            self.set_value(&key, value.clone())?;
        }
        Ok(())
    }

    fn get_value(&self, key: &str) -> Result<Option<Value>> {
        let table = self.read()?;
        let mut current = &table;
        let mut segments = key.split('/').peekable();
        while let Some(segment) = segments.next() {
            let entry = match current.get(segment) {
                Some(entry) => entry,
                None => return Ok(None),
            };
            if segments.peek().is_none() {
                return Ok(Some(entry.clone()));
            }
            current = entry.as_table().ok_or_else(|| {
                type_mismatch(key, "table", entry)
            })?;
        }
        Ok(None)
    }

    fn set_value(&self, key: &str, value: Option<Value>) -> Result<()> {
        let mut table = self.read()?;
        let segments: Vec<&str> = key.split('/').collect();
        apply(&mut table, &segments, key, value)?;
        self.write(&table)
    }
}

/// Descend into `table` along `segments`, creating intermediate tables on
/// write and pruning tables emptied by a delete.
fn apply(table: &mut Table, segments: &[&str], key: &str, value: Option<Value>) -> Result<()> {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return Ok(()),
    };
    let head = head.to_string();

    if rest.is_empty() {
        match value {
            Some(value) => {
                table.insert(head, value);
            }
            None => {
                table.remove(&head);
            }
        }
        return Ok(());
    }

    if value.is_none() && !table.contains_key(&head) {
        // Deleting below a map that does not exist is a no-op
        return Ok(());
    }

    let entry = table
        .entry(head.clone())
        .or_insert_with(|| Value::Table(Table::new()));
    let nested = match entry {
        Value::Table(nested) => nested,
        other => return Err(type_mismatch(key, "table", other)),
    };
    apply(nested, rest, key, value)?;

    if nested.is_empty() {
        table.remove(&head);
    }
    Ok(())
}

/// Flattened slash-paths of every leaf in the document.
fn flatten_keys(table: &Table, prefix: &str) -> Vec<String> {
    let mut out = Vec::new();
    for (name, value) in table {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}/{}", prefix, name)
        };
        match value {
            Value::Table(nested) => out.extend(flatten_keys(nested, &path)),
            _ => out.push(path),
        }
    }
    out
}

fn type_mismatch(key: &str, expected: &'static str, found: &Value) -> TreeflowError {
    TreeflowError::TypeMismatch {
        key: key.to_string(),
        expected,
        found: found.type_str(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigDocument;
    use tempfile::TempDir;

    fn store() -> (TempDir, StateStore) {
        let dir = TempDir::new().unwrap();
        let node = ConfigNode::register(
            ConfigDocument::new(),
            dir.path().to_path_buf(),
            "root".to_string(),
        )
        .unwrap();
        let store = StateStore::for_node(&node);
        (dir, store)
    }

    #[test]
    fn test_get_missing_is_none() {
        let (_dir, store) = store();
        assert_eq!(store.get_bool("feature/x/closing/develop").unwrap(), None);
        assert_eq!(store.get_str("active").unwrap(), None);
    }

    #[test]
    fn test_set_and_get_nested_bool() {
        let (_dir, store) = store();
        store.set_bool("feature/x/closing/develop", true).unwrap();
        assert_eq!(
            store.get_bool("feature/x/closing/develop").unwrap(),
            Some(true)
        );
        // Sibling keys are untouched
        assert_eq!(store.get_bool("feature/x/closing/master").unwrap(), None);
    }

    #[test]
    fn test_false_write_deletes_leaf() {
        let (dir, store) = store();
        store.set_bool("feature/x/closing/develop", true).unwrap();
        store.set_bool("feature/x/closing/develop", false).unwrap();
        assert_eq!(store.get_bool("feature/x/closing/develop").unwrap(), None);
        // Emptied document disappears from disk entirely
        assert!(!dir.path().join(STATE_FILE).exists());
    }

    #[test]
    fn test_type_mismatch_surfaces() {
        let (_dir, store) = store();
        store.set_str("active", "feature://x").unwrap();
        assert!(matches!(
            store.get_bool("active"),
            Err(TreeflowError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_intermediate_non_table_is_mismatch() {
        let (_dir, store) = store();
        store.set_str("feature", "oops").unwrap();
        assert!(store.get_bool("feature/x/closing/develop").is_err());
    }

    #[test]
    fn test_state_survives_reopen() {
        let (dir, store) = store();
        store.set_str("active", "release://1.2.0").unwrap();
        store.set_int("attempts", 2).unwrap();
        drop(store);

        let node = ConfigNode::register(
            ConfigDocument::new(),
            dir.path().to_path_buf(),
            "root".to_string(),
        )
        .unwrap();
        let reopened = StateStore::for_node(&node);
        assert_eq!(
            reopened.get_str("active").unwrap(),
            Some("release://1.2.0".to_string())
        );
        assert_eq!(reopened.get_int("attempts").unwrap(), Some(2));
    }

    #[test]
    fn test_set_matching_clears_marker_family() {
        let (_dir, store) = store();
        store.set_bool("release/1.2.0/closing/develop", true).unwrap();
        store.set_bool("release/1.2.0/closing/master", true).unwrap();
        store.set_str("active", "release://1.2.0").unwrap();

        store
            .set_matching("release/1.2.0/closing/*", None)
            .unwrap();

        assert_eq!(
            store.get_bool("release/1.2.0/closing/develop").unwrap(),
            None
        );
        assert_eq!(
            store.get_bool("release/1.2.0/closing/master").unwrap(),
            None
        );
        // Unrelated keys survive
        assert!(store.get_str("active").unwrap().is_some());
    }

    #[test]
    fn test_set_matching_can_bulk_set() {
        let (_dir, store) = store();
        store.set_bool("feature/a/closing/develop", true).unwrap();
        store.set_bool("feature/b/closing/develop", true).unwrap();
        store
            .set_matching("feature/*/closing/develop", Some(Value::Integer(2)))
            .unwrap();
        assert_eq!(store.get_int("feature/a/closing/develop").unwrap(), Some(2));
        assert_eq!(store.get_int("feature/b/closing/develop").unwrap(), Some(2));
    }

    #[test]
    fn test_set_matching_falsy_write_deletes_like_the_setters() {
        let (dir, store) = store();
        store.set_bool("feature/a/closing/develop", true).unwrap();
        store.set_bool("feature/b/closing/develop", true).unwrap();
        store
            .set_matching("feature/*/closing/develop", Some(Value::Boolean(false)))
            .unwrap();
        // Absent and false must stay the same answer on read-back
        assert_eq!(store.get_bool("feature/a/closing/develop").unwrap(), None);
        assert_eq!(store.get_bool("feature/b/closing/develop").unwrap(), None);
        assert!(!dir.path().join(STATE_FILE).exists());

        store.set_str("active", "feature://x").unwrap();
        store
            .set_matching("active", Some(Value::String(String::new())))
            .unwrap();
        assert_eq!(store.get_str("active").unwrap(), None);
    }
}
