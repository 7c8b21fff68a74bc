// ~/src/data_loaders/yaml.rs

use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use serde::Serialize;
use serde_yaml::Value;

use crate::error::Result;

/// Reads and parses a YAML document.
///
/// Returns `None` when the file is missing, unreadable or not valid YAML.
/// JSON documents parse too.
pub fn load_yaml(path: &Path) -> Option<Value> {
    let txt = fs::read_to_string(path).ok()?;
    serde_yaml::from_str(&txt).ok()
}

/// Serializes `value` next to `path` and renames it into place, so a crash
/// mid-write leaves either the old document or the new one.
pub fn write_yaml_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let txt = serde_yaml::to_string(value)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = tmp_path(path);
    let written = File::create(&tmp).and_then(|mut file| {
        file.write_all(txt.as_bytes())?;
        file.sync_all()
    });

    if let Err(e) = written.and_then(|_| fs::rename(&tmp, path)) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }

    Ok(())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn missing_file_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_yaml(&dir.path().join("absent.yaml")).is_none());
    }

    #[test]
    fn invalid_yaml_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "key: [unterminated").unwrap();
        assert!(load_yaml(&path).is_none());
    }

    #[test]
    fn json_documents_are_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.json");
        fs::write(&path, r#"{"change_interval": 5, "run_at_startup": true}"#).unwrap();
        let value = load_yaml(&path).unwrap();
        assert_eq!(value["change_interval"].as_i64(), Some(5));
        assert_eq!(value["run_at_startup"].as_bool(), Some(true));
    }

    #[test]
    fn atomic_write_replaces_existing_file_and_leaves_no_temp() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("doc.yaml");

        let mut first = BTreeMap::new();
        first.insert("value", 1);
        write_yaml_atomic(&path, &first).unwrap();

        let mut second = BTreeMap::new();
        second.insert("value", 2);
        write_yaml_atomic(&path, &second).unwrap();

        let value = load_yaml(&path).unwrap();
        assert_eq!(value["value"].as_i64(), Some(2));
        assert!(!tmp_path(&path).exists());
    }

    #[test]
    fn write_into_a_file_path_parent_fails() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, "not a directory").unwrap();

        let result = write_yaml_atomic(&blocker.join("doc.yaml"), &BTreeMap::<String, i32>::new());
        assert!(result.is_err());
    }
}
