//! Loads one or more data files into a single [`FullDataSet`].
//!
//! A load is all or nothing: any unreadable file, parse error, or key defined
//! twice rejects the whole load.

use std::path::{Path, PathBuf};

use flagstore_core::{CoreError, DataBuilder, FullDataSet};

use crate::error::{LoadError, Result};
use crate::parse;

/// Reads and merges a fixed list of data files.
#[derive(Debug, Clone)]
pub struct DataLoader {
    files: Vec<PathBuf>,
}

impl DataLoader {
    pub fn new<P: Into<PathBuf>>(files: impl IntoIterator<Item = P>) -> Self {
        Self {
            files: files.into_iter().map(Into::into).collect(),
        }
    }

    /// The files this loader reads, in load order.
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Read every file and merge the results.
    pub fn load(&self) -> Result<FullDataSet> {
        let mut builder = DataBuilder::new();
        for path in &self.files {
            load_file(path, &mut builder)?;
        }
        Ok(builder.build())
    }
}

fn load_file(path: &Path, builder: &mut DataBuilder) -> Result<()> {
    let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let data = parse::parse_file(path, &content)?;
    for (kind, item) in parse::into_items(path, data)? {
        let key = item.key().to_string();
        builder.try_add(kind, item).map_err(|e| match e {
            CoreError::DuplicateKey { kind, key } => LoadError::DuplicateKey {
                path: path.to_path_buf(),
                kind,
                key,
            },
            other => LoadError::InvalidItem {
                path: path.to_path_buf(),
                kind,
                key,
                reason: other.to_string(),
            },
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flagstore_core::{FEATURES, SEGMENTS};
    use proptest::prelude::*;
    use std::fs;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"flags": {"f1": {"version": 2}}}"#);
        let b = write(
            dir.path(),
            "b.yaml",
            "flagValues:\n  f2: 42\nsegments:\n  s1:\n    included: [x]\n",
        );

        let data = DataLoader::new([a, b]).load().unwrap();
        assert_eq!(data.item_count(), 3);
        assert_eq!(data.get(FEATURES, "f1").unwrap().version(), 2);
        assert_eq!(data.get(FEATURES, "f2").unwrap().data()["variations"][0], 42);
        assert!(data.get(SEGMENTS, "s1").is_some());
    }

    #[test]
    fn test_duplicate_key_across_files_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"flags": {"f1": {"version": 1}}}"#);
        let b = write(dir.path(), "b.json", r#"{"flags": {"f1": {"version": 2}}}"#);

        let err = DataLoader::new([a, b.clone()]).load().unwrap_err();
        match err {
            LoadError::DuplicateKey { path, kind, key } => {
                assert_eq!(path, b);
                assert_eq!(kind, FEATURES);
                assert_eq!(key, "f1");
            }
            other => panic!("expected duplicate key, got {other:?}"),
        }
    }

    #[test]
    fn test_flag_value_duplicates_flag() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(
            dir.path(),
            "a.json",
            r#"{"flags": {"f1": {}}, "flagValues": {"f1": true}}"#,
        );
        assert!(matches!(
            DataLoader::new([a]).load(),
            Err(LoadError::DuplicateKey { .. })
        ));
    }

    #[test]
    fn test_same_key_in_different_kinds_allowed() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.json", r#"{"flags": {"x": {}}}"#);
        let b = write(dir.path(), "b.json", r#"{"segments": {"x": {}}}"#);
        let data = DataLoader::new([a, b]).load().unwrap();
        assert_eq!(data.item_count(), 2);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(matches!(
            DataLoader::new([missing]).load(),
            Err(LoadError::Io { .. })
        ));
    }

    #[test]
    fn test_no_files_loads_empty_data_set() {
        let data = DataLoader::new(Vec::<PathBuf>::new()).load().unwrap();
        assert!(data.is_empty());
        assert_eq!(data.kinds().count(), 2);
    }

    proptest! {
        #[test]
        fn test_overlapping_keys_never_partially_load(
            first in prop::collection::btree_set("[a-e]", 0..5),
            second in prop::collection::btree_set("[a-e]", 0..5),
        ) {
            let dir = tempfile::tempdir().unwrap();
            let to_json = |keys: &std::collections::BTreeSet<String>| {
                let flags: serde_json::Map<String, serde_json::Value> = keys
                    .iter()
                    .map(|k| (k.clone(), serde_json::json!({})))
                    .collect();
                serde_json::json!({ "flags": flags }).to_string()
            };
            let a = write(dir.path(), "a.json", &to_json(&first));
            let b = write(dir.path(), "b.json", &to_json(&second));

            let result = DataLoader::new([a, b]).load();
            if first.is_disjoint(&second) {
                let data = result.unwrap();
                prop_assert_eq!(data.item_count(), first.len() + second.len());
            } else {
                let is_duplicate = matches!(result, Err(LoadError::DuplicateKey { .. }));
                prop_assert!(is_duplicate);
            }
        }
    }
}
