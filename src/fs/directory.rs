use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::FsError,
    store::{Collection, SyncAdapter},
};

use super::MAX_VERSION_RETRIES;

/// The directory-entry document of one directory.
///
/// Stored as JSON with short field names:
/// ```json
/// { "cr": "/docs", "pr": "/", "ch": ["a.txt", "notes"] }
/// ```
/// Children are leaf names, in insertion order.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct DirEntry {
    #[serde(rename = "cr")]
    pub directory_path: String,
    #[serde(rename = "pr")]
    pub parent_path: String,
    #[serde(rename = "ch")]
    pub children: Vec<String>,
}

impl DirEntry {
    pub fn new(directory_path: impl Into<String>, parent_path: impl Into<String>) -> Self {
        DirEntry {
            directory_path: directory_path.into(),
            parent_path: parent_path.into(),
            children: Vec::new(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.children.iter().any(|child| child == name)
    }

    pub fn encode(&self) -> Result<Vec<u8>, FsError> {
        serde_json::to_vec(self).map_err(|e| FsError::Io(format!("encode dentry failed: {e}")))
    }

    /// Parse a stored document; a missing field or a non-list `ch` is
    /// corruption.
    pub fn decode(bytes: &[u8]) -> Result<Self, FsError> {
        serde_json::from_slice(bytes).map_err(|e| FsError::Corrupt(format!("bad dentry: {e}")))
    }
}

/// CRUD over the `dentries` collection.
pub struct DirectoryStore<'a> {
    adapter: &'a SyncAdapter,
}

impl<'a> DirectoryStore<'a> {
    pub fn new(adapter: &'a SyncAdapter) -> Self {
        DirectoryStore { adapter }
    }

    pub fn get(&self, directory_path: &str) -> Result<DirEntry, FsError> {
        self.get_versioned(directory_path).map(|(entry, _)| entry)
    }

    fn get_versioned(&self, directory_path: &str) -> Result<(DirEntry, u64), FsError> {
        let response = self.adapter.get(Collection::Dentries, directory_path)?;
        Ok((DirEntry::decode(&response.value)?, response.version))
    }

    /// Insert an empty entry for a new directory; fails with
    /// `AlreadyExists` if there is one.
    pub fn create(&self, directory_path: &str, parent_path: &str) -> Result<DirEntry, FsError> {
        let entry = DirEntry::new(directory_path, parent_path);
        self.adapter
            .insert(Collection::Dentries, directory_path, entry.encode()?)?;
        info!("created dentry for {directory_path:?} under {parent_path:?}");
        Ok(entry)
    }

    /// append `child_name` to the children of `directory_path`
    pub fn add_child(&self, directory_path: &str, child_name: &str) -> Result<DirEntry, FsError> {
        self.modify(directory_path, |entry| entry.children.push(child_name.to_owned()))
    }

    /// drop every child equal to `child_name`
    pub fn remove_child(&self, directory_path: &str, child_name: &str) -> Result<DirEntry, FsError> {
        self.modify(directory_path, |entry| {
            entry.children.retain(|child| child != child_name)
        })
    }

    pub fn remove(&self, directory_path: &str) -> Result<(), FsError> {
        self.adapter.remove(Collection::Dentries, directory_path)
    }

    /// Read-modify-write of the whole entry, written back against the
    /// version that was read and retried on a concurrent change.
    fn modify<F>(&self, directory_path: &str, change: F) -> Result<DirEntry, FsError>
    where
        F: Fn(&mut DirEntry),
    {
        for attempt in 1..=MAX_VERSION_RETRIES {
            let (mut entry, version) = self.get_versioned(directory_path)?;
            change(&mut entry);
            match self.adapter.replace(
                Collection::Dentries,
                directory_path,
                entry.encode()?,
                Some(version),
            ) {
                Ok(_) => return Ok(entry),
                Err(FsError::Conflict) => warn!(
                    "dentry of {directory_path:?} changed concurrently, attempt {attempt} of {MAX_VERSION_RETRIES}"
                ),
                Err(e) => return Err(e),
            }
        }
        Err(FsError::Conflict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::test_support::{interfering_context, memory_context, TEST_LIMITS};

    #[test]
    fn test_wire_format_keeps_short_field_names() -> anyhow::Result<()> {
        let mut entry = DirEntry::new("/docs", "/");
        entry.children.push("a.txt".into());
        let json: serde_json::Value = serde_json::from_slice(&entry.encode()?)?;
        assert_eq!(
            json,
            serde_json::json!({ "cr": "/docs", "pr": "/", "ch": ["a.txt"] })
        );
        Ok(())
    }

    #[test]
    fn test_decode_rejects_missing_children() {
        let result = DirEntry::decode(br#"{ "cr": "/", "pr": "/" }"#);
        assert!(matches!(result, Err(FsError::Corrupt(_))));
        let result = DirEntry::decode(br#"{ "cr": "/", "pr": "/", "ch": "oops" }"#);
        assert!(matches!(result, Err(FsError::Corrupt(_))));
        assert!(matches!(DirEntry::decode(b"not json"), Err(FsError::Corrupt(_))));
    }

    #[test]
    fn test_children_keep_insertion_order() -> anyhow::Result<()> {
        let ctx = memory_context(TEST_LIMITS);
        let directories = ctx.directories();
        directories.create("/", "/")?;
        for name in ["zeta", "alpha", "mid"] {
            directories.add_child("/", name)?;
        }
        assert_eq!(directories.get("/")?.children, vec!["zeta", "alpha", "mid"]);
        Ok(())
    }

    #[test]
    fn test_remove_child_drops_every_match() -> anyhow::Result<()> {
        let ctx = memory_context(TEST_LIMITS);
        let directories = ctx.directories();
        directories.create("/d", "/")?;
        directories.add_child("/d", "x")?;
        directories.add_child("/d", "y")?;
        directories.add_child("/d", "x")?;
        let entry = directories.remove_child("/d", "x")?;
        assert_eq!(entry.children, vec!["y"]);
        assert_eq!(directories.get("/d")?, entry);
        Ok(())
    }

    #[test]
    fn test_missing_directory() -> anyhow::Result<()> {
        let ctx = memory_context(TEST_LIMITS);
        let directories = ctx.directories();
        assert_eq!(directories.get("/nope"), Err(FsError::NotFound));
        assert_eq!(directories.add_child("/nope", "x"), Err(FsError::NotFound));
        directories.create("/d", "/")?;
        assert_eq!(directories.create("/d", "/"), Err(FsError::AlreadyExists));
        directories.remove("/d")?;
        assert_eq!(directories.remove("/d"), Err(FsError::NotFound));
        Ok(())
    }

    #[test]
    fn test_concurrent_change_does_not_lose_children() -> anyhow::Result<()> {
        let ctx = interfering_context(TEST_LIMITS, Collection::Dentries, 3);
        let directories = ctx.directories();
        directories.create("/", "/")?;
        directories.add_child("/", "a")?;
        directories.add_child("/", "b")?;
        assert_eq!(directories.get("/")?.children, vec!["a", "b"]);
        Ok(())
    }
}
