//! map file-system calls onto stat, directory-entry and content documents
pub mod content;
pub mod directory;
pub mod dispatcher;
pub mod filekind;
pub mod fs_layout;
pub mod inode_table;
pub mod path;
pub mod stat;
mod fs_api_impl;

pub use content::ContentStore;
pub use directory::{DirEntry, DirectoryStore};
pub use dispatcher::{Attributes, Caller, Dispatcher};
pub use filekind::FileKind;
pub use fs_layout::DocFs;
pub use stat::{MetadataStore, StatChange, StatRecord, TimeUpdate};

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    error::FsError,
    store::{AsyncStore, SyncAdapter},
};

pub const ROOT_PATH: &str = "/";
pub const ROOT_INODE: u64 = 1;
/// every collection lives in this scope
pub const DEFAULT_SCOPE: &str = "_default";
/// longest path accepted as a document key
pub const MAX_KEY_LEN: usize = 250;
/// largest value the store accepts for one document
pub const MAX_DOCUMENT_SIZE: usize = 20 * 1024 * 1024;
pub const DEFAULT_MAX_BLOCKS: u64 = 64;
/// most blocks a single file may span
pub const MAX_BLOCKS: u64 = 1 << 16;
/// how often a version-checked read-modify-write is attempted
pub const MAX_VERSION_RETRIES: usize = 8;

/// Size limits of one mounted filesystem.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub struct Limits {
    pub max_key_len: usize,
    /// bytes per content block, at most [MAX_DOCUMENT_SIZE]
    pub block_size: u64,
    /// at most [MAX_BLOCKS]
    pub max_blocks: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Limits {
            max_key_len: MAX_KEY_LEN,
            block_size: MAX_DOCUMENT_SIZE as u64,
            max_blocks: DEFAULT_MAX_BLOCKS,
        }
    }
}

impl Limits {
    /// the largest file the content blocks can hold
    /// # Example
    /// ```
    /// use docfs::fs::Limits;
    /// let limits = Limits { max_key_len: 250, block_size: 4096, max_blocks: 4 };
    /// assert_eq!(limits.max_file_len(), 16384);
    /// ```
    pub const fn max_file_len(&self) -> u64 {
        self.block_size.saturating_mul(self.max_blocks)
    }

    pub fn validate(&self) -> Result<(), FsError> {
        if self.block_size == 0
            || self.block_size > MAX_DOCUMENT_SIZE as u64
            || self.max_blocks == 0
            || self.max_blocks > MAX_BLOCKS
            || self.max_key_len == 0
        {
            return Err(FsError::InvalidArgument);
        }
        Ok(())
    }
}

/// Everything an operation needs to reach the store, passed explicitly into
/// each of the document stores.
#[derive(Clone)]
pub struct FsContext {
    adapter: SyncAdapter,
    limits: Limits,
}

impl FsContext {
    pub fn new(store: Arc<dyn AsyncStore>, limits: Limits) -> Result<Self, FsError> {
        limits.validate()?;
        Ok(FsContext {
            adapter: SyncAdapter::new(store, DEFAULT_SCOPE),
            limits,
        })
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn adapter(&self) -> &SyncAdapter {
        &self.adapter
    }

    pub fn metadata(&self) -> MetadataStore<'_> {
        MetadataStore::new(&self.adapter)
    }

    pub fn directories(&self) -> DirectoryStore<'_> {
        DirectoryStore::new(&self.adapter)
    }

    pub fn content(&self) -> ContentStore<'_> {
        ContentStore::new(&self.adapter, &self.limits)
    }

    /// ask the store to persist its state
    pub fn flush(&self) -> anyhow::Result<()> {
        self.adapter.store().flush()
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limits_validation() {
        assert!(Limits::default().validate().is_ok());
        let too_big = Limits {
            block_size: MAX_DOCUMENT_SIZE as u64 + 1,
            ..Limits::default()
        };
        assert_eq!(too_big.validate(), Err(FsError::InvalidArgument));
        let no_blocks = Limits {
            max_blocks: 0,
            ..Limits::default()
        };
        assert_eq!(no_blocks.validate(), Err(FsError::InvalidArgument));
        let too_many_blocks = Limits {
            block_size: 8,
            max_blocks: u64::MAX,
            ..Limits::default()
        };
        assert_eq!(too_many_blocks.validate(), Err(FsError::InvalidArgument));
        let largest = Limits {
            max_blocks: MAX_BLOCKS,
            ..Limits::default()
        };
        assert!(largest.validate().is_ok());
        assert_eq!(largest.max_file_len(), MAX_DOCUMENT_SIZE as u64 * MAX_BLOCKS);
    }

    #[test]
    fn test_context_refuses_unbounded_limits() {
        let store = Arc::new(crate::store::MemoryStore::new(MAX_DOCUMENT_SIZE));
        let limits = Limits {
            block_size: 8,
            max_blocks: u64::MAX,
            ..Limits::default()
        };
        assert!(matches!(
            FsContext::new(store, limits),
            Err(FsError::InvalidArgument)
        ));
    }
}
