//! what a mounted filesystem holds in memory
use std::{ffi::OsStr, sync::Arc};

use crate::store::AsyncStore;

use super::{
    dispatcher::{Caller, Dispatcher},
    inode_table::InodeTable,
    path, FsContext, Limits, ROOT_PATH,
};

type Errno = i32;

/// It has the following parts:
/// - a [Dispatcher] running every call against the store
/// - the inode numbers the kernel knows each path by
pub struct DocFs {
    dispatcher: Dispatcher,
    inodes: InodeTable,
}

impl DocFs {
    /// create a new filesystem instance over `store`
    /// # Params
    /// - `store`: the backing document store
    /// - `limits`: the key and content limits the store was created with
    /// # Return
    /// an [anyhow::Result] type,\
    /// which contains a [DocFs] instance with the root directory in place
    pub fn new(store: Arc<dyn AsyncStore>, limits: Limits) -> anyhow::Result<Self> {
        let dispatcher = Dispatcher::new(FsContext::new(store, limits)?);
        dispatcher.bootstrap()?;
        Ok(DocFs {
            dispatcher,
            inodes: InodeTable::new(),
        })
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// preferred I/O size reported to the kernel
    pub fn block_size(&self) -> u32 {
        self.dispatcher
            .context()
            .limits()
            .block_size
            .min(u32::MAX as u64) as u32
    }

    pub fn path_of(&self, ino: u64) -> Result<String, Errno> {
        self.inodes
            .path_of(ino)
            .map(str::to_string)
            .ok_or(libc::ENOENT)
    }

    /// the path of `name` inside the directory numbered `parent`
    pub fn child_path(&self, parent: u64, name: &OsStr) -> Result<String, Errno> {
        let parent = self.path_of(parent)?;
        let name = name.to_str().ok_or(libc::EINVAL)?;
        Ok(path::join(&parent, name))
    }

    /// the directory holding `path`; the root is its own parent
    pub fn parent_path(&self, path: &str) -> String {
        path::split(path, usize::MAX)
            .map(|(parent, _)| parent)
            .unwrap_or_else(|_| ROOT_PATH.to_string())
    }

    pub fn ino_of(&mut self, path: &str) -> u64 {
        self.inodes.ino_of(path)
    }

    pub fn forget(&mut self, path: &str) {
        self.inodes.forget(path)
    }

    /// attributes of `path` as the kernel wants them, numbering it if needed
    pub fn file_attr(&mut self, path: &str, caller: Caller) -> Result<fuser::FileAttr, Errno> {
        let attributes = self
            .dispatcher
            .getattr(path, caller)
            .map_err(|e| e.errno())?;
        let ino = self.inodes.ino_of(path);
        Ok(attributes.to_file_attr(ino, self.block_size()))
    }
}
