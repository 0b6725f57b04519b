//! inode numbers handed to the kernel, mapped to the paths they stand for
use std::collections::HashMap;

use super::{ROOT_INODE, ROOT_PATH};

/// Documents are keyed by path but the kernel talks in inode numbers, so
/// every path it has been told about gets a number here. The root is always
/// [ROOT_INODE].
#[derive(Debug)]
pub struct InodeTable {
    paths: HashMap<u64, String>,
    inodes: HashMap<String, u64>,
    next_inode: u64,
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

impl InodeTable {
    pub fn new() -> Self {
        let mut table = InodeTable {
            paths: HashMap::new(),
            inodes: HashMap::new(),
            next_inode: ROOT_INODE + 1,
        };
        table.paths.insert(ROOT_INODE, ROOT_PATH.to_string());
        table.inodes.insert(ROOT_PATH.to_string(), ROOT_INODE);
        table
    }

    /// the number of `path`, allocating one the first time it is seen
    pub fn ino_of(&mut self, path: &str) -> u64 {
        if let Some(ino) = self.inodes.get(path) {
            return *ino;
        }
        let ino = self.next_inode;
        self.next_inode += 1;
        self.paths.insert(ino, path.to_string());
        self.inodes.insert(path.to_string(), ino);
        ino
    }

    pub fn path_of(&self, ino: u64) -> Option<&str> {
        self.paths.get(&ino).map(String::as_str)
    }

    /// Drop a removed path. Its number is not reused.
    pub fn forget(&mut self, path: &str) {
        if path == ROOT_PATH {
            return;
        }
        if let Some(ino) = self.inodes.remove(path) {
            self.paths.remove(&ino);
        }
    }
}
