//! the file-system call table
//!
//! Every call is a short, blocking sequence of store operations over the
//! metadata, directory-entry and content documents. Multi-step calls are not
//! transactional: a failure part way leaves the earlier steps in place.
use log::{error, info, warn};

use crate::error::FsError;

use super::{
    path, stat::TimeUpdate, FsContext, Limits, StatChange, StatRecord, ROOT_PATH,
};

const ROOT_MODE: u32 = libc::S_IFDIR as u32 | 0o755;

/// The user a call is made on behalf of; reported as owner of every path.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
}

impl Caller {
    /// the effective user and group of this process
    pub fn current() -> Self {
        Caller {
            uid: users::get_effective_uid(),
            gid: users::get_effective_gid(),
        }
    }

    /// The caller of a kernel request. Requests the kernel makes on its own
    /// carry pid 0 and no real user; those are answered as this process.
    pub fn of_request(uid: u32, gid: u32, pid: u32) -> Self {
        if pid == 0 {
            Caller::current()
        } else {
            Caller { uid, gid }
        }
    }
}

/// What `getattr` hands back: the stored record plus its owner.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Attributes {
    pub stat: StatRecord,
    pub owner: Caller,
}

impl Attributes {
    pub fn to_file_attr(&self, ino: u64, block_size: u32) -> fuser::FileAttr {
        self.stat
            .to_file_attr(ino, self.owner.uid, self.owner.gid, block_size)
    }
}

pub struct Dispatcher {
    ctx: FsContext,
}

impl Dispatcher {
    pub fn new(ctx: FsContext) -> Self {
        Dispatcher { ctx }
    }

    pub fn context(&self) -> &FsContext {
        &self.ctx
    }

    fn limits(&self) -> &Limits {
        self.ctx.limits()
    }

    fn check_len(&self, path: &str) -> Result<(), FsError> {
        path::check_len(path, self.limits().max_key_len)
    }

    fn split(&self, path: &str) -> Result<(String, String), FsError> {
        path::split(path, self.limits().max_key_len)
    }

    /// the stat of `path`, which must be a regular file
    fn file_stat(&self, path: &str) -> Result<StatRecord, FsError> {
        self.check_len(path)?;
        let (stat, _) = self.ctx.metadata().get(path)?;
        if stat.is_dir() {
            return Err(FsError::IsDirectory);
        }
        Ok(stat)
    }

    /// the parent of a path about to be created must be a directory
    fn require_directory(&self, path: &str) -> Result<(), FsError> {
        let (stat, _) = self.ctx.metadata().get(path)?;
        if !stat.is_dir() {
            return Err(FsError::NotDirectory);
        }
        Ok(())
    }

    /// Make sure the root directory exists: insert its stat and an empty
    /// dentry if it is missing, fail if `/` is not a directory.
    pub fn bootstrap(&self) -> Result<(), FsError> {
        match self.ctx.metadata().get(ROOT_PATH) {
            Ok((stat, _)) if stat.is_dir() => {}
            Ok((stat, _)) => {
                error!("root has mode {:o}, expected a directory", stat.mode);
                return Err(FsError::NotDirectory);
            }
            Err(FsError::NotFound) => {
                info!("bootstrapping root directory");
                self.ctx.metadata().insert(ROOT_PATH, ROOT_MODE)?;
            }
            Err(e) => return Err(e),
        }
        match self.ctx.directories().create(ROOT_PATH, ROOT_PATH) {
            Ok(_) | Err(FsError::AlreadyExists) => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn getattr(&self, path: &str, caller: Caller) -> Result<Attributes, FsError> {
        info!("getattr() called with path: {path:?}");
        self.check_len(path)?;
        let (stat, _) = self.ctx.metadata().get(path)?;
        Ok(Attributes {
            stat,
            owner: caller,
        })
    }

    /// Confirm `path` exists and its owner bits allow the access mode in
    /// `flags`. No content is fetched.
    pub fn open(&self, path: &str, flags: i32) -> Result<StatRecord, FsError> {
        info!("open() called with path: {path:?}, flags: {flags:o}");
        self.check_len(path)?;
        let (stat, _) = self.ctx.metadata().get(path)?;
        let (read, write) = match flags & libc::O_ACCMODE {
            libc::O_RDONLY => (true, false),
            libc::O_WRONLY => (false, true),
            libc::O_RDWR => (true, true),
            _ => return Err(FsError::InvalidArgument),
        };
        if write && stat.is_dir() {
            return Err(FsError::IsDirectory);
        }
        let permissions = stat.permissions();
        if (read && permissions & libc::S_IRUSR as u32 == 0)
            || (write && permissions & libc::S_IWUSR as u32 == 0)
        {
            return Err(FsError::PermissionDenied);
        }
        Ok(stat)
    }

    /// Create an empty regular file and list it in its parent.
    ///
    /// If listing fails after the stat was inserted the file keeps its
    /// metadata without being listed, and the error is returned.
    pub fn create(&self, path: &str, mode: u32) -> Result<StatRecord, FsError> {
        info!("create() called with path: {path:?}, mode: {mode:o}");
        let (parent, leaf) = self.split(path)?;
        if mode & libc::S_IFMT as u32 != libc::S_IFREG as u32 {
            return Err(FsError::InvalidArgument);
        }
        self.require_directory(&parent)?;
        let stat = self.ctx.metadata().insert(path, mode)?;
        self.list_child(&parent, &leaf)?;
        Ok(stat)
    }

    /// add `leaf` to the listing of `parent` unless a stale entry is there
    fn list_child(&self, parent: &str, leaf: &str) -> Result<(), FsError> {
        let directories = self.ctx.directories();
        if directories.get(parent)?.contains(leaf) {
            warn!("{leaf:?} is already listed in {parent:?}");
            return Ok(());
        }
        directories.add_child(parent, leaf)?;
        Ok(())
    }

    pub fn mkdir(&self, path: &str, mode: u32) -> Result<StatRecord, FsError> {
        info!("mkdir() called with path: {path:?}, mode: {mode:o}");
        let (parent, leaf) = self.split(path)?;
        self.require_directory(&parent)?;
        let mode = libc::S_IFDIR as u32 | (mode & !(libc::S_IFMT as u32));
        let stat = self.ctx.metadata().insert(path, mode)?;
        self.ctx.directories().create(path, &parent)?;
        self.list_child(&parent, &leaf)?;
        Ok(stat)
    }

    /// Remove a file: content, then its listing, then its stat.
    ///
    /// The first two steps are best effort so a half-created file can still
    /// be cleaned up; only the stat removal decides the result.
    pub fn unlink(&self, path: &str) -> Result<(), FsError> {
        info!("unlink() called with path: {path:?}");
        let (parent, leaf) = self.split(path)?;
        match self.ctx.metadata().get(path) {
            Ok((stat, _)) if stat.is_dir() => return Err(FsError::IsDirectory),
            Ok(_) => {}
            Err(e) => warn!("unlink of {path:?} without a readable stat: {e}"),
        }
        if let Err(e) = self.ctx.content().remove(path) {
            warn!("failed to remove content of {path:?}: {e}");
        }
        if let Err(e) = self.ctx.directories().remove_child(&parent, &leaf) {
            warn!("failed to unlist {leaf:?} from {parent:?}: {e}");
        }
        self.ctx.metadata().remove(path)
    }

    /// Remove an empty directory, with the same best-effort ordering as
    /// [Dispatcher::unlink].
    pub fn rmdir(&self, path: &str) -> Result<(), FsError> {
        info!("rmdir() called with path: {path:?}");
        let (parent, leaf) = self.split(path)?;
        let (stat, _) = self.ctx.metadata().get(path)?;
        if !stat.is_dir() {
            return Err(FsError::NotDirectory);
        }
        match self.ctx.directories().get(path) {
            Ok(entry) if !entry.children.is_empty() => return Err(FsError::NotEmpty),
            Ok(_) => {
                if let Err(e) = self.ctx.directories().remove(path) {
                    warn!("failed to remove dentry of {path:?}: {e}");
                }
            }
            Err(e) => warn!("rmdir of {path:?} without a readable dentry: {e}"),
        }
        if let Err(e) = self.ctx.directories().remove_child(&parent, &leaf) {
            warn!("failed to unlist {leaf:?} from {parent:?}: {e}");
        }
        self.ctx.metadata().remove(path)
    }

    /// Read up to `size` bytes at `offset`; reading past the end yields
    /// nothing. Marks the file accessed.
    pub fn read(&self, path: &str, offset: u64, size: u32) -> Result<Vec<u8>, FsError> {
        info!("read() called with path: {path:?}, offset: {offset}, size: {size}");
        let stat = self.file_stat(path)?;
        let length = (size as u64).min(stat.size.saturating_sub(offset));
        let data = if length == 0 {
            Vec::new()
        } else {
            self.ctx.content().read(path, offset, length)?
        };
        self.ctx.metadata().update(path, StatChange::Accessed)?;
        Ok(data)
    }

    /// Write `data` at `offset` and record the new size if the file grew.
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<usize, FsError> {
        info!(
            "write() called with path: {path:?}, offset: {offset}, len: {}",
            data.len()
        );
        let stat = self.file_stat(path)?;
        let end = offset
            .checked_add(data.len() as u64)
            .filter(|end| *end <= self.limits().max_file_len())
            .ok_or(FsError::FileTooLarge)?;
        let content = self.ctx.content();
        let change = if !data.is_empty() && end > stat.size {
            self.drop_unrecorded_tail(path, &stat)?;
            let grown = content.write(path, offset, data)?;
            StatChange::Size(grown.unwrap_or(end))
        } else {
            content.write(path, offset, data)?;
            StatChange::Modified
        };
        self.ctx.metadata().update(path, change)?;
        Ok(data.len())
    }

    /// Remove content past the recorded size, left there by a write that
    /// failed after storing some of its blocks. A file that grows must not
    /// pick those bytes up.
    fn drop_unrecorded_tail(&self, path: &str, stat: &StatRecord) -> Result<(), FsError> {
        self.ctx.content().truncate(path, stat.size)
    }

    /// Set the length of a file. Growing zero-fills the new tail so the
    /// recorded size always matches the stored content.
    pub fn truncate(&self, path: &str, size: u64) -> Result<StatRecord, FsError> {
        info!("truncate() called with path: {path:?}, size: {size}");
        let stat = self.file_stat(path)?;
        if size > self.limits().max_file_len() {
            return Err(FsError::FileTooLarge);
        }
        let content = self.ctx.content();
        if size < stat.size {
            content.truncate(path, size)?;
        } else if size > stat.size {
            self.drop_unrecorded_tail(path, &stat)?;
            let zeros = vec![0u8; self.limits().block_size.min(size - stat.size) as usize];
            let mut position = stat.size;
            while position < size {
                let len = zeros.len().min((size - position) as usize);
                content.write(path, position, &zeros[..len])?;
                position += len as u64;
            }
        }
        self.ctx.metadata().update(path, StatChange::Size(size))
    }

    pub fn chmod(&self, path: &str, mode: u32) -> Result<StatRecord, FsError> {
        info!("chmod() called with path: {path:?}, mode: {mode:o}");
        self.check_len(path)?;
        self.ctx.metadata().update(path, StatChange::Mode(mode))
    }

    /// `times` is `(access, modify)`; `None` sets both to now.
    pub fn utimens(
        &self,
        path: &str,
        times: Option<(TimeUpdate, TimeUpdate)>,
    ) -> Result<StatRecord, FsError> {
        info!("utimens() called with path: {path:?}, times: {times:?}");
        self.check_len(path)?;
        self.ctx.metadata().update(path, StatChange::Times(times))
    }

    /// List a directory: `.` and `..` first, then the children from index
    /// `offset` on, in insertion order.
    pub fn readdir(&self, path: &str, offset: usize) -> Result<Vec<String>, FsError> {
        info!("readdir() called with path: {path:?}, offset: {offset}");
        self.check_len(path)?;
        self.require_directory(path)?;
        let entry = self.ctx.directories().get(path)?;
        let mut names = vec![".".to_string(), "..".to_string()];
        names.extend(entry.children.into_iter().skip(offset));
        Ok(names)
    }
}
