use std::{ffi::OsStr, time::Duration};

use fuser::{
    FileType, Filesystem, ReplyAttr, ReplyCreate, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyOpen, ReplyWrite, Request, TimeOrNow,
};
use log::{error, info, warn};

use super::{dispatcher::Caller, path, stat::TimeUpdate, DocFs};

/// attributes may change behind our back, so the kernel must not cache them
const TTL: Duration = Duration::new(0, 0);

fn caller_of(req: &Request<'_>) -> Caller {
    Caller::of_request(req.uid(), req.gid(), req.pid())
}

impl Filesystem for DocFs {
    fn init(
        &mut self,
        _req: &Request<'_>,
        _config: &mut fuser::KernelConfig,
    ) -> Result<(), libc::c_int> {
        info!("init() called");
        Ok(())
    }

    // to umount the filesystem
    fn destroy(&mut self) {
        info!("destroy() called");
        if let Err(e) = self.dispatcher().context().flush() {
            error!("failed to persist the store on unmount: {e:#}");
        }
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        info!("lookup() called with parent inode number: {parent} and name: {name:?}");
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.file_attr(&path, caller_of(req)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, reply: ReplyAttr) {
        info!("getattr() called with inode number: {ino}");
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.file_attr(&path, caller_of(req)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn setattr(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        mode: Option<u32>,
        uid: Option<u32>,
        gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<std::time::SystemTime>,
        fh: Option<u64>,
        _crtime: Option<std::time::SystemTime>,
        _chgtime: Option<std::time::SystemTime>,
        _bkuptime: Option<std::time::SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        info!(
            "setattr() called with inode number: {:?}, mode: {:?}, uid: {:?}, gid: {:?}, size: {:?}, atime: {:?}, mtime: {:?}, fh: {:?}",
            ino, mode, uid, gid, size, atime, mtime, fh
        );
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        if uid.is_some() || gid.is_some() {
            // every path is owned by whoever mounted it
            warn!("ignoring ownership change of {path:?}");
        }
        // the user wants to "chmod"
        if let Some(mode) = mode {
            if let Err(e) = self.dispatcher().chmod(&path, mode) {
                reply.error(e.errno());
                return;
            }
        }
        // the user wants to "truncate"
        if let Some(size) = size {
            if let Err(e) = self.dispatcher().truncate(&path, size) {
                reply.error(e.errno());
                return;
            }
        }
        // the user wants to "utimens"
        if atime.is_some() || mtime.is_some() {
            let (Ok(accessed), Ok(modified)) =
                (TimeUpdate::try_from(atime), TimeUpdate::try_from(mtime))
            else {
                reply.error(libc::EINVAL);
                return;
            };
            if let Err(e) = self
                .dispatcher()
                .utimens(&path, Some((accessed, modified)))
            {
                reply.error(e.errno());
                return;
            }
        }
        match self.file_attr(&path, caller_of(req)) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(errno) => reply.error(errno),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        info!("open() called with inode number: {ino}, flags: {flags:o}");
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.dispatcher().open(&path, flags) {
            Ok(_) => reply.opened(0, 0),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn create(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        _flags: i32,
        reply: ReplyCreate,
    ) {
        info!("create() called with parent inode number: {parent} and name: {name:?}");
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        if let Err(e) = self.dispatcher().create(&path, mode & !umask) {
            reply.error(e.errno());
            return;
        }
        match self.file_attr(&path, caller_of(req)) {
            Ok(attr) => reply.created(&TTL, &attr, 0, 0, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn mkdir(
        &mut self,
        req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        mode: u32,
        umask: u32,
        reply: ReplyEntry,
    ) {
        info!("mkdir() called with parent inode number: {parent} and name: {name:?}");
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        if let Err(e) = self.dispatcher().mkdir(&path, mode & !umask) {
            reply.error(e.errno());
            return;
        }
        match self.file_attr(&path, caller_of(req)) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(errno) => reply.error(errno),
        }
    }

    fn unlink(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        info!("unlink() called with parent inode number: {parent} and name: {name:?}");
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.dispatcher().unlink(&path) {
            Ok(()) => {
                self.forget(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    fn rmdir(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEmpty) {
        info!("rmdir() called with parent inode number: {parent} and name: {name:?}");
        let path = match self.child_path(parent, name) {
            Ok(path) => path,
            Err(errno) => {
                reply.error(errno);
                return;
            }
        };
        match self.dispatcher().rmdir(&path) {
            Ok(()) => {
                self.forget(&path);
                reply.ok();
            }
            Err(e) => reply.error(e.errno()),
        }
    }

    // to read from a file
    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        info!("read() called with inode number: {ino}, fh: {fh}, offset: {offset}, size: {size}");
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.dispatcher().read(&path, offset as u64, size) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(e.errno()),
        }
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        info!(
            "write() called with inode number: {ino}, fh: {fh}, offset: {offset}, len: {}",
            data.len()
        );
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        match self.dispatcher().write(&path, offset as u64, data) {
            Ok(written) => reply.written(written as u32),
            Err(e) => reply.error(e.errno()),
        }
    }

    /// Entry offsets given to the kernel are 1 for `.`, 2 for `..` and
    /// `n + 3` for the child at index `n`.
    fn readdir(
        &mut self,
        req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        info!("readdir() called with inode number: {ino}, offset: {offset}");
        if offset < 0 {
            reply.error(libc::EINVAL);
            return;
        }
        let Ok(path) = self.path_of(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let first_child = (offset as usize).saturating_sub(2);
        let names = match self.dispatcher().readdir(&path, first_child) {
            Ok(names) => names,
            Err(e) => {
                reply.error(e.errno());
                return;
            }
        };
        for (index, name) in names.iter().enumerate() {
            let entry_offset = match index {
                0 | 1 => index as i64 + 1,
                _ => (first_child + index + 1) as i64,
            };
            if entry_offset <= offset {
                continue;
            }
            let (entry_ino, kind) = match name.as_str() {
                "." => (ino, FileType::Directory),
                ".." => {
                    let parent = self.parent_path(&path);
                    (self.ino_of(&parent), FileType::Directory)
                }
                child => {
                    let child_path = path::join(&path, child);
                    let kind = self
                        .dispatcher()
                        .getattr(&child_path, caller_of(req))
                        .map(|attributes| attributes.stat.file_kind())
                        .unwrap_or_default();
                    (self.ino_of(&child_path), kind.into())
                }
            };
            let buffer_full: bool = reply.add(entry_ino, entry_offset, kind, name);
            if buffer_full {
                break;
            }
        }
        reply.ok();
    }
}
