//! per-path metadata records and their version-checked updates
use bincode::config;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{
    error::FsError,
    store::{Collection, SyncAdapter},
    utils::time_util::{self, TimeSpec},
};

use super::{filekind::FileKind, MAX_VERSION_RETRIES};

/// Encoded size of a [StatRecord]; any other payload length is corruption.
pub const STAT_RECORD_SIZE: usize = 48;

/// The metadata document stored for every existing path.
///
/// Encoded with the legacy (fixed-int, little-endian) bincode configuration,
/// which gives it a fixed width of [STAT_RECORD_SIZE] bytes.
#[derive(Serialize, Deserialize, Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct StatRecord {
    /// file type and permission bits
    pub mode: u32,
    pub accessed_at: TimeSpec,
    pub modified_at: TimeSpec,
    pub changed_at: TimeSpec,
    /// length of the file content, 0 for directories
    pub size: u64,
}

/// how one timestamp is treated by a `utimens` call
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TimeUpdate {
    Now,
    Omit,
    At(TimeSpec),
}

impl TryFrom<Option<fuser::TimeOrNow>> for TimeUpdate {
    type Error = FsError;
    fn try_from(value: Option<fuser::TimeOrNow>) -> Result<Self, Self::Error> {
        match value {
            None => Ok(TimeUpdate::Omit),
            Some(fuser::TimeOrNow::Now) => Ok(TimeUpdate::Now),
            Some(fuser::TimeOrNow::SpecificTime(time)) => TimeSpec::try_from(time)
                .map(TimeUpdate::At)
                .map_err(|_| FsError::InvalidArgument),
        }
    }
}

/// a single field-level change applied by [MetadataStore::update]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StatChange {
    /// content length changed
    Size(u64),
    /// content rewritten without changing its length
    Modified,
    Accessed,
    /// permission bits; the file type bits are kept
    Mode(u32),
    /// `(access, modify)`; `None` sets both to now
    Times(Option<(TimeUpdate, TimeUpdate)>),
}

impl StatRecord {
    /// a fresh record with all three timestamps set to `now`
    pub fn new(mode: u32, now: TimeSpec) -> Self {
        StatRecord {
            mode,
            accessed_at: now,
            modified_at: now,
            changed_at: now,
            size: 0,
        }
    }

    pub fn file_kind(&self) -> FileKind {
        FileKind::from_mode(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.file_kind() == FileKind::Directory
    }

    pub fn is_regular_file(&self) -> bool {
        self.file_kind() == FileKind::RegularFile
    }

    /// the permission bits without the file type
    pub fn permissions(&self) -> u32 {
        self.mode & !(libc::S_IFMT as u32)
    }

    pub fn encode(&self) -> Result<Vec<u8>, FsError> {
        Ok(bincode::serde::encode_to_vec(self, config::legacy())?)
    }

    /// Decode a stored payload, which must be exactly [STAT_RECORD_SIZE] long.
    pub fn decode(bytes: &[u8]) -> Result<Self, FsError> {
        if bytes.len() != STAT_RECORD_SIZE {
            return Err(FsError::Corrupt(format!(
                "stat record is {} bytes, expected {STAT_RECORD_SIZE}",
                bytes.len()
            )));
        }
        let (stat, _): (StatRecord, usize) =
            bincode::serde::decode_from_slice(bytes, config::legacy())?;
        Ok(stat)
    }

    pub fn apply(&mut self, change: StatChange, now: TimeSpec) {
        match change {
            StatChange::Size(size) => {
                self.size = size;
                self.modified_at = now;
                self.changed_at = now;
            }
            StatChange::Modified => {
                self.modified_at = now;
                self.changed_at = now;
            }
            StatChange::Accessed => self.accessed_at = now,
            StatChange::Mode(mode) => {
                self.mode = (self.mode & libc::S_IFMT as u32) | (mode & !(libc::S_IFMT as u32));
                self.changed_at = now;
            }
            StatChange::Times(None) => {
                self.accessed_at = now;
                self.modified_at = now;
                self.changed_at = now;
            }
            StatChange::Times(Some((accessed, modified))) => {
                let mut changed = false;
                for (field, update) in [
                    (&mut self.accessed_at, accessed),
                    (&mut self.modified_at, modified),
                ] {
                    match update {
                        TimeUpdate::Omit => {}
                        TimeUpdate::Now => {
                            *field = now;
                            changed = true;
                        }
                        TimeUpdate::At(time) => {
                            *field = time;
                            changed = true;
                        }
                    }
                }
                if changed {
                    self.changed_at = now;
                }
            }
        }
    }

    /// Build the attributes handed to the kernel.
    /// # Params
    /// - `ino`: the inode number the kernel knows this path by
    /// - `uid`, `gid`: owner reported for every path
    /// - `block_size`: preferred I/O size
    pub fn to_file_attr(&self, ino: u64, uid: u32, gid: u32, block_size: u32) -> fuser::FileAttr {
        fuser::FileAttr {
            ino,
            size: self.size,
            blocks: (self.size + 511) / 512,
            atime: self.accessed_at.into(),
            mtime: self.modified_at.into(),
            ctime: self.changed_at.into(),
            crtime: SystemTime::UNIX_EPOCH,
            kind: self.file_kind().into(),
            perm: self.permissions() as u16,
            nlink: if self.is_dir() { 2 } else { 1 },
            uid,
            gid,
            rdev: 0,
            blksize: block_size,
            flags: 0,
        }
    }
}

/// CRUD over the `stats` collection.
pub struct MetadataStore<'a> {
    adapter: &'a SyncAdapter,
}

impl<'a> MetadataStore<'a> {
    pub fn new(adapter: &'a SyncAdapter) -> Self {
        MetadataStore { adapter }
    }

    /// the record at `path` together with its version token
    pub fn get(&self, path: &str) -> Result<(StatRecord, u64), FsError> {
        let response = self.adapter.get(Collection::Stats, path)?;
        let stat = StatRecord::decode(&response.value)?;
        Ok((stat, response.version))
    }

    /// Create the record for a new path, failing with `AlreadyExists` if
    /// there is one already.
    pub fn insert(&self, path: &str, mode: u32) -> Result<StatRecord, FsError> {
        let stat = StatRecord::new(mode, time_util::now());
        self.adapter.insert(Collection::Stats, path, stat.encode()?)?;
        info!("inserted stat for {path:?} with mode {mode:o}");
        Ok(stat)
    }

    /// Read, apply `change`, and write back against the version that was
    /// read. A concurrent modification is retried from a fresh read.
    pub fn update(&self, path: &str, change: StatChange) -> Result<StatRecord, FsError> {
        for attempt in 1..=MAX_VERSION_RETRIES {
            let (mut stat, version) = self.get(path)?;
            stat.apply(change, time_util::now());
            match self
                .adapter
                .replace(Collection::Stats, path, stat.encode()?, Some(version))
            {
                Ok(_) => return Ok(stat),
                Err(FsError::Conflict) => {
                    warn!("stat of {path:?} changed concurrently, attempt {attempt} of {MAX_VERSION_RETRIES}");
                }
                Err(e) => return Err(e),
            }
        }
        Err(FsError::Conflict)
    }

    pub fn remove(&self, path: &str) -> Result<(), FsError> {
        self.adapter.remove(Collection::Stats, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::test_support::{interfering_context, memory_context, TEST_LIMITS};

    const FILE_MODE: u32 = libc::S_IFREG as u32 | 0o644;

    #[test]
    fn test_record_has_fixed_width() -> anyhow::Result<()> {
        assert_eq!(StatRecord::default().encode()?.len(), STAT_RECORD_SIZE);
        let busy = StatRecord {
            mode: u32::MAX,
            size: u64::MAX,
            ..StatRecord::new(0, TimeSpec::new(u64::MAX, 999_999_999))
        };
        assert_eq!(busy.encode()?.len(), STAT_RECORD_SIZE);
        Ok(())
    }

    #[test]
    fn test_wrong_payload_size_is_corruption() {
        assert!(matches!(StatRecord::decode(&[0u8; 47]), Err(FsError::Corrupt(_))));
        assert!(matches!(StatRecord::decode(&[0u8; 49]), Err(FsError::Corrupt(_))));
    }

    #[test]
    fn test_insert_then_get() -> anyhow::Result<()> {
        let ctx = memory_context(TEST_LIMITS);
        let inserted = ctx.metadata().insert("/f", FILE_MODE)?;
        let (stat, _) = ctx.metadata().get("/f")?;
        assert_eq!(stat, inserted);
        assert_eq!(stat.mode, FILE_MODE);
        assert_eq!(stat.size, 0);
        assert_eq!(stat.accessed_at, stat.modified_at);
        assert_eq!(stat.modified_at, stat.changed_at);

        assert_eq!(ctx.metadata().insert("/f", FILE_MODE), Err(FsError::AlreadyExists));
        assert_eq!(ctx.metadata().get("/g"), Err(FsError::NotFound));
        Ok(())
    }

    #[test]
    fn test_stored_garbage_is_corruption() -> anyhow::Result<()> {
        let ctx = memory_context(TEST_LIMITS);
        ctx.adapter().insert(Collection::Stats, "/bad", vec![1, 2, 3])?;
        assert!(matches!(ctx.metadata().get("/bad"), Err(FsError::Corrupt(_))));
        Ok(())
    }

    #[test]
    fn test_chmod_keeps_file_type() {
        let mut stat = StatRecord::new(FILE_MODE, TimeSpec::new(1, 0));
        stat.apply(StatChange::Mode(libc::S_IFDIR as u32 | 0o600), TimeSpec::new(2, 0));
        assert!(stat.is_regular_file());
        assert_eq!(stat.permissions(), 0o600);
        assert_eq!(stat.changed_at, TimeSpec::new(2, 0));
        assert_eq!(stat.modified_at, TimeSpec::new(1, 0));
    }

    #[test]
    fn test_utimens_rules() {
        let before = TimeSpec::new(1, 0);
        let now = TimeSpec::new(5, 0);
        let fixed = TimeSpec::new(3, 7);

        let mut stat = StatRecord::new(FILE_MODE, before);
        stat.apply(StatChange::Times(None), now);
        assert_eq!((stat.accessed_at, stat.modified_at), (now, now));

        let mut stat = StatRecord::new(FILE_MODE, before);
        stat.apply(
            StatChange::Times(Some((TimeUpdate::Omit, TimeUpdate::At(fixed)))),
            now,
        );
        assert_eq!((stat.accessed_at, stat.modified_at), (before, fixed));
        assert_eq!(stat.changed_at, now);

        let mut stat = StatRecord::new(FILE_MODE, before);
        stat.apply(
            StatChange::Times(Some((TimeUpdate::Now, TimeUpdate::Omit))),
            now,
        );
        assert_eq!((stat.accessed_at, stat.modified_at), (now, before));

        let mut stat = StatRecord::new(FILE_MODE, before);
        stat.apply(
            StatChange::Times(Some((TimeUpdate::Omit, TimeUpdate::Omit))),
            now,
        );
        assert_eq!(stat, StatRecord::new(FILE_MODE, before));
    }

    #[test]
    fn test_update_size() -> anyhow::Result<()> {
        let ctx = memory_context(TEST_LIMITS);
        ctx.metadata().insert("/f", FILE_MODE)?;
        let updated = ctx.metadata().update("/f", StatChange::Size(12))?;
        assert_eq!(updated.size, 12);
        assert_eq!(ctx.metadata().get("/f")?.0.size, 12);
        assert_eq!(
            ctx.metadata().update("/missing", StatChange::Accessed),
            Err(FsError::NotFound)
        );
        Ok(())
    }

    #[test]
    fn test_update_retries_after_concurrent_change() -> anyhow::Result<()> {
        let ctx = interfering_context(TEST_LIMITS, Collection::Stats, 2);
        ctx.metadata().insert("/f", FILE_MODE)?;
        let updated = ctx.metadata().update("/f", StatChange::Size(3))?;
        assert_eq!(updated.size, 3);
        assert_eq!(ctx.metadata().get("/f")?.0.size, 3);
        Ok(())
    }

    #[test]
    fn test_update_gives_up_after_retries() -> anyhow::Result<()> {
        let ctx = interfering_context(TEST_LIMITS, Collection::Stats, MAX_VERSION_RETRIES);
        ctx.metadata().insert("/f", FILE_MODE)?;
        assert_eq!(
            ctx.metadata().update("/f", StatChange::Size(3)),
            Err(FsError::Conflict)
        );
        assert_eq!(ctx.metadata().get("/f")?.0.size, 0);
        Ok(())
    }

    #[test]
    fn test_file_attr_conversion() {
        let mut stat = StatRecord::new(libc::S_IFDIR as u32 | 0o755, TimeSpec::new(10, 0));
        stat.size = 0;
        let attr = stat.to_file_attr(1, 1000, 100, 4096);
        assert_eq!(attr.kind, fuser::FileType::Directory);
        assert_eq!(attr.perm, 0o755);
        assert_eq!((attr.uid, attr.gid), (1000, 100));
        assert_eq!(attr.nlink, 2);
    }
}
