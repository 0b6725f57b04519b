//! file content, stored as a dense run of fixed-size blocks
//!
//! Block 0 of a file is keyed by the bare path, block `n > 0` by the path,
//! a NUL byte and `n`. Every block but the last is exactly `block_size`
//! bytes long, so the length of a file is implied by its blocks. Gaps left
//! by writes past the end are zero-filled.
use log::{debug, warn};

use crate::{
    error::FsError,
    store::{Collection, SyncAdapter},
};

use super::{Limits, MAX_VERSION_RETRIES};

/// Key of the `index`th content block of `path`.
/// # Example
/// ```
/// use docfs::fs::content::block_key;
/// assert_eq!(block_key("/f", 0), "/f");
/// assert_eq!(block_key("/f", 2), "/f\u{0}2");
/// ```
pub fn block_key(path: &str, index: u64) -> String {
    if index == 0 {
        path.to_owned()
    } else {
        format!("{path}\0{index}")
    }
}

/// extend `block` with zeros up to `len` bytes
fn zero_extend(block: &mut Vec<u8>, len: usize) -> Result<(), FsError> {
    if block.len() < len {
        block
            .try_reserve(len - block.len())
            .map_err(|_| FsError::OutOfMemory)?;
        block.resize(len, 0);
    }
    Ok(())
}

/// CRUD over the `blocks` collection.
pub struct ContentStore<'a> {
    adapter: &'a SyncAdapter,
    limits: &'a Limits,
}

impl<'a> ContentStore<'a> {
    pub fn new(adapter: &'a SyncAdapter, limits: &'a Limits) -> Self {
        ContentStore { adapter, limits }
    }

    fn fetch(&self, path: &str, index: u64) -> Result<Option<(Vec<u8>, u64)>, FsError> {
        match self.adapter.get(Collection::Blocks, &block_key(path, index)) {
            Ok(response) => Ok(Some((response.value, response.version))),
            Err(FsError::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Read-modify-write of one block.
    ///
    /// A missing block starts out empty when `create` is set, otherwise
    /// nothing is written and `None` is returned.
    fn modify_block<F, R>(
        &self,
        path: &str,
        index: u64,
        create: bool,
        mut change: F,
    ) -> Result<Option<R>, FsError>
    where
        F: FnMut(&mut Vec<u8>) -> Result<R, FsError>,
    {
        let key = block_key(path, index);
        for attempt in 1..=MAX_VERSION_RETRIES {
            let (mut block, version) = match self.fetch(path, index)? {
                Some((block, version)) => (block, Some(version)),
                None if create => (Vec::new(), None),
                None => return Ok(None),
            };
            let outcome = change(&mut block)?;
            let stored = match version {
                Some(version) => self
                    .adapter
                    .replace(Collection::Blocks, &key, block, Some(version)),
                None => self.adapter.insert(Collection::Blocks, &key, block),
            };
            match stored {
                Ok(_) => return Ok(Some(outcome)),
                // someone else wrote the block in between
                Err(FsError::Conflict | FsError::AlreadyExists) => {
                    warn!("block {index} of {path:?} changed concurrently, attempt {attempt} of {MAX_VERSION_RETRIES}")
                }
                Err(e) => return Err(e),
            }
        }
        Err(FsError::Conflict)
    }

    /// Read up to `length` bytes starting at `offset`.
    ///
    /// Reading at or past the end of the content, or from a file without
    /// content, yields an empty buffer.
    pub fn read(&self, path: &str, offset: u64, length: u64) -> Result<Vec<u8>, FsError> {
        let block_size = self.limits.block_size;
        let end = offset.saturating_add(length);
        let mut buf = Vec::new();
        let mut position = offset;
        while position < end {
            let index = position / block_size;
            let block_start = index * block_size;
            let Some((block, _)) = self.fetch(path, index)? else {
                break;
            };
            let lo = (position - block_start) as usize;
            if lo >= block.len() {
                break;
            }
            let hi = (end - block_start).min(block.len() as u64) as usize;
            buf.extend_from_slice(&block[lo..hi]);
            position = block_start + hi as u64;
            // a short block is the last one
            if (block.len() as u64) < block_size {
                break;
            }
        }
        debug!("read {} bytes of {path:?} at {offset}", buf.len());
        Ok(buf)
    }

    /// Write `data` at `offset`, zero-filling any gap before it.
    ///
    /// Fails with `FileTooLarge` before touching the store if the content
    /// would end past the maximum file length.
    /// # Return
    /// the new content length if the write made the file longer
    pub fn write(&self, path: &str, offset: u64, data: &[u8]) -> Result<Option<u64>, FsError> {
        let end = offset
            .checked_add(data.len() as u64)
            .ok_or(FsError::FileTooLarge)?;
        if end > self.limits.max_file_len() {
            return Err(FsError::FileTooLarge);
        }
        if data.is_empty() {
            return Ok(None);
        }

        let block_size = self.limits.block_size;
        let first = offset / block_size;
        let last = (end - 1) / block_size;
        if first > 0 {
            self.fill_gap(path, first)?;
        }

        let mut grown_to = None;
        for index in first..=last {
            let block_start = index * block_size;
            let lo = (offset.max(block_start) - block_start) as usize;
            let hi = (end.min(block_start + block_size) - block_start) as usize;
            let source_start = (block_start + lo as u64 - offset) as usize;
            let source = &data[source_start..source_start + (hi - lo)];
            let extended = self.modify_block(path, index, true, |block| {
                let extended = block.len() < hi;
                zero_extend(block, hi)?;
                block[lo..hi].copy_from_slice(source);
                Ok(extended)
            })?;
            // only the final block can be short, so extending the block the
            // write ends in means the file grew to `end`
            if index == last && extended == Some(true) {
                grown_to = Some(end);
            }
        }
        debug!("wrote {} bytes of {path:?} at {offset}", data.len());
        Ok(grown_to)
    }

    /// make every block before `first` exist and be full
    fn fill_gap(&self, path: &str, first: u64) -> Result<(), FsError> {
        let block_size = self.limits.block_size as usize;
        let is_full = |index| -> Result<bool, FsError> {
            Ok(self
                .fetch(path, index)?
                .map_or(false, |(block, _)| block.len() == block_size))
        };
        // blocks are dense: a full block means every earlier block is full
        if is_full(first - 1)? {
            return Ok(());
        }
        for index in 0..first {
            if !is_full(index)? {
                self.modify_block(path, index, true, |block| zero_extend(block, block_size))?;
            }
        }
        Ok(())
    }

    /// Shrink the content to `new_length` bytes.
    ///
    /// A length of 0 removes the content. Growing is left to the next write,
    /// so a `new_length` past the end, or a file without content, is a no-op.
    pub fn truncate(&self, path: &str, new_length: u64) -> Result<(), FsError> {
        if new_length == 0 {
            return self.remove(path);
        }
        let block_size = self.limits.block_size;
        let boundary = new_length / block_size;
        let within = (new_length % block_size) as usize;
        let first_removed = if within == 0 {
            boundary
        } else {
            let too_long = self
                .fetch(path, boundary)?
                .map_or(false, |(block, _)| block.len() > within);
            if too_long {
                self.modify_block(path, boundary, false, |block| {
                    block.truncate(within);
                    Ok(())
                })?;
            }
            boundary + 1
        };
        self.remove_from(path, first_removed)
    }

    /// delete all content; a file without content is not an error
    pub fn remove(&self, path: &str) -> Result<(), FsError> {
        self.remove_from(path, 0)
    }

    fn remove_from(&self, path: &str, first: u64) -> Result<(), FsError> {
        for index in first..self.limits.max_blocks {
            match self.adapter.remove(Collection::Blocks, &block_key(path, index)) {
                Ok(()) => debug!("removed block {index} of {path:?}"),
                Err(FsError::NotFound) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// the content length implied by the stored blocks
    #[cfg(test)]
    pub fn stored_length(&self, path: &str) -> Result<u64, FsError> {
        let block_size = self.limits.block_size;
        for index in 0..self.limits.max_blocks {
            match self.fetch(path, index)? {
                None => return Ok(index * block_size),
                Some((block, _)) if (block.len() as u64) < block_size => {
                    return Ok(index * block_size + block.len() as u64)
                }
                Some(_) => {}
            }
        }
        Ok(self.limits.max_file_len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::{
        test_support::{memory_context, racing_insert_context, OTHER_CLIENT_VALUE, TEST_LIMITS},
        FsContext,
    };

    const PATH: &str = "/f";

    fn context() -> FsContext {
        // 8 byte blocks, at most 4 of them
        memory_context(TEST_LIMITS)
    }

    fn block(ctx: &FsContext, index: u64) -> Option<Vec<u8>> {
        ctx.adapter()
            .get(Collection::Blocks, &block_key(PATH, index))
            .ok()
            .map(|response| response.value)
    }

    #[test]
    fn test_write_then_read() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        assert_eq!(content.write(PATH, 0, b"hello")?, Some(5));
        assert_eq!(content.read(PATH, 0, 5)?, b"hello");
        assert_eq!(content.read(PATH, 1, 3)?, b"ell");
        assert_eq!(content.read(PATH, 3, 100)?, b"lo");
        Ok(())
    }

    #[test]
    fn test_read_past_end_is_empty() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        assert!(content.read(PATH, 0, 10)?.is_empty());
        content.write(PATH, 0, b"abc")?;
        assert!(content.read(PATH, 3, 10)?.is_empty());
        assert!(content.read(PATH, 30, 10)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_write_spans_blocks() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        let data: Vec<u8> = (0u8..20).collect();
        assert_eq!(content.write(PATH, 0, &data)?, Some(20));
        assert_eq!(block(&ctx, 0).unwrap(), (0u8..8).collect::<Vec<_>>());
        assert_eq!(block(&ctx, 1).unwrap(), (8u8..16).collect::<Vec<_>>());
        assert_eq!(block(&ctx, 2).unwrap(), (16u8..20).collect::<Vec<_>>());
        assert_eq!(content.read(PATH, 0, 20)?, data);
        assert_eq!(content.read(PATH, 6, 4)?, vec![6, 7, 8, 9]);
        assert_eq!(content.stored_length(PATH)?, 20);
        Ok(())
    }

    #[test]
    fn test_overwrite_inside_does_not_grow() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.write(PATH, 0, b"0123456789")?;
        assert_eq!(content.write(PATH, 2, b"ab")?, None);
        assert_eq!(content.read(PATH, 0, 10)?, b"01ab456789");
        assert_eq!(content.write(PATH, 8, b"xyz")?, Some(11));
        assert_eq!(content.read(PATH, 0, 11)?, b"01ab4567xyz");
        Ok(())
    }

    #[test]
    fn test_sparse_write_zero_fills_gap() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.write(PATH, 0, b"ab")?;
        assert_eq!(content.write(PATH, 12, b"z")?, Some(13));
        let mut expected = b"ab".to_vec();
        expected.extend_from_slice(&[0u8; 10]);
        expected.push(b'z');
        assert_eq!(content.read(PATH, 0, 13)?, expected);
        assert_eq!(block(&ctx, 0).unwrap().len(), 8);
        Ok(())
    }

    #[test]
    fn test_sparse_write_into_empty_file() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        assert_eq!(content.write(PATH, 20, b"tail")?, Some(24));
        assert_eq!(block(&ctx, 0).unwrap(), vec![0u8; 8]);
        assert_eq!(block(&ctx, 1).unwrap(), vec![0u8; 8]);
        assert_eq!(content.read(PATH, 16, 8)?, b"\0\0\0\0tail");
        assert_eq!(content.stored_length(PATH)?, 24);
        Ok(())
    }

    #[test]
    fn test_write_past_max_file_length_changes_nothing() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.write(PATH, 0, b"keep")?;
        assert_eq!(content.write(PATH, 30, b"xyz"), Err(FsError::FileTooLarge));
        assert_eq!(content.write(PATH, u64::MAX, b"x"), Err(FsError::FileTooLarge));
        assert_eq!(content.read(PATH, 0, 32)?, b"keep");
        assert!(block(&ctx, 1).is_none());
        // exactly at the limit is fine
        assert_eq!(content.write(PATH, 29, b"xyz")?, Some(32));
        Ok(())
    }

    #[test]
    fn test_truncate_within_block() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.write(PATH, 0, b"abcdef")?;
        content.truncate(PATH, 3)?;
        assert_eq!(content.read(PATH, 0, 10)?, b"abc");
        Ok(())
    }

    #[test]
    fn test_truncate_drops_later_blocks() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        let data: Vec<u8> = (0u8..30).collect();
        content.write(PATH, 0, &data)?;
        content.truncate(PATH, 8)?;
        assert_eq!(content.stored_length(PATH)?, 8);
        assert!(block(&ctx, 1).is_none());
        assert!(block(&ctx, 3).is_none());

        content.write(PATH, 0, &data)?;
        content.truncate(PATH, 11)?;
        assert_eq!(content.read(PATH, 0, 30)?, data[..11].to_vec());
        assert!(block(&ctx, 2).is_none());
        Ok(())
    }

    #[test]
    fn test_truncate_to_zero_removes_content() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.write(PATH, 0, &[7u8; 20])?;
        content.truncate(PATH, 0)?;
        assert!(block(&ctx, 0).is_none());
        assert!(content.read(PATH, 0, 20)?.is_empty());
        Ok(())
    }

    #[test]
    fn test_truncate_never_grows() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.truncate(PATH, 5)?;
        assert!(block(&ctx, 0).is_none());
        content.write(PATH, 0, b"ab")?;
        content.truncate(PATH, 20)?;
        assert_eq!(content.stored_length(PATH)?, 2);
        Ok(())
    }

    #[test]
    fn test_remove_missing_content_is_fine() -> anyhow::Result<()> {
        let ctx = context();
        ctx.content().remove("/never-written")?;
        Ok(())
    }

    #[test]
    fn test_blocks_of_other_paths_are_untouched() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.write("/a", 0, &[1u8; 12])?;
        content.write("/a1", 0, b"x")?;
        content.write("/a/1", 0, b"y")?;
        content.remove("/a")?;
        assert!(content.read("/a", 0, 12)?.is_empty());
        assert_eq!(content.read("/a1", 0, 8)?, b"x");
        assert_eq!(content.read("/a/1", 0, 8)?, b"y");
        Ok(())
    }

    #[test]
    fn test_truncate_keeps_short_block_as_is() -> anyhow::Result<()> {
        let ctx = context();
        let content = ctx.content();
        content.write(PATH, 0, b"abc")?;
        let version = ctx.adapter().get(Collection::Blocks, PATH)?.version;
        content.truncate(PATH, 5)?;
        assert_eq!(ctx.adapter().get(Collection::Blocks, PATH)?.version, version);
        assert_eq!(content.read(PATH, 0, 8)?, b"abc");
        Ok(())
    }

    #[test]
    fn test_write_retries_when_block_appears_concurrently() -> anyhow::Result<()> {
        // another client creates block 0 between our lookup and our insert
        let ctx = racing_insert_context(TEST_LIMITS, Collection::Blocks, 1);
        let content = ctx.content();
        content.write(PATH, 2, b"AB")?;
        let mut expected = OTHER_CLIENT_VALUE.to_vec();
        expected[2..4].copy_from_slice(b"AB");
        assert_eq!(content.read(PATH, 0, 8)?, expected);
        Ok(())
    }
}
