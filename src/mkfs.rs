//! create our filesystem
use crate::{
    fs::{Dispatcher, FsContext, Limits, MAX_BLOCKS, MAX_DOCUMENT_SIZE, MAX_KEY_LEN},
    store::{AsyncStore, ImageHeader, MemoryStore},
};
use anyhow::anyhow;
use byte_unit::{Byte, ByteUnit};
use log::info;
use std::{path::Path, sync::Arc};

/// create a new filesystem,given the path of the image file,block size and block count,
/// # Params
/// - `image_file_path`: the path of the image file, which must not exist yet
/// - `block_size`: the size of one content block, at most one document
/// - `max_blocks`: how many blocks a single file may span
///
/// # Return
/// an [anyhow::Result] type to indicate whether the operation is successful
pub fn mkfs<P>(image_file_path: P, block_size: u64, max_blocks: u64) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    // a block is stored as one document, so it can't be larger than one
    if block_size == 0 || block_size > MAX_DOCUMENT_SIZE as u64 {
        return Err(anyhow!(format!(
            "Block size must be between 1 B and {}, got {}",
            Byte::from_bytes(MAX_DOCUMENT_SIZE as _).get_appropriate_unit(true),
            Byte::from_bytes(block_size as _).get_adjusted_unit(ByteUnit::B)
        )));
    }
    if max_blocks == 0 || max_blocks > MAX_BLOCKS {
        return Err(anyhow!(
            "A file may span between 1 and {MAX_BLOCKS} blocks, got {max_blocks}"
        ));
    }
    let limits = Limits {
        max_key_len: MAX_KEY_LEN,
        block_size,
        max_blocks,
    };

    let store = Arc::new(MemoryStore::create(
        image_file_path,
        ImageHeader::new(block_size, max_blocks),
        MAX_DOCUMENT_SIZE,
    )?);
    Dispatcher::new(FsContext::new(store.clone(), limits)?).bootstrap()?;
    store.flush()?;

    info!(
        "created a filesystem with {} blocks, files up to {}",
        Byte::from_bytes(block_size as _).get_appropriate_unit(true),
        Byte::from_bytes(limits.max_file_len() as _).get_appropriate_unit(true)
    );
    Ok(())
}
