//! register our filesystem to `FUSE` and mount it
use fuser::MountOption;
use log::info;
use std::{path::Path, sync::Arc};

use crate::{
    fs::{DocFs, Limits, MAX_DOCUMENT_SIZE, MAX_KEY_LEN},
    store::MemoryStore,
};

/// Load the store image at `image_path` and mount it at `mountpoint`.
///
/// Blocks until the filesystem is unmounted; the store is written back to
/// the image on unmount.
pub fn mount<P>(image_path: P, mountpoint: P, auto_unmount: bool) -> anyhow::Result<()>
where
    P: AsRef<Path>,
{
    let fs = load(image_path)?;

    let mut opts = vec![
        MountOption::FSName("docfs".to_string()),
        MountOption::DefaultPermissions,
    ];
    if auto_unmount {
        opts.push(MountOption::AutoUnmount);
    }

    info!("mounting at {}", mountpoint.as_ref().display());
    Ok(fuser::mount2(fs, mountpoint, &opts)?)
}

/// open a store image and check its root, with the limits it was made with
pub fn load<P>(image_path: P) -> anyhow::Result<DocFs>
where
    P: AsRef<Path>,
{
    let store = MemoryStore::open(image_path, MAX_DOCUMENT_SIZE)?;
    let header = store.header()?;
    let limits = Limits {
        max_key_len: MAX_KEY_LEN,
        block_size: header.block_size,
        max_blocks: header.max_blocks,
    };
    DocFs::new(Arc::new(store), limits)
}
