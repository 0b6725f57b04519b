//! an in-process store that answers requests from its own worker thread
use anyhow::{anyhow, Context};
use log::{debug, error, info};
use memmap2::Mmap;
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use crate::utils::traits::SerializeAndDigest;

use super::{
    image::IMAGE_MAGIC, AsyncStore, Callback, Collection, ImageHeader, Request, Response, Status,
    StoreImage,
};

/// a request waiting for the worker
struct Job {
    scope: String,
    collection: Collection,
    request: Request,
    callback: Callback,
}

/// Keeps every collection in memory and behaves like a remote client:
/// [submit](AsyncStore::submit) only queues the request, the response is
/// delivered to the callback from the worker thread.
///
/// When opened from an image file the contents are written back by
/// [flush](AsyncStore::flush).
pub struct MemoryStore {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Option<JoinHandle<()>>,
    image: Arc<Mutex<StoreImage>>,
    image_path: Option<PathBuf>,
}

impl MemoryStore {
    /// an empty, memory-only store
    /// # Params
    /// - `max_document_size`: the largest value a single document may hold
    pub fn new(max_document_size: usize) -> Self {
        Self::from_image(StoreImage::default(), None, max_document_size)
    }

    /// Create a new image file holding an empty store.
    ///
    /// Fails if `image_path` already exists.
    pub fn create<P>(image_path: P, header: ImageHeader, max_document_size: usize) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let image_path = image_path.as_ref();
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(image_path)
            .with_context(|| format!("can't create store image {}", image_path.display()))?;
        let store = Self::from_image(
            StoreImage::new(header),
            Some(image_path.to_path_buf()),
            max_document_size,
        );
        store.flush()?;
        Ok(store)
    }

    /// Load a store from an image file written by [flush](AsyncStore::flush).
    pub fn open<P>(image_path: P, max_document_size: usize) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let image_path = image_path.as_ref();
        let file = File::open(image_path)
            .with_context(|| format!("can't open store image {}", image_path.display()))?;
        // Safety
        // the image is only read while it is mapped, and we never hand out
        // references into the mapping: the decoded image owns all its data
        let mapped = unsafe { Mmap::map(&file)? };
        let (mut image, _) = StoreImage::deserialize(&mapped)
            .with_context(|| format!("corrupt store image {}", image_path.display()))?;
        if image.header.magic != IMAGE_MAGIC {
            return Err(anyhow!(
                "{} is not a store image (magic {:#x})",
                image_path.display(),
                image.header.magic
            ));
        }
        image.header.update_last_mounted_at();
        info!(
            "loaded store image {} with {} namespaces",
            image_path.display(),
            image.namespaces.len()
        );
        Ok(Self::from_image(
            image,
            Some(image_path.to_path_buf()),
            max_document_size,
        ))
    }

    fn from_image(image: StoreImage, image_path: Option<PathBuf>, max_document_size: usize) -> Self {
        let image = Arc::new(Mutex::new(image));
        let (sender, receiver) = mpsc::channel();
        let worker_image = Arc::clone(&image);
        let worker = thread::spawn(move || run_worker(receiver, worker_image, max_document_size));
        MemoryStore {
            sender: Mutex::new(Some(sender)),
            worker: Some(worker),
            image,
            image_path,
        }
    }

    /// the header of the underlying image
    pub fn header(&self) -> anyhow::Result<ImageHeader> {
        let image = self
            .image
            .lock()
            .map_err(|_| anyhow!("store image lock poisoned"))?;
        Ok(image.header.clone())
    }
}

fn run_worker(receiver: mpsc::Receiver<Job>, image: Arc<Mutex<StoreImage>>, max_document_size: usize) {
    for job in receiver {
        let response = match image.lock() {
            Ok(mut image) => image.apply(&job.scope, job.collection, job.request, max_document_size),
            Err(_) => Response::with_status(Status::Failure("store image lock poisoned".into())),
        };
        (job.callback)(response);
    }
    debug!("store worker stopped");
}

impl AsyncStore for MemoryStore {
    fn submit(
        &self,
        scope: &str,
        collection: Collection,
        request: Request,
        callback: Callback,
    ) -> anyhow::Result<()> {
        let sender = self
            .sender
            .lock()
            .map_err(|_| anyhow!("store sender lock poisoned"))?;
        let sender = sender.as_ref().ok_or_else(|| anyhow!("store is shut down"))?;
        sender
            .send(Job {
                scope: scope.to_owned(),
                collection,
                request,
                callback,
            })
            .map_err(|_| anyhow!("store worker is gone"))
    }

    fn flush(&self) -> anyhow::Result<()> {
        let Some(image_path) = &self.image_path else {
            return Ok(());
        };
        let mut image = self
            .image
            .lock()
            .map_err(|_| anyhow!("store image lock poisoned"))?;
        image.header.update_modified_at();

        // write next to the image and swap it in, so a failed flush
        // leaves the previous image intact
        let staging_path = image_path.with_extension("staging");
        let file = File::create(&staging_path)?;
        let mut writer = BufWriter::new(file);
        let written = image.serialize_into(&mut writer)?;
        writer.flush()?;
        std::fs::rename(&staging_path, image_path)?;
        info!("flushed {written} bytes to store image {}", image_path.display());
        Ok(())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        // closing the channel ends the worker loop
        if let Ok(mut sender) = self.sender.lock() {
            sender.take();
        }
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("store worker panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SyncAdapter;

    fn temp_image(name: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("docfs-{}-{name}.img", std::process::id()));
        if path.exists() {
            std::fs::remove_file(&path).unwrap();
        }
        path
    }

    #[test]
    fn test_callback_runs_on_worker_thread() {
        let store = MemoryStore::new(64);
        let caller = thread::current().id();
        let (sender, receiver) = mpsc::channel();
        store
            .submit(
                "_default",
                Collection::Stats,
                Request::Get { key: "/".into() },
                Box::new(move |response| {
                    sender
                        .send((thread::current().id(), response.status))
                        .unwrap();
                }),
            )
            .unwrap();
        let (worker, status) = receiver.recv().unwrap();
        assert_ne!(worker, caller);
        assert_eq!(status, Status::NotFound);
    }

    #[test]
    fn test_flush_and_reopen() -> anyhow::Result<()> {
        let path = temp_image("reopen");
        {
            let store = Arc::new(MemoryStore::create(&path, ImageHeader::new(32, 2), 64)?);
            let adapter = SyncAdapter::new(store.clone(), "_default");
            adapter.insert(Collection::Dentries, "/", b"{}".to_vec())?;
            store.flush()?;
        }
        let store = Arc::new(MemoryStore::open(&path, 64)?);
        let header = store.header()?;
        assert_eq!(header.block_size, 32);
        assert_eq!(header.max_blocks, 2);
        assert!(header.last_mounted_at.is_some());

        let adapter = SyncAdapter::new(store, "_default");
        assert_eq!(adapter.get(Collection::Dentries, "/")?.value, b"{}");
        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn test_create_refuses_existing_image() -> anyhow::Result<()> {
        let path = temp_image("existing");
        drop(MemoryStore::create(&path, ImageHeader::new(32, 2), 64)?);
        assert!(MemoryStore::create(&path, ImageHeader::new(32, 2), 64).is_err());
        std::fs::remove_file(&path)?;
        Ok(())
    }

    #[test]
    fn test_open_rejects_garbage() -> anyhow::Result<()> {
        let path = temp_image("garbage");
        std::fs::write(&path, b"definitely not a store image")?;
        assert!(MemoryStore::open(&path, 64).is_err());
        std::fs::remove_file(&path)?;
        Ok(())
    }
}
