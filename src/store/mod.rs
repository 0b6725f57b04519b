//! the document store underneath the filesystem
//!
//! The store only has to offer four primitives per named collection:
//! get-by-key, insert-if-absent, replace (optionally version-checked) and
//! remove-by-key. Requests are asynchronous: a response is delivered to a
//! callback, possibly from another thread. [SyncAdapter] turns that into a
//! blocking call.
pub mod image;
pub mod memory;
pub mod sync_adapter;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use image::{ImageHeader, StoreImage};
pub use memory::MemoryStore;
pub use sync_adapter::SyncAdapter;

/// collections used by the filesystem
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    /// fixed-width stat records, keyed by absolute path
    Stats,
    /// directory entry documents, keyed by absolute directory path
    Dentries,
    /// raw file content, keyed by absolute file path (and block index)
    Blocks,
}

impl Collection {
    pub const fn name(self) -> &'static str {
        match self {
            Collection::Stats => "stats",
            Collection::Dentries => "dentries",
            Collection::Blocks => "blocks",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// a single document-level request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Get {
        key: String,
    },
    /// store `value` only if `key` is absent
    Insert {
        key: String,
        value: Vec<u8>,
    },
    /// overwrite an existing document; when `version` is given the write is
    /// rejected unless it still matches the stored version
    Replace {
        key: String,
        value: Vec<u8>,
        version: Option<u64>,
    },
    Remove {
        key: String,
    },
}

impl Request {
    pub fn key(&self) -> &str {
        match self {
            Request::Get { key }
            | Request::Insert { key, .. }
            | Request::Replace { key, .. }
            | Request::Remove { key } => key,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Request::Get { .. } => "get",
            Request::Insert { .. } => "insert",
            Request::Replace { .. } => "replace",
            Request::Remove { .. } => "remove",
        }
    }
}

/// outcome reported by the store for one request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Status {
    #[default]
    Success,
    NotFound,
    Exists,
    VersionMismatch,
    /// the value exceeds the maximum document size
    TooBig,
    Failure(String),
}

/// the result value delivered to a request's callback
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Response {
    pub status: Status,
    /// document bytes, only filled in for a successful get
    pub value: Vec<u8>,
    /// version token of the document after the operation
    pub version: u64,
    pub flags: u32,
}

impl Response {
    pub fn with_status(status: Status) -> Self {
        Response {
            status,
            ..Response::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// invoked exactly once with the response of a submitted request
pub type Callback = Box<dyn FnOnce(Response) + Send + 'static>;

/// Asynchronous request interface of a backing store.
pub trait AsyncStore: Send + Sync {
    /// Queue `request` against `collection` inside `scope`.
    ///
    /// An `Err` means the request never reached the store and `callback`
    /// will not be called.
    fn submit(
        &self,
        scope: &str,
        collection: Collection,
        request: Request,
        callback: Callback,
    ) -> anyhow::Result<()>;

    /// Persist whatever the store keeps in memory. Networked stores have
    /// nothing to do here.
    fn flush(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
