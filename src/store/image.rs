//! the persisted form of an in-process store
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::utils::{
    digest,
    time_util::{self, TimeSpec},
    traits::{DigestInSelf, SerializeAndDigest},
};

use super::{Collection, Request, Response, Status};

/// magic number at the start of every store image
pub const IMAGE_MAGIC: u32 = 0xd0cf_5001;

/// Settings of the filesystem the image was formatted for.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageHeader {
    pub magic: u32,
    pub created_at: TimeSpec,
    pub modified_at: Option<TimeSpec>,
    pub last_mounted_at: Option<TimeSpec>,
    /// size of one content block, in bytes
    pub block_size: u64,
    /// how many content blocks a single file may span
    pub max_blocks: u64,
}

impl ImageHeader {
    pub fn new(block_size: u64, max_blocks: u64) -> Self {
        ImageHeader {
            magic: IMAGE_MAGIC,
            created_at: time_util::now(),
            modified_at: None,
            last_mounted_at: None,
            block_size,
            max_blocks,
        }
    }

    pub fn update_last_mounted_at(&mut self) {
        self.last_mounted_at = Some(time_util::now());
    }

    pub fn update_modified_at(&mut self) {
        self.modified_at = Some(time_util::now());
    }
}

/// one stored value plus its version token
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredDocument {
    pub value: Vec<u8>,
    pub version: u64,
    pub flags: u32,
}

/// Every document of every collection, as written to the image file.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StoreImage {
    pub header: ImageHeader,
    /// last version token handed out
    pub next_version: u64,
    /// `"<scope>.<collection>"` -> key -> document
    pub namespaces: BTreeMap<String, BTreeMap<String, StoredDocument>>,
    /// to verify the integrity of the whole image
    pub digest: [u8; 32],
}

fn namespace(scope: &str, collection: Collection) -> String {
    format!("{scope}.{collection}")
}

impl StoreImage {
    pub fn new(header: ImageHeader) -> Self {
        StoreImage {
            header,
            ..StoreImage::default()
        }
    }

    /// look a document up without going through the request path
    #[cfg(test)]
    pub fn document(&self, scope: &str, collection: Collection, key: &str) -> Option<&StoredDocument> {
        self.namespaces
            .get(&namespace(scope, collection))
            .and_then(|documents| documents.get(key))
    }

    /// Execute one request against the image.
    /// # Params
    /// - `max_document_size`: values larger than this are refused with [Status::TooBig]
    pub fn apply(
        &mut self,
        scope: &str,
        collection: Collection,
        request: Request,
        max_document_size: usize,
    ) -> Response {
        let StoreImage {
            namespaces,
            next_version,
            ..
        } = self;
        let documents = namespaces.entry(namespace(scope, collection)).or_default();
        match request {
            Request::Get { key } => match documents.get(&key) {
                Some(document) => Response {
                    status: Status::Success,
                    value: document.value.clone(),
                    version: document.version,
                    flags: document.flags,
                },
                None => Response::with_status(Status::NotFound),
            },
            Request::Insert { key, value } => {
                if value.len() > max_document_size {
                    return Response::with_status(Status::TooBig);
                }
                if documents.contains_key(&key) {
                    return Response::with_status(Status::Exists);
                }
                *next_version += 1;
                let version = *next_version;
                documents.insert(
                    key,
                    StoredDocument {
                        value,
                        version,
                        flags: 0,
                    },
                );
                Response {
                    version,
                    ..Response::default()
                }
            }
            Request::Replace {
                key,
                value,
                version,
            } => {
                if value.len() > max_document_size {
                    return Response::with_status(Status::TooBig);
                }
                let Some(document) = documents.get_mut(&key) else {
                    return Response::with_status(Status::NotFound);
                };
                if version.map_or(false, |expected| expected != document.version) {
                    return Response::with_status(Status::VersionMismatch);
                }
                *next_version += 1;
                document.value = value;
                document.version = *next_version;
                Response {
                    version: document.version,
                    ..Response::default()
                }
            }
            Request::Remove { key } => match documents.remove(&key) {
                Some(_) => Response::default(),
                None => Response::with_status(Status::NotFound),
            },
        }
    }
}

impl DigestInSelf for StoreImage {
    fn digest(&mut self) -> anyhow::Result<()> {
        self.digest = [0u8; 32];
        self.digest = digest::digest(self)?;
        Ok(())
    }

    fn verify_digest(&mut self) -> bool {
        let stored = self.digest;
        self.digest = [0u8; 32];
        let ok = digest::digest(self).map_or(false, |calculated| calculated == stored);
        self.digest = stored;
        ok
    }
}

impl SerializeAndDigest for StoreImage {}
