//! blocking facade over an [AsyncStore]
use log::debug;
use std::sync::{mpsc, Arc};

use crate::error::FsError;

use super::{AsyncStore, Collection, Request, Response, Status};

/// Runs one store request at a time and blocks the calling thread until its
/// callback fires.
///
/// The adapter never retries; callers that want to retry a version
/// conflict re-read and try again themselves.
#[derive(Clone)]
pub struct SyncAdapter {
    store: Arc<dyn AsyncStore>,
    scope: String,
}

impl SyncAdapter {
    pub fn new(store: Arc<dyn AsyncStore>, scope: impl Into<String>) -> Self {
        SyncAdapter {
            store,
            scope: scope.into(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AsyncStore> {
        &self.store
    }

    /// Submit `request` and wait for its response.
    ///
    /// Only a transport failure is an `Err` here: the returned [Response]
    /// may still carry a non-success [Status].
    pub fn execute(&self, collection: Collection, request: Request) -> Result<Response, FsError> {
        let kind = request.kind();
        let key = request.key().to_owned();
        let (sender, receiver) = mpsc::sync_channel(1);
        self.store
            .submit(
                &self.scope,
                collection,
                request,
                Box::new(move |response| {
                    // the waiting side only goes away once it has an answer
                    let _ = sender.send(response);
                }),
            )
            .map_err(|e| FsError::Io(format!("{kind} {collection}/{key}: {e}")))?;

        let response = receiver.recv().map_err(|_| {
            FsError::Io(format!(
                "{kind} {collection}/{key}: store dropped the request without answering"
            ))
        })?;
        debug!(
            "{kind} {collection}/{key:?} -> {:?} (version {}, {} bytes)",
            response.status,
            response.version,
            response.value.len()
        );
        Ok(response)
    }

    /// run a request and turn a non-success status into an [FsError]
    fn expect_success(&self, collection: Collection, request: Request) -> Result<Response, FsError> {
        let mut response = self.execute(collection, request)?;
        match std::mem::take(&mut response.status) {
            Status::Success => Ok(response),
            failed => Err(failed.into()),
        }
    }

    /// fetch a document; the response carries its value and version
    pub fn get(&self, collection: Collection, key: &str) -> Result<Response, FsError> {
        self.expect_success(collection, Request::Get { key: key.into() })
    }

    /// insert a document that must not exist yet, returning its version
    pub fn insert(&self, collection: Collection, key: &str, value: Vec<u8>) -> Result<u64, FsError> {
        self.expect_success(
            collection,
            Request::Insert {
                key: key.into(),
                value,
            },
        )
        .map(|response| response.version)
    }

    /// overwrite an existing document, returning its new version
    pub fn replace(
        &self,
        collection: Collection,
        key: &str,
        value: Vec<u8>,
        version: Option<u64>,
    ) -> Result<u64, FsError> {
        self.expect_success(
            collection,
            Request::Replace {
                key: key.into(),
                value,
                version,
            },
        )
        .map(|response| response.version)
    }

    pub fn remove(&self, collection: Collection, key: &str) -> Result<(), FsError> {
        self.expect_success(collection, Request::Remove { key: key.into() })
            .map(|_| ())
    }
}
