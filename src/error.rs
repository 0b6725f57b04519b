//! errors raised while mapping file-system calls onto store documents
use libc::c_int;
use thiserror::Error;

use crate::store::Status;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FsError {
    /// no document at the requested key
    #[error("no such file or directory")]
    NotFound,
    /// a conditional insert found an existing document
    #[error("file exists")]
    AlreadyExists,
    /// a stored payload does not have the expected size or shape
    #[error("corrupt document: {0}")]
    Corrupt(String),
    #[error("path exceeds the maximum key length")]
    NameTooLong,
    #[error("file exceeds the maximum file length")]
    FileTooLarge,
    #[error("invalid argument")]
    InvalidArgument,
    #[error("is a directory")]
    IsDirectory,
    #[error("not a directory")]
    NotDirectory,
    #[error("directory not empty")]
    NotEmpty,
    #[error("permission denied")]
    PermissionDenied,
    /// the document changed between read and write more times than we retry
    #[error("document version conflict")]
    Conflict,
    /// transport or backing store failure
    #[error("store i/o failure: {0}")]
    Io(String),
    #[error("out of memory")]
    OutOfMemory,
}

impl FsError {
    /// the (positive) errno to hand back to the kernel
    pub fn errno(&self) -> c_int {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AlreadyExists => libc::EEXIST,
            FsError::Corrupt(_) => libc::EBADF,
            FsError::NameTooLong => libc::ENAMETOOLONG,
            FsError::FileTooLarge => libc::EFBIG,
            FsError::InvalidArgument => libc::EINVAL,
            FsError::IsDirectory => libc::EISDIR,
            FsError::NotDirectory => libc::ENOTDIR,
            FsError::NotEmpty => libc::ENOTEMPTY,
            FsError::PermissionDenied => libc::EACCES,
            FsError::Conflict | FsError::Io(_) => libc::EIO,
            FsError::OutOfMemory => libc::ENOMEM,
        }
    }
}

/// Convert a failed store [Status] into the nearest [FsError].
///
/// `Success` has no error counterpart and is reported as an i/o failure
/// if it ever reaches this conversion.
impl From<Status> for FsError {
    fn from(status: Status) -> Self {
        match status {
            Status::NotFound => FsError::NotFound,
            Status::Exists => FsError::AlreadyExists,
            Status::VersionMismatch => FsError::Conflict,
            Status::TooBig => FsError::FileTooLarge,
            Status::Failure(reason) => FsError::Io(reason),
            Status::Success => FsError::Io("unexpected success status".to_string()),
        }
    }
}

impl From<bincode::error::EncodeError> for FsError {
    fn from(e: bincode::error::EncodeError) -> Self {
        FsError::Io(format!("encode failed: {e}"))
    }
}

impl From<bincode::error::DecodeError> for FsError {
    fn from(e: bincode::error::DecodeError) -> Self {
        FsError::Corrupt(format!("decode failed: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_status_maps_to_fs_error() {
        assert_eq!(FsError::from(Status::NotFound), FsError::NotFound);
        assert_eq!(FsError::from(Status::Exists), FsError::AlreadyExists);
        assert_eq!(FsError::from(Status::VersionMismatch), FsError::Conflict);
        assert_eq!(FsError::from(Status::TooBig), FsError::FileTooLarge);
        assert_eq!(
            FsError::from(Status::Failure("timeout".into())),
            FsError::Io("timeout".into())
        );
    }

    #[test]
    fn test_errno_mapping() {
        assert_eq!(FsError::NotFound.errno(), libc::ENOENT);
        assert_eq!(FsError::Corrupt("short".into()).errno(), libc::EBADF);
        assert_eq!(FsError::NameTooLong.errno(), libc::ENAMETOOLONG);
        assert_eq!(FsError::FileTooLarge.errno(), libc::EFBIG);
        assert_eq!(FsError::Conflict.errno(), libc::EIO);
        assert_eq!(FsError::OutOfMemory.errno(), libc::ENOMEM);
    }
}
