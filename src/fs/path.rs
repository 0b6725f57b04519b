//! split absolute paths into parent directory and leaf name
use crate::error::FsError;

use super::ROOT_PATH;

/// Reject paths that can't be used as a document key.
/// # Example
/// ```
/// use docfs::fs::path::check_len;
/// assert!(check_len("/a", 250).is_ok());
/// assert!(check_len(&"x".repeat(251), 250).is_err());
/// ```
pub fn check_len(path: &str, max_key_len: usize) -> Result<(), FsError> {
    if path.len() > max_key_len {
        return Err(FsError::NameTooLong);
    }
    Ok(())
}

/// Split an absolute path into `(parent directory path, leaf name)`.
///
/// Fails with `InvalidArgument` for relative paths, for the root (it has no
/// leaf), for a trailing `/` and for empty, `.` or `..` components, and with `NameTooLong` if
/// the path is longer than `max_key_len`.
/// # Example
/// ```
/// use docfs::fs::path::split;
/// assert_eq!(split("/d/f", 250).unwrap(), ("/d".to_string(), "f".to_string()));
/// assert_eq!(split("/f", 250).unwrap(), ("/".to_string(), "f".to_string()));
/// ```
pub fn split(path: &str, max_key_len: usize) -> Result<(String, String), FsError> {
    check_len(path, max_key_len)?;
    if !path.starts_with('/') || path == ROOT_PATH {
        return Err(FsError::InvalidArgument);
    }
    let (parent, leaf) = path.rsplit_once('/').ok_or(FsError::InvalidArgument)?;
    if leaf.is_empty()
        || leaf == "."
        || leaf == ".."
        || parent.split('/').skip(1).any(|c| c.is_empty() || c == "." || c == "..")
    {
        return Err(FsError::InvalidArgument);
    }
    let parent = if parent.is_empty() { ROOT_PATH } else { parent };
    Ok((parent.to_string(), leaf.to_string()))
}

/// Append a leaf name to a directory path.
/// # Example
/// ```
/// use docfs::fs::path::join;
/// assert_eq!(join("/", "a"), "/a");
/// assert_eq!(join("/a", "b"), "/a/b");
/// ```
pub fn join(parent: &str, name: &str) -> String {
    if parent == ROOT_PATH {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}
