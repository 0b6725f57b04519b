use serde::{Deserialize, Serialize};

/// an enum to describe the type of a file, as encoded in its mode bits
#[derive(Serialize, Deserialize, Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum FileKind {
    /// an regular file
    RegularFile,
    /// a directory
    Directory,
    /// anything else the mode may describe
    #[default]
    Unknown,
}

impl FileKind {
    /// Classify the `S_IFMT` bits of a mode.
    /// # Example
    /// ```
    /// use docfs::fs::FileKind;
    /// assert_eq!(FileKind::from_mode(libc::S_IFDIR as u32 | 0o755), FileKind::Directory);
    /// assert_eq!(FileKind::from_mode(libc::S_IFREG as u32 | 0o644), FileKind::RegularFile);
    /// ```
    pub fn from_mode(mode: u32) -> Self {
        match mode & libc::S_IFMT as u32 {
            m if m == libc::S_IFDIR as u32 => FileKind::Directory,
            m if m == libc::S_IFREG as u32 => FileKind::RegularFile,
            _ => FileKind::Unknown,
        }
    }
}

/// implement a trait to convert [FileKind] to [fuser::FileType]
impl From<FileKind> for fuser::FileType {
    fn from(kind: FileKind) -> Self {
        match kind {
            FileKind::RegularFile => fuser::FileType::RegularFile,
            FileKind::Directory => fuser::FileType::Directory,
            // Unknown Types are treated as regular files
            FileKind::Unknown => fuser::FileType::RegularFile,
        }
    }
}
