use clap::Parser;

use crate::fs::{DEFAULT_MAX_BLOCKS, MAX_DOCUMENT_SIZE};

#[derive(Parser, Debug, PartialEq)]
#[command(author, version, about, long_about)]
pub enum DocFsCli {
    /// create a new store image with an empty root directory
    Mkfs(MkfsArgs),
    /// register a filesystem to `FUSE` and mount it
    Mount(MountArgs),
}
///make a new fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "make a new file system")]
pub struct MkfsArgs {
    /// the path of the store image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the size of one content block, in bytes
    #[clap(short, long, default_value_t = MAX_DOCUMENT_SIZE as u64)]
    pub block_size: u64,
    /// how many content blocks a single file may span
    #[clap(short, long, default_value_t = DEFAULT_MAX_BLOCKS)]
    pub max_blocks: u64,
}

/// mount a fs subcommand
#[derive(clap::Args, Debug, PartialEq)]
#[command(author, version, about = "mount a file system")]
pub struct MountArgs {
    /// the path of the store image file
    #[clap(short = 'p', long)]
    pub image_file_path: String,
    /// the mount point of the file system
    #[clap(short, long)]
    pub mount_point: String,
    /// unmount automatically when the process exits
    #[clap(short, long)]
    pub auto_unmount: bool,
}

/// test the `DocFsCli` struct
/// test `mkfs` subcommand
#[cfg(test)]
mod mkfs_parse_args_tests {
    use super::*;
    /// test short parameter form
    #[test]
    fn test_short_parameter_form() {
        let args = DocFsCli::parse_from(["docfs", "mkfs", "-p", "test", "-b", "4096", "-m", "8"]);
        assert_eq!(
            args,
            DocFsCli::Mkfs(MkfsArgs {
                image_file_path: "test".to_string(),
                block_size: 4096,
                max_blocks: 8,
            })
        );
    }
    /// test long parameter form
    #[test]
    fn test_long_parameter_form() {
        let image_file_path_name = concat!("--", "image-file-path");
        let args = DocFsCli::parse_from([
            "docfs",
            "mkfs",
            image_file_path_name,
            "test",
            "--block-size",
            "512",
            "--max-blocks",
            "3",
        ]);
        assert_eq!(
            args,
            DocFsCli::Mkfs(MkfsArgs {
                image_file_path: "test".to_string(),
                block_size: 512,
                max_blocks: 3,
            })
        );
    }
    /// test the defaults
    #[test]
    fn test_default_limits() {
        let args = DocFsCli::parse_from(["docfs", "mkfs", "-p", "test"]);
        assert_eq!(
            args,
            DocFsCli::Mkfs(MkfsArgs {
                image_file_path: "test".to_string(),
                block_size: MAX_DOCUMENT_SIZE as u64,
                max_blocks: DEFAULT_MAX_BLOCKS,
            })
        );
    }
}
