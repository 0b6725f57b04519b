pub mod cli_interface;
pub mod error;
pub mod fs;
pub mod mkfs;
pub mod mount;
pub mod store;
pub mod utils;
pub use error::FsError;
