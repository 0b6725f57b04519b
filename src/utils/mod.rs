pub mod digest;
pub mod time_util;
pub mod traits;
