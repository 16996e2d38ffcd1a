pub mod file_helpers;

pub use file_helpers::*;
