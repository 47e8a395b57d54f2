//! I/O adapters for the patch pipeline.

pub mod archive;
pub mod config;
pub mod git;
pub mod lock;
pub mod patch;
pub mod process;
