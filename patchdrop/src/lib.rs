//! Apply patch files dropped into an inbox to a git working tree.
//!
//! The crate separates:
//!
//! - **[`core`]**: Pure logic (classification, naming, result types).
//! - **[`io`]**: Side-effecting adapters (git, process capture, config,
//!   locking, archiving).
//!
//! [`apply`] selects and runs the application strategy; [`pipeline`] wraps a
//! single patch in the repository lock and files it into `applied/` or
//! `failed/`. The `patchdrop-watch` crate drives the pipeline from an inbox
//! directory.

pub mod apply;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod pipeline;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
