//! Deterministic, pure logic shared by the patch pipeline.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod format;
pub mod naming;
pub mod types;
