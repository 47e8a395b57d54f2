//! Inbox watcher for patchdrop.
//!
//! [`watcher::run_watch`] observes the inbox, debounces new files with
//! [`stability::wait_for_stable`], and dispatches each settled patch to
//! `patchdrop::pipeline`.

pub mod stability;
pub mod watcher;
