//! The task store: persisted board/column/card/task/worker state, the
//! automation trigger, the completion cascade, and the worker registry.
//!
//! Everything here is backed by a single `tokio_rusqlite::Connection` in
//! WAL mode, with every multi-statement mutation run as one
//! `conn.call(move |conn| ...)` closure so it commits or doesn't as a unit.

pub mod automation;
pub mod store;
pub mod workers;

pub use store::{StoreError, TaskStore};
