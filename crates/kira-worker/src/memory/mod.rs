//! Advisory context injection (C12): failure-pattern memory and coding rules,
//! consulted by `executors::agent` before a prompt is dispatched.

pub mod failures;
pub mod rules;
