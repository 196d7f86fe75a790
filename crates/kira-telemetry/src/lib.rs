//! Logging initialization shared by every Kira binary.
//!
//! Kept deliberately small: every binary in this workspace needs a
//! consistent `tracing` bring-up, so that ambient concern lives here rather
//! than being duplicated per-binary. Datadog/OpenTelemetry metrics and
//! request-tracing middleware have no counterpart in Kira — see DESIGN.md.

pub mod logging;
