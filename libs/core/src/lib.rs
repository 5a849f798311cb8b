//! Shared infrastructure for the nestdb workspace.
//!
//! Currently this crate only hosts [`telemetry`], the tracing subscriber
//! setup used by binaries and test harnesses. Library crates emit
//! `tracing` events but never install a subscriber themselves.

pub mod telemetry;
