//! # switchyard-id
//!
//! Typed identifiers used by the switchyard event bus.
//!
//! Every identifier is a prefixed ULID: `{prefix}_{ulid}`.
//!
//! - `evt_01HV4Z2WQXKJNM8GPQY6VBKC3D` for events (and their causal parents)
//! - `job_01HV4Z3MXNKPQR9HSTZ7WCLD4E` for durable queue jobs
//! - `wrk_01HV4Z4NYPLTRS0JTUA8XDME5F` for worker processes attached to a queue backend
//!
//! The prefix keeps ids from being mixed up in logs and payloads; the ULID keeps them
//! unique and roughly time-ordered.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
