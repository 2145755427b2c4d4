//! # switchyard-events
//!
//! The data carried through the switchyard bus.
//!
//! ## Design Principles
//!
//! - An event's `name` is derived once, at construction, from its payload type, action
//!   and slug (`Type[:Action][:Slug]`). It is the only key used for routing.
//! - Payloads are a closed set of pipeline models plus a raw escape hatch; the
//!   `payloadModel` tag selects the decoder when an event crosses a serialization
//!   boundary.
//! - Artifacts are the side channel between plugins. The `secret` flag is advisory and
//!   only drives redaction in logs and dumps.
//!
//! ## Wire format
//!
//! Events serialize to camelCase JSON:
//!
//! ```text
//! { "id": "evt_...", "parentId": "evt_...", "name": "project:database:create",
//!   "action": "create", "state": "waiting", "stateMessage": "...",
//!   "payload": {...}, "payloadModel": "project_extension",
//!   "artifacts": [...], "createdAt": "...", "caller": {...} }
//! ```

mod artifact;
mod error;
mod event;
mod payload;
mod types;

pub use artifact::*;
pub use error::EventError;
pub use event::*;
pub use payload::*;
pub use types::*;

/// Re-export so plugins can build match patterns without a direct regex dependency.
pub use regex::Regex;
