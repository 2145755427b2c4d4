//! # switchyard-testing
//!
//! Plugins for exercising a bus in tests:
//!
//! - [`RecordingPlugin`]: records every event it processes into a shared [`Recorder`]
//! - [`StatusResponder`]: answers `project:<extension>:create|update|delete` with a
//!   `project:<extension>:status` event, the way a provisioning plugin does
//! - [`FailingPlugin`]: errors, panics, or refuses to start

mod failing;
mod recording;
mod responder;

pub use failing::{FailingPlugin, FailureMode};
pub use recording::{Recorder, RecordingPlugin};
pub use responder::StatusResponder;
