//! Medication payload schema
//!
//! This module defines the wire format accepted by the engine, the boundary
//! validation applied to it, the time-parsing rules, and the adapter that
//! turns payloads into domain medications.

mod adapter;
mod payload;
pub mod time;

pub use adapter::*;
pub use payload::*;
pub use time::TimeParser;
