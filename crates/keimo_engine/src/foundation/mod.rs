//! Foundation module - Core utilities and types
//!
//! - Math types and camera-facing matrix helpers
//! - Frame timing
//! - Logging utilities

pub mod math;
pub mod time;
pub mod logging;
