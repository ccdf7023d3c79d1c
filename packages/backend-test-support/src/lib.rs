//! Backend test support utilities
//!
//! Shared helpers for the backend integration tests: unified logging
//! initialization and generators for unique session/nickname values.

pub mod logging;
pub mod unique_helpers;
