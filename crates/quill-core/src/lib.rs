//! Foundational low-level utilities shared across Quill crates.
//!
//! Provides atomic file-write helpers, time utilities, and char-exact
//! text helpers used by prompt assembly, context budgeting, and
//! transcript logging.

pub mod atomic_io;
pub mod text;
pub mod time_utils;

pub use atomic_io::write_text_atomic;
pub use text::{collapse_whitespace, truncate_chars};
pub use time_utils::{current_unix_timestamp, current_unix_timestamp_ms};
