//! Structured logging for the mapper
//!
//! - `init(profile)` installs a subscriber once per process
//! - `log_op_start!`, `log_op_end!`, `log_op_error!` stamp session operations
//! - `test_capture` collects events in memory for assertions
//!
//! Without an installed subscriber every event is a no-op.
//!
//! ```rust
//! use microorm_core::logging_facility::{init, Profile};
//!
//! init(Profile::Development);
//! ```

pub mod init;
pub mod macros;
pub mod test_capture;

pub use init::{init, Profile};
pub use test_capture::{init_test_capture, CapturedEvent, TestCapture};
