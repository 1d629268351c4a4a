//! Core types shared across the micro-ORM crates
//!
//! This crate provides foundational types used by both the error and
//! logging facilities:
//!
//! - **Schema constants**: canonical field keys and event names
//! - **Operation names**: the `op` values stamped on session events

pub mod ops;
pub mod schema;

pub use ops::OpName;
