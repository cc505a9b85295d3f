//! awsh - interactive shell for AWS.
//!
//! The binary in `main.rs` wires these modules into a REPL; they are
//! exposed as a library so the integration tests can drive the same
//! code paths end-to-end.

pub mod aws;
pub mod cache;
pub mod commands;
pub mod config;
pub mod display;
pub mod error;
pub mod output;
pub mod select;
pub mod session;
pub mod shell;
