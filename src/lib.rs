//! sweepd — HTTP facade over Sequence-managed financial accounts.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod provider;
pub mod server;
pub mod sweep;
