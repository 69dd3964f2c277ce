//! HTTP surface for the dispatch engine.
//!
//! This crate owns process concerns (CLI and environment configuration,
//! tracing setup, caller identity, request routing) and delegates every
//! dispatch decision to `dispatch_core`.

pub mod app;
pub mod cli;
pub mod error;
pub mod handlers;
pub mod identity;
pub mod logging;
pub mod router;
