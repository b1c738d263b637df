//! Shared utilities for docflow integration tests.
//!
//! - `TestHarness`: an isolated data directory plus helpers to open `Docflow`
//! - `ScriptedConverter`: a converter that replays scripted diagnostic lines
//! - `ConfigBuilder`: programmatic configs

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{wait_until, ScriptedConverter, TestHarness};
