//! Shared test utilities for moverflow integration tests.
//!
//! This module provides:
//! - `TestHarness` with a file-backed database in a temp directory
//! - A scripted report generator and a recording invalidator
//! - Builders for screener batches

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{RecordingInvalidator, ScriptedGenerator, TestHarness};
