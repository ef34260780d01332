//! # Khazin Support
//!
//! Shared utilities for the Khazin DI engine.
//!
//! This crate provides:
//! - Text rendering for error messages (dependency chains, suggestions)
//! - Tracing subscriber installation for binaries and tests

pub mod rendering;
pub mod telemetry;
