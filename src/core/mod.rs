//! Core types for the UpdatePulse client.
//!
//! This module is the foundation of the crate's type system: the
//! strongly-typed error enum every operation returns, the crate-wide
//! [`Result`] alias, and the [`UpdateStage`] marker used to attribute
//! pipeline failures.
//!
//! # Design principles
//!
//! - **Error-first**: every fallible operation returns [`Result`] with a
//!   precise [`UpdateError`] variant; nothing is silently swallowed.
//! - **No internal retries**: transient failures (network, server) are
//!   surfaced so the external scheduler can decide when to retry.
//! - **Matchable taxonomy**: callers distinguish a rejected license from a
//!   stalled server from a corrupt local record by pattern matching, not by
//!   string inspection.

pub mod error;

pub use error::{Result, UpdateError, UpdateStage};
