//! `issue_mover`: relocate issues between scopes of a `SQLite`-backed tracker.
//!
//! A move creates a new issue in the destination scope with a fresh
//! scope-local id, rewrites short references so they keep pointing at the
//! source scope, copies the discussion, cross-links both issues with system
//! notes and closes the original, all in one transaction.

pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod policy;
pub mod reference;
pub mod service;
pub mod storage;
pub mod validation;

pub use error::{ErrorCode, MoverError, Result, StructuredError};
