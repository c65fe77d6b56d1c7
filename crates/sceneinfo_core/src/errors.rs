//! Error Types
//!
//! This module defines the error types used throughout the cache.
//!
//! # Overview
//!
//! Queries against the cache never fail: an unknown path answers with an empty
//! set, `false` or `None`. Errors are reserved for the operations that can
//! genuinely go wrong:
//! - Parsing path text into a [`ScenePath`](crate::ScenePath)
//! - Validating [`InfoCacheSettings`](crate::InfoCacheSettings)
//! - Dumping and reloading a cache snapshot
//!
//! # Usage
//!
//! Fallible public APIs return [`Result<T>`], an alias for
//! `std::result::Result<T, InfoCacheError>`.
//!
//! ```rust,ignore
//! use sceneinfo_core::errors::Result;
//! use sceneinfo_core::ScenePath;
//!
//! fn parse_root() -> Result<ScenePath> {
//!     Ok(ScenePath::parse("/World")?)
//! }
//! ```

use thiserror::Error;

/// Reasons a string is rejected as a scene path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    /// The text was empty.
    #[error("Scene path is empty")]
    Empty,

    /// Paths must start at the absolute root.
    #[error("Scene path is not absolute: {0}")]
    NotAbsolute(String),

    /// Two separators in a row, or a trailing separator.
    #[error("Scene path has an empty component: {0}")]
    EmptyComponent(String),

    /// A relative path was expected.
    #[error("Relative path must not start with '/': {0}")]
    NotRelative(String),
}

/// The main error type for the cache.
#[derive(Error, Debug)]
pub enum InfoCacheError {
    // ========================================================================
    // Input Errors
    // ========================================================================
    /// A path could not be parsed.
    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    /// Settings failed validation.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    /// The dedicated worker pool could not be created.
    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    // ========================================================================
    // Snapshot Errors
    // ========================================================================
    /// Reading or writing the dump failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The dump could not be encoded or decoded.
    #[error("Snapshot codec error: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The dump decoded but describes an impossible store.
    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),
}

/// Alias for `Result<T, InfoCacheError>`.
pub type Result<T> = std::result::Result<T, InfoCacheError>;
