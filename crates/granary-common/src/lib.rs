//! Granary Common Library
//!
//! Shared types, utilities, and error handling for the Granary workspace.
//!
//! # Overview
//!
//! This crate provides common functionality used across all Granary
//! workspace members:
//!
//! - **Error Handling**: the ingest error taxonomy and result alias
//! - **Checksums**: staged file integrity verification
//! - **Types**: providers, collection configs, granule files
//! - **Logging**: tracing bootstrap shared by binaries

pub mod checksum;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{IngestError, Result};
