//! Granary Ingest Library
//!
//! The granule ingest engine: protocol-polymorphic file retrieval,
//! collection-config-driven bucket resolution, checksum validation, and
//! duplicate-file handling, coordinated under a TTL-based distributed
//! download lock.
//!
//! # Example
//!
//! ```no_run
//! use granary_ingest::store::{S3Store, StoreConfig};
//! use granary_ingest::task::{sync_granule, SyncGranuleEvent};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(S3Store::new(&StoreConfig::from_env()?));
//!     let event: SyncGranuleEvent =
//!         serde_json::from_str(&std::fs::read_to_string("event.json")?)?;
//!     let output = sync_granule(store, event).await?;
//!     println!("{}", serde_json::to_string_pretty(&output)?);
//!     Ok(())
//! }
//! ```

pub mod collection;
pub mod duplicate;
pub mod granule;
pub mod lock;
pub mod protocol;
pub mod store;
pub mod task;
