//! Provider abstractions for record storage and object storage
//!
//! This module provides trait-based abstractions that allow switching between
//! local (filesystem) and cloud (GCP) backends.

pub mod local;
pub mod memory;
pub mod object_store;
pub mod record_store;

#[cfg(feature = "gcp")]
pub mod gcp;

pub use object_store::{ByteStream, ObjectStoreProvider, StoredObjectInfo};
pub use record_store::RecordStoreProvider;
