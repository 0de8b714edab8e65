//! Google Cloud Platform provider implementations
//!
//! - Cloud Firestore (REST) for submitted records
//! - Google Cloud Storage for referenced files and produced archives

mod auth;
mod firestore;
mod gcs_store;

pub use auth::GcpAuth;
pub use firestore::FirestoreRecordStore;
pub use gcs_store::GcsObjectStore;
