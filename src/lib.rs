//! gcs-store: a Cloud Storage client with streaming uploads.
//!
//! The crate provides the object, bucket and listing model of the Cloud
//! Storage JSON API, conversion to and from its wire form, and an
//! [`ObjectWriter`] that streams content into a single insert request
//! while the caller is still producing it.  Requests are executed by a
//! pluggable [`ObjectTransport`]: an HTTP client for the real service or
//! an in-process memory service.

pub mod client;
pub mod config;
pub mod context;
pub mod convert;
pub mod errors;
pub mod metrics;
pub mod pipe;
pub mod raw;
pub mod transport;
pub mod types;
pub mod writer;

pub use client::Client;
pub use context::Context;
pub use errors::StorageError;
pub use transport::backend::{Media, ObjectTransport};
pub use types::{AclRole, AclRule, Bucket, Object, Objects, Owner, Query};
pub use writer::{Completion, ObjectWriter};
