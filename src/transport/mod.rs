//! Request execution backends.
//!
//! The [`backend::ObjectTransport`] trait abstracts over how requests
//! reach the service.  Implementations include an HTTP client for the
//! Cloud Storage JSON API and an in-process memory service.

pub mod backend;
pub mod http;
pub mod memory;
