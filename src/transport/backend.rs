//! Abstract request execution trait.
//!
//! Every transport must implement [`ObjectTransport`].  The trait works in
//! terms of wire records ([`crate::raw`]) so that callers never depend on
//! how a request is encoded or carried.

use bytes::Bytes;
use futures::Stream;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context as TaskContext, Poll};

use crate::context::Context;
use crate::errors::StorageError;
use crate::raw::{RawBucket, RawObject, RawObjects};
use crate::types::Query;

/// Boxed byte stream carried by [`Media`].
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Bytes>> + Send + Sync>>;

/// Upload content together with its MIME type.
///
/// The stream is read exactly once, front to back; it cannot be rewound.
pub struct Media {
    content_type: String,
    body: ByteStream,
}

impl Media {
    pub fn new<S>(content_type: impl Into<String>, body: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + Sync + 'static,
    {
        Self {
            content_type: content_type.into(),
            body: Box::pin(body),
        }
    }

    /// MIME type of the content, or `application/octet-stream` when unset.
    pub fn content_type(&self) -> &str {
        if self.content_type.is_empty() {
            "application/octet-stream"
        } else {
            &self.content_type
        }
    }

    pub fn into_stream(self) -> ByteStream {
        self.body
    }
}

impl Stream for Media {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Self::Item>> {
        self.body.as_mut().poll_next(cx)
    }
}

/// Boxed future returned by every transport call.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Async request execution contract.
pub trait ObjectTransport: Send + Sync + 'static {
    /// Create `object` in `bucket` with the content read from `media`,
    /// returning the stored object as reported by the service.
    fn insert_object(
        &self,
        ctx: Context,
        bucket: &str,
        object: RawObject,
        media: Media,
    ) -> TransportFuture<'_, RawObject>;

    /// Fetch the metadata of `bucket/name`.
    fn get_object(&self, ctx: Context, bucket: &str, name: &str) -> TransportFuture<'_, RawObject>;

    /// Fetch the metadata of `bucket`.
    fn get_bucket(&self, ctx: Context, bucket: &str) -> TransportFuture<'_, RawBucket>;

    /// Fetch one page of objects in `bucket` matching `query`.
    fn list_objects(
        &self,
        ctx: Context,
        bucket: &str,
        query: Query,
    ) -> TransportFuture<'_, RawObjects>;
}
