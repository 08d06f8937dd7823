//! Client facade over a transport.

use std::sync::Arc;
use tracing::info;

use crate::config::ClientConfig;
use crate::context::Context;
use crate::convert::new_objects;
use crate::errors::StorageError;
use crate::transport::backend::ObjectTransport;
use crate::transport::http::HttpTransport;
use crate::transport::memory::MemoryTransport;
use crate::types::{Bucket, Object, Objects, Query};
use crate::writer::ObjectWriter;

/// Entry point for object and bucket operations.
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct Client {
    transport: Arc<dyn ObjectTransport>,
}

impl Client {
    pub fn new(transport: Arc<dyn ObjectTransport>) -> Self {
        Self { transport }
    }

    /// Build a client with the transport named in `config`.
    pub fn from_config(config: &ClientConfig) -> anyhow::Result<Self> {
        let transport: Arc<dyn ObjectTransport> = match config.transport.as_str() {
            "http" => Arc::new(HttpTransport::new(config)?),
            "memory" => Arc::new(MemoryTransport::new()),
            other => anyhow::bail!("Unknown transport: {other} (expected http or memory)"),
        };
        info!("Client using {} transport", config.transport);
        Ok(Self::new(transport))
    }

    /// Start a streaming upload of `info`.  See [`ObjectWriter`].
    pub fn new_writer(&self, ctx: &Context, info: Object) -> ObjectWriter {
        ObjectWriter::new(ctx, Arc::clone(&self.transport), info)
    }

    /// Fetch the metadata of `bucket/name`.
    pub async fn object(&self, ctx: &Context, bucket: &str, name: &str) -> Result<Object, StorageError> {
        let raw = ctx
            .run(self.transport.get_object(ctx.clone(), bucket, name))
            .await?;
        Ok(Object::from(&raw))
    }

    /// Fetch the metadata of `bucket`.
    pub async fn bucket(&self, ctx: &Context, bucket: &str) -> Result<Bucket, StorageError> {
        let raw = ctx.run(self.transport.get_bucket(ctx.clone(), bucket)).await?;
        Ok(Bucket::from(&raw))
    }

    /// Fetch one page of objects.  Follow [`Objects::next`] for the rest.
    pub async fn list_objects(
        &self,
        ctx: &Context,
        bucket: &str,
        query: &Query,
    ) -> Result<Objects, StorageError> {
        let page = ctx
            .run(self.transport.list_objects(ctx.clone(), bucket, query.clone()))
            .await?;
        Ok(new_objects(&page, query))
    }
}
