//! Cloud Storage JSON API transport.
//!
//! Talks to the service over HTTPS with `reqwest`.  Uploads use a single
//! `multipart/related` request whose first part is the JSON object
//! resource and whose second part is the streamed content, so the whole
//! object is created in one call without buffering the body.
//!
//! Authentication is a static OAuth2 bearer token taken from the config
//! or from `GOOGLE_OAUTH_ACCESS_TOKEN`.  With no token, requests are sent
//! anonymously.
//!
//! `timeout_secs` only bounds metadata requests.  An upload runs as long
//! as the caller keeps writing; its sole bound is the context deadline.

use bytes::Bytes;
use futures::{future, stream, StreamExt};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::io;
use std::time::Duration;
use tracing::{debug, info};

use super::backend::{Media, ObjectTransport, TransportFuture};
use crate::config::ClientConfig;
use crate::context::Context;
use crate::errors::StorageError;
use crate::raw::{RawBucket, RawErrorResponse, RawObject, RawObjects};
use crate::types::Query;

/// Environment variable consulted when the config carries no token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Transport that sends requests to a Cloud Storage JSON API endpoint.
pub struct HttpTransport {
    client: reqwest::Client,
    api_base: String,
    upload_base: String,
    access_token: Option<String>,
    /// Per-request bound for metadata GETs.
    metadata_timeout: Option<Duration>,
}

impl HttpTransport {
    /// Build the HTTP client from `config`.
    pub fn new(config: &ClientConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {e}"))?;

        let access_token = if config.access_token.is_empty() {
            std::env::var(ACCESS_TOKEN_ENV)
                .ok()
                .filter(|token| !token.is_empty())
        } else {
            Some(config.access_token.clone())
        };

        info!(
            "HTTP transport initialized: api_base={} upload_base={} authenticated={}",
            config.api_base,
            config.upload_base,
            access_token.is_some()
        );

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            upload_base: config.upload_base.trim_end_matches('/').to_string(),
            access_token,
            metadata_timeout: (config.timeout_secs > 0)
                .then(|| Duration::from_secs(config.timeout_secs)),
        })
    }

    /// Attach the bearer token and a timeout: the context's remaining time,
    /// capped by `limit` when one is given.
    fn prepare(
        &self,
        request: RequestBuilder,
        ctx: &Context,
        limit: Option<Duration>,
    ) -> RequestBuilder {
        let request = match &self.access_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        };
        let timeout = match (ctx.remaining(), limit) {
            (Some(remaining), Some(limit)) => Some(remaining.min(limit)),
            (remaining, limit) => remaining.or(limit),
        };
        match timeout {
            Some(timeout) => request.timeout(timeout),
            None => request,
        }
    }

    fn object_url(&self, bucket: &str, name: &str) -> String {
        format!(
            "{}/b/{}/o/{}",
            self.api_base,
            url_encode(bucket),
            url_encode(name)
        )
    }

    fn bucket_url(&self, bucket: &str) -> String {
        format!("{}/b/{}", self.api_base, url_encode(bucket))
    }

    fn list_url(&self, bucket: &str) -> String {
        format!("{}/b/{}/o", self.api_base, url_encode(bucket))
    }

    fn upload_url(&self, bucket: &str) -> String {
        format!(
            "{}/b/{}/o?uploadType=multipart",
            self.upload_base,
            url_encode(bucket)
        )
    }

    /// Send a metadata GET and decode the JSON response.  A 404 is turned
    /// into the error built by `not_found`.
    async fn get_json<T: DeserializeOwned>(
        &self,
        ctx: &Context,
        context: &str,
        request: RequestBuilder,
        not_found: impl FnOnce() -> StorageError,
    ) -> Result<T, StorageError> {
        let resp = self
            .prepare(request, ctx, self.metadata_timeout)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{context} request failed: {e}"))?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Err(not_found());
        }
        decode_response(context, resp).await
    }
}

/// URL-encode a bucket or object name for use in API paths.
fn url_encode(name: &str) -> String {
    percent_encoding::utf8_percent_encode(name, percent_encoding::NON_ALPHANUMERIC).to_string()
}

/// Map a non-2xx response to [`StorageError::Api`], preferring the code
/// and message of the service's JSON error body.
fn map_error(context: &str, status: StatusCode, body: &str) -> StorageError {
    if let Ok(err_resp) = serde_json::from_str::<RawErrorResponse>(body) {
        if let Some(err) = err_resp.error {
            return StorageError::Api {
                code: err.code.unwrap_or(status.as_u16()),
                message: format!("{context}: {}", err.message.unwrap_or_default()),
            };
        }
    }
    StorageError::Api {
        code: status.as_u16(),
        message: format!("{context}: HTTP {status} - {body}"),
    }
}

async fn decode_response<T: DeserializeOwned>(
    context: &str,
    resp: Response,
) -> Result<T, StorageError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(map_error(context, status, &body));
    }
    let body = resp
        .bytes()
        .await
        .map_err(|e| anyhow::anyhow!("{context} body read failed: {e}"))?;
    let value = serde_json::from_slice(&body)
        .map_err(|e| anyhow::anyhow!("{context} response decode failed: {e}"))?;
    Ok(value)
}

/// The framing around a multipart upload: everything before the content
/// and everything after it.
struct MultipartFrame {
    content_type: String,
    head: Bytes,
    tail: Bytes,
}

fn multipart_frame(
    boundary: &str,
    object: &RawObject,
    media_type: &str,
) -> Result<MultipartFrame, StorageError> {
    let metadata = serde_json::to_string(object)
        .map_err(|e| anyhow::anyhow!("upload metadata encode failed: {e}"))?;
    let head = format!(
        "--{boundary}\r\n\
         Content-Type: application/json; charset=UTF-8\r\n\r\n\
         {metadata}\r\n\
         --{boundary}\r\n\
         Content-Type: {media_type}\r\n\r\n"
    );
    let tail = format!("\r\n--{boundary}--\r\n");
    Ok(MultipartFrame {
        content_type: format!("multipart/related; boundary={boundary}"),
        head: Bytes::from(head),
        tail: Bytes::from(tail),
    })
}

impl ObjectTransport for HttpTransport {
    fn insert_object(
        &self,
        ctx: Context,
        bucket: &str,
        object: RawObject,
        media: Media,
    ) -> TransportFuture<'_, RawObject> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let boundary = uuid::Uuid::new_v4().simple().to_string();
            let MultipartFrame {
                content_type,
                head,
                tail,
            } = multipart_frame(&boundary, &object, media.content_type())?;
            debug!("HTTP insert: bucket={} name={}", bucket, object.name);

            let body = stream::once(future::ready(Ok::<Bytes, io::Error>(head)))
                .chain(media.into_stream())
                .chain(stream::once(future::ready(Ok(tail))));

            let request = self
                .client
                .post(self.upload_url(&bucket))
                .header(CONTENT_TYPE, content_type)
                .body(reqwest::Body::wrap_stream(body));
            let resp = self
                .prepare(request, &ctx, None)
                .send()
                .await
                .map_err(|e| anyhow::anyhow!("upload request failed: {e}"))?;
            decode_response("upload", resp).await
        })
    }

    fn get_object(&self, ctx: Context, bucket: &str, name: &str) -> TransportFuture<'_, RawObject> {
        let bucket = bucket.to_string();
        let name = name.to_string();
        Box::pin(async move {
            debug!("HTTP get object: bucket={} name={}", bucket, name);
            let request = self.client.get(self.object_url(&bucket, &name));
            self.get_json(&ctx, "get object", request, || StorageError::ObjectNotFound {
                bucket: bucket.clone(),
                name: name.clone(),
            })
            .await
        })
    }

    fn get_bucket(&self, ctx: Context, bucket: &str) -> TransportFuture<'_, RawBucket> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            debug!("HTTP get bucket: bucket={}", bucket);
            let request = self.client.get(self.bucket_url(&bucket));
            self.get_json(&ctx, "get bucket", request, || StorageError::BucketNotFound {
                bucket: bucket.clone(),
            })
            .await
        })
    }

    fn list_objects(
        &self,
        ctx: Context,
        bucket: &str,
        query: Query,
    ) -> TransportFuture<'_, RawObjects> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            debug!(
                "HTTP list objects: bucket={} prefix='{}' delimiter='{}'",
                bucket, query.prefix, query.delimiter
            );
            let request = self
                .client
                .get(self.list_url(&bucket))
                .query(&query.to_params());
            self.get_json(&ctx, "list objects", request, || StorageError::BucketNotFound {
                bucket: bucket.clone(),
            })
            .await
        })
    }
}
