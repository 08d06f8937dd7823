//! In-process transport backed by hash maps.
//!
//! Behaves like a small Cloud Storage service: inserts assign generations,
//! compute MD5 and CRC32C digests and stamp timestamps, and listings honor
//! prefix, delimiter, versions and paging.  Buckets are created on first
//! insert or explicitly through [`MemoryTransport::create_bucket`].
//!
//! Replacing an object keeps the previous generation as a non-current
//! version with `timeDeleted` set.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use bytes::{Bytes, BytesMut};
use chrono::{SecondsFormat, Utc};
use futures::StreamExt;
use md5::{Digest, Md5};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicI64, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{Media, ObjectTransport, TransportFuture};
use crate::context::Context;
use crate::errors::StorageError;
use crate::raw::{RawBucket, RawObject, RawObjects, RawOwner};
use crate::types::Query;

const OWNER_ENTITY: &str = "project-owners-memory";
const STORAGE_CLASS: &str = "STANDARD";
const LOCATION: &str = "US";

/// One stored generation of an object.
struct StoredObject {
    data: Bytes,
    meta: RawObject,
}

/// In-memory transport.
pub struct MemoryTransport {
    buckets: RwLock<HashMap<String, RawBucket>>,
    /// (bucket, name) -> generations, oldest first.  The last entry is the
    /// live one.
    objects: RwLock<BTreeMap<(String, String), Vec<StoredObject>>>,
    next_generation: AtomicI64,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            buckets: RwLock::new(HashMap::new()),
            objects: RwLock::new(BTreeMap::new()),
            next_generation: AtomicI64::new(1),
        }
    }

    /// Register `name` as a bucket.  Returns `false` if it already exists.
    pub async fn create_bucket(&self, name: &str) -> bool {
        let mut buckets = self.buckets.write().await;
        if buckets.contains_key(name) {
            return false;
        }
        buckets.insert(name.to_string(), Self::new_bucket(name));
        true
    }

    /// Content of the live generation of `bucket/name`.
    pub async fn data(&self, bucket: &str, name: &str) -> Option<Bytes> {
        let objects = self.objects.read().await;
        objects
            .get(&(bucket.to_string(), name.to_string()))
            .and_then(|versions| versions.last())
            .map(|stored| stored.data.clone())
    }

    fn new_bucket(name: &str) -> RawBucket {
        RawBucket {
            name: name.to_string(),
            location: LOCATION.to_string(),
            metageneration: 1,
            storage_class: STORAGE_CLASS.to_string(),
            time_created: now(),
            ..Default::default()
        }
    }

    /// Drain `media`, returning the content with its base64 MD5 and CRC32C.
    async fn read_media(mut media: Media) -> Result<(Bytes, String, String), StorageError> {
        let mut buf = BytesMut::new();
        let mut md5 = Md5::new();
        let mut crc = 0u32;
        while let Some(chunk) = media.next().await {
            let chunk = chunk.map_err(|e| anyhow::anyhow!("upload body read failed: {e}"))?;
            md5.update(&chunk);
            crc = crc32c::crc32c_append(crc, &chunk);
            buf.extend_from_slice(&chunk);
        }
        Ok((
            buf.freeze(),
            BASE64_STANDARD.encode(md5.finalize()),
            BASE64_STANDARD.encode(crc.to_be_bytes()),
        ))
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// The listing prefix `name` rolls up into, if any.
fn common_prefix(name: &str, prefix: &str, delimiter: &str) -> Option<String> {
    if delimiter.is_empty() {
        return None;
    }
    let rest = name.strip_prefix(prefix)?;
    rest.find(delimiter)
        .map(|pos| format!("{prefix}{}", &rest[..pos + delimiter.len()]))
}

/// Paging token for an entry.  Versioned listings need the generation to
/// resume in the middle of one name's history.
fn page_token(meta: &RawObject) -> String {
    format!("{}#{}", meta.name, meta.generation)
}

fn parse_token(token: &str) -> Option<(&str, i64)> {
    let (name, generation) = token.rsplit_once('#')?;
    Some((name, generation.parse().ok()?))
}

impl ObjectTransport for MemoryTransport {
    fn insert_object(
        &self,
        _ctx: Context,
        bucket: &str,
        object: RawObject,
        media: Media,
    ) -> TransportFuture<'_, RawObject> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let content_type = media.content_type().to_string();
            // Nothing is committed unless the whole body arrives.
            let (data, md5_hash, crc32c) = Self::read_media(media).await?;

            {
                let mut buckets = self.buckets.write().await;
                buckets
                    .entry(bucket.clone())
                    .or_insert_with(|| Self::new_bucket(&bucket));
            }

            let timestamp = now();
            let generation = self.next_generation.fetch_add(1, Ordering::SeqCst);
            let meta = RawObject {
                bucket: bucket.clone(),
                name: object.name.clone(),
                cache_control: object.cache_control,
                content_type,
                content_encoding: object.content_encoding,
                content_language: object.content_language,
                acl: object.acl,
                owner: Some(RawOwner {
                    entity: OWNER_ENTITY.to_string(),
                }),
                size: data.len() as u64,
                md5_hash,
                crc32c,
                media_link: format!(
                    "memory://{}/{}?generation={}",
                    bucket, object.name, generation
                ),
                metadata: object.metadata,
                generation,
                metageneration: 1,
                storage_class: STORAGE_CLASS.to_string(),
                time_created: timestamp.clone(),
                time_deleted: String::new(),
                updated: timestamp.clone(),
            };

            debug!(
                "Memory insert: bucket={} name={} size={} generation={}",
                bucket, meta.name, meta.size, generation
            );

            let mut objects = self.objects.write().await;
            let versions = objects.entry((bucket, object.name)).or_default();
            if let Some(previous) = versions.last_mut() {
                previous.meta.time_deleted = timestamp;
            }
            versions.push(StoredObject {
                data,
                meta: meta.clone(),
            });
            Ok(meta)
        })
    }

    fn get_object(&self, _ctx: Context, bucket: &str, name: &str) -> TransportFuture<'_, RawObject> {
        let bucket = bucket.to_string();
        let name = name.to_string();
        Box::pin(async move {
            let objects = self.objects.read().await;
            match objects
                .get(&(bucket.clone(), name.clone()))
                .and_then(|versions| versions.last())
            {
                Some(stored) => Ok(stored.meta.clone()),
                None => Err(StorageError::ObjectNotFound { bucket, name }),
            }
        })
    }

    fn get_bucket(&self, _ctx: Context, bucket: &str) -> TransportFuture<'_, RawBucket> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            let buckets = self.buckets.read().await;
            buckets
                .get(&bucket)
                .cloned()
                .ok_or(StorageError::BucketNotFound { bucket })
        })
    }

    fn list_objects(
        &self,
        _ctx: Context,
        bucket: &str,
        query: Query,
    ) -> TransportFuture<'_, RawObjects> {
        let bucket = bucket.to_string();
        Box::pin(async move {
            if !self.buckets.read().await.contains_key(&bucket) {
                return Err(StorageError::BucketNotFound { bucket });
            }
            let resume = if query.cursor.is_empty() {
                None
            } else {
                Some(parse_token(&query.cursor).ok_or_else(|| StorageError::Api {
                    code: 400,
                    message: format!("list objects: invalid page token: {}", query.cursor),
                })?)
            };

            let objects = self.objects.read().await;
            let candidates = objects
                .iter()
                .filter(|((b, name), _)| *b == bucket && name.starts_with(&query.prefix))
                .flat_map(|(_, versions)| {
                    let skip = if query.versions {
                        0
                    } else {
                        versions.len().saturating_sub(1)
                    };
                    versions.iter().skip(skip)
                })
                .map(|stored| &stored.meta)
                .filter(|meta| match resume {
                    Some((name, generation)) => {
                        (meta.name.as_str(), meta.generation) > (name, generation)
                    }
                    None => true,
                });

            let limit = if query.max_results == 0 {
                usize::MAX
            } else {
                query.max_results as usize
            };
            let mut page = RawObjects::default();
            let mut prefixes = BTreeSet::new();
            let mut last = None;
            let mut truncated = false;
            for meta in candidates {
                let rolled = common_prefix(&meta.name, &query.prefix, &query.delimiter);
                let is_new = match &rolled {
                    Some(p) => !prefixes.contains(p),
                    None => true,
                };
                if is_new && page.items.len() + prefixes.len() >= limit {
                    truncated = true;
                    break;
                }
                match rolled {
                    Some(p) => {
                        prefixes.insert(p);
                    }
                    None => page.items.push(meta.clone()),
                }
                last = Some(page_token(meta));
            }

            page.prefixes = prefixes.into_iter().collect();
            if truncated {
                page.next_page_token = last;
            }
            debug!(
                "Memory list: bucket={} prefix='{}' items={} prefixes={}",
                bucket,
                query.prefix,
                page.items.len(),
                page.prefixes.len()
            );
            Ok(page)
        })
    }
}
