//! Conversion between the wire representation and the domain model.
//!
//! Read paths go wire → domain through [`new_object`], [`new_bucket`] and
//! [`new_objects`].  The single write path goes domain → wire through
//! [`Object::to_raw_object`], which only carries the fields a client is
//! allowed to set.
//!
//! Parsing is lenient on purpose: an empty or malformed timestamp becomes
//! the zero timestamp and an undecodable hash becomes an empty byte
//! vector.  Neither is reported as an error.  This can hide a corrupt
//! response, so the parse failures are logged at `debug`.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::raw::{RawAccessControl, RawBucket, RawObject, RawObjects};
use crate::types::{zero_time, AclRule, Bucket, Object, Objects, Owner, Query};

/// Parse an RFC 3339 timestamp, yielding the zero timestamp when `text`
/// is empty or malformed.
pub fn parse_time(text: &str) -> DateTime<Utc> {
    if text.is_empty() {
        return zero_time();
    }
    match DateTime::parse_from_rfc3339(text) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            debug!("Ignoring malformed timestamp {:?}: {}", text, e);
            zero_time()
        }
    }
}

/// Decode a base64 hash field into raw bytes, yielding an empty vector
/// when `text` is empty or not valid base64.
pub fn decode_hash(text: &str) -> Vec<u8> {
    if text.is_empty() {
        return Vec::new();
    }
    match BASE64_STANDARD.decode(text) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!("Ignoring malformed hash {:?}: {}", text, e);
            Vec::new()
        }
    }
}

fn acl_from_raw(acl: &[RawAccessControl]) -> Vec<AclRule> {
    acl.iter()
        .map(|rule| AclRule::new(rule.entity.clone(), rule.role.as_str().into()))
        .collect()
}

fn acl_to_raw(acl: &[AclRule]) -> Vec<RawAccessControl> {
    acl.iter()
        .map(|rule| RawAccessControl {
            entity: rule.entity.clone(),
            role: rule.role.as_str().to_string(),
        })
        .collect()
}

impl From<&RawObject> for Object {
    fn from(o: &RawObject) -> Self {
        Object {
            bucket: o.bucket.clone(),
            name: o.name.clone(),
            cache_control: o.cache_control.clone(),
            content_type: o.content_type.clone(),
            content_language: o.content_language.clone(),
            content_encoding: o.content_encoding.clone(),
            acl: acl_from_raw(&o.acl),
            owner: Owner {
                entity: o
                    .owner
                    .as_ref()
                    .map(|owner| owner.entity.clone())
                    .unwrap_or_default(),
            },
            size: o.size,
            md5: decode_hash(&o.md5_hash),
            crc32c: decode_hash(&o.crc32c),
            media_link: o.media_link.clone(),
            metadata: o.metadata.clone(),
            generation: o.generation,
            metageneration: o.metageneration,
            storage_class: o.storage_class.clone(),
            created: parse_time(&o.time_created),
            deleted: parse_time(&o.time_deleted),
            updated: parse_time(&o.updated),
        }
    }
}

impl From<&RawBucket> for Bucket {
    fn from(b: &RawBucket) -> Self {
        Bucket {
            name: b.name.clone(),
            acl: acl_from_raw(&b.acl),
            default_object_acl: acl_from_raw(&b.default_object_acl),
            location: b.location.clone(),
            metageneration: b.metageneration,
            storage_class: b.storage_class.clone(),
            created: parse_time(&b.time_created),
        }
    }
}

/// Convert a wire object; an absent record stays absent.
pub fn new_object(raw: Option<&RawObject>) -> Option<Object> {
    raw.map(Object::from)
}

/// Convert a wire bucket; an absent record stays absent.
pub fn new_bucket(raw: Option<&RawBucket>) -> Option<Bucket> {
    raw.map(Bucket::from)
}

/// Shape one listing page.  The continuation query repeats `query` with
/// its cursor set to the page token, and is only present when the service
/// returned one.
pub fn new_objects(page: &RawObjects, query: &Query) -> Objects {
    let next = page
        .next_page_token
        .as_deref()
        .filter(|token| !token.is_empty())
        .map(|token| Query {
            cursor: token.to_string(),
            ..query.clone()
        });
    Objects {
        results: page.items.iter().map(Object::from).collect(),
        next,
        prefixes: page.prefixes.clone(),
    }
}

impl Object {
    /// Build the wire record for a write request.  Read-only fields are
    /// never included.
    pub fn to_raw_object(&self) -> RawObject {
        RawObject {
            bucket: self.bucket.clone(),
            name: self.name.clone(),
            cache_control: self.cache_control.clone(),
            content_type: self.content_type.clone(),
            content_encoding: self.content_encoding.clone(),
            content_language: self.content_language.clone(),
            acl: acl_to_raw(&self.acl),
            metadata: self.metadata.clone(),
            ..Default::default()
        }
    }
}

impl Query {
    /// Query-string parameters for a list request.  Unset fields are
    /// omitted so the service applies its defaults.
    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        let mut params = Vec::new();
        if !self.prefix.is_empty() {
            params.push(("prefix", self.prefix.clone()));
        }
        if !self.delimiter.is_empty() {
            params.push(("delimiter", self.delimiter.clone()));
        }
        if self.versions {
            params.push(("versions", "true".to_string()));
        }
        if !self.cursor.is_empty() {
            params.push(("pageToken", self.cursor.clone()));
        }
        if self.max_results > 0 {
            params.push(("maxResults", self.max_results.to_string()));
        }
        params
    }
}
