//! Caller-facing domain model: objects, buckets, ACLs and listings.
//!
//! Values here are immutable snapshots.  They are built by the converter
//! from a server response, or by the caller to describe a write, and are
//! never updated in place afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// ACL entity granting access to anyone on the internet.
pub const ALL_USERS: &str = "allUsers";

/// ACL entity granting access to any authenticated account.
pub const ALL_AUTHENTICATED_USERS: &str = "allAuthenticatedUsers";

/// Permission level of an ACL rule.
///
/// Roles the client does not know about are carried verbatim in
/// [`AclRole::Other`] so that they survive a read-modify-write cycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AclRole {
    Owner,
    Reader,
    Writer,
    Other(String),
}

impl AclRole {
    /// Wire spelling of the role.
    pub fn as_str(&self) -> &str {
        match self {
            AclRole::Owner => "OWNER",
            AclRole::Reader => "READER",
            AclRole::Writer => "WRITER",
            AclRole::Other(role) => role,
        }
    }
}

impl From<&str> for AclRole {
    fn from(role: &str) -> Self {
        match role {
            "OWNER" => AclRole::Owner,
            "READER" => AclRole::Reader,
            "WRITER" => AclRole::Writer,
            other => AclRole::Other(other.to_string()),
        }
    }
}

impl From<String> for AclRole {
    fn from(role: String) -> Self {
        AclRole::from(role.as_str())
    }
}

impl From<AclRole> for String {
    fn from(role: AclRole) -> Self {
        role.as_str().to_string()
    }
}

impl fmt::Display for AclRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single access-control rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AclRule {
    /// Principal the rule applies to, e.g. `user-<email>` or [`ALL_USERS`].
    pub entity: String,
    pub role: AclRole,
}

impl AclRule {
    pub fn new(entity: impl Into<String>, role: AclRole) -> Self {
        Self {
            entity: entity.into(),
            role,
        }
    }
}

/// The owner of an object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    /// Always of the form `user-<userId>`.
    pub entity: String,
}

/// A Cloud Storage bucket.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    pub name: String,

    /// Access control rules on the bucket itself.
    pub acl: Vec<AclRule>,

    /// Rules applied to new objects that are created without an ACL.
    pub default_object_acl: Vec<AclRule>,

    /// Location of the bucket, e.g. `US`.
    pub location: String,

    /// Metadata generation of the bucket.
    /// Read-only.
    pub metageneration: i64,

    /// Storage class, e.g. `STANDARD`.
    pub storage_class: String,

    /// Read-only.
    pub created: DateTime<Utc>,
}

/// A Cloud Storage object's metadata.
///
/// Only `bucket`, `name`, `cache_control`, `content_type`,
/// `content_encoding`, `content_language`, `acl` and `metadata` are ever
/// sent on a write (see [`Object::to_raw_object`]).  Everything else is
/// populated from server responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    /// Name of the bucket containing the object.
    pub bucket: String,

    pub name: String,

    /// Controls how long browser and proxy caches keep the content.
    pub cache_control: String,

    /// MIME type of the content.
    pub content_type: String,

    pub content_language: String,

    pub content_encoding: String,

    pub acl: Vec<AclRule>,

    /// The original uploader of the object.
    /// Read-only.
    pub owner: Owner,

    /// Content length in bytes.
    /// Read-only.
    pub size: u64,

    /// MD5 digest of the content.
    /// Read-only.
    #[serde(with = "base64_bytes")]
    pub md5: Vec<u8>,

    /// CRC32C checksum of the content, big-endian.
    /// Read-only.
    #[serde(with = "base64_bytes")]
    pub crc32c: Vec<u8>,

    /// URL of the object's content.
    /// Read-only.
    pub media_link: String,

    /// User-provided key/value metadata.
    pub metadata: HashMap<String, String>,

    /// Version of the object's content.
    /// Read-only.
    pub generation: i64,

    /// Version of the metadata within a generation.  Only meaningful
    /// together with a particular generation of a particular object.
    /// Read-only.
    pub metageneration: i64,

    /// Read-only.
    pub storage_class: String,

    /// Read-only.
    pub created: DateTime<Utc>,

    /// Deletion time, or the zero timestamp.  Non-zero if and only if
    /// this generation of the object has been deleted.
    /// Read-only.
    pub deleted: DateTime<Utc>,

    /// Creation or modification time.  Metadata-only changes on a
    /// versioned bucket do not move it.
    /// Read-only.
    pub updated: DateTime<Utc>,
}

impl Object {
    /// Describe a new object to be written to `bucket/name`.
    pub fn new(bucket: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }

    /// Whether this generation is a tombstone.
    pub fn is_deleted(&self) -> bool {
        self.deleted != zero_time()
    }
}

/// Filter for listing the objects in a bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    /// Returns results in a directory-like fashion.  Objects whose names,
    /// after the prefix, contain the delimiter are reported once in
    /// [`Objects::prefixes`], truncated after the delimiter.
    pub delimiter: String,

    /// Only objects whose names begin with this prefix.
    pub prefix: String,

    /// Include every version of each object, not just the live one.
    pub versions: bool,

    /// Page token returned by a previous listing.
    pub cursor: String,

    /// Maximum number of items plus prefixes per page.  0 uses the
    /// service's default page size.
    pub max_results: u32,
}

/// One page of a listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Objects {
    pub results: Vec<Object>,

    /// Query for the next page with the same filter, or `None` when the
    /// listing is exhausted.
    pub next: Option<Query>,

    /// Prefixes of objects matching-but-not-listed, up to and including
    /// the requested delimiter.
    pub prefixes: Vec<String>,
}

/// The zero timestamp used for absent or unparseable times.
pub fn zero_time() -> DateTime<Utc> {
    DateTime::<Utc>::default()
}

/// Serde adapter rendering raw hash bytes as base64 text.
mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acl_role_parsing() {
        assert_eq!(AclRole::from("OWNER"), AclRole::Owner);
        assert_eq!(AclRole::from("READER"), AclRole::Reader);
        assert_eq!(AclRole::from("WRITER"), AclRole::Writer);
        assert_eq!(
            AclRole::from("FULL_CONTROL"),
            AclRole::Other("FULL_CONTROL".into())
        );
    }

    #[test]
    fn test_acl_role_wire_spelling() {
        assert_eq!(AclRole::Reader.as_str(), "READER");
        assert_eq!(AclRole::Other("CUSTOM".into()).to_string(), "CUSTOM");
        let json = serde_json::to_string(&AclRule::new(ALL_USERS, AclRole::Reader)).unwrap();
        assert_eq!(json, r#"{"entity":"allUsers","role":"READER"}"#);
    }

    #[test]
    fn test_new_object() {
        let obj = Object::new("b", "o.txt").with_content_type("text/plain");
        assert_eq!(obj.bucket, "b");
        assert_eq!(obj.name, "o.txt");
        assert_eq!(obj.content_type, "text/plain");
        assert_eq!(obj.size, 0);
        assert_eq!(obj.updated, zero_time());
        assert!(!obj.is_deleted());
    }

    #[test]
    fn test_is_deleted() {
        let mut obj = Object::new("b", "o");
        obj.deleted = "2014-05-06T07:08:09Z".parse().unwrap();
        assert!(obj.is_deleted());
    }

    #[test]
    fn test_zero_time_is_epoch() {
        assert_eq!(zero_time().timestamp(), 0);
    }

    #[test]
    fn test_object_json_renders_hashes_as_base64() {
        let mut obj = Object::new("b", "o");
        obj.md5 = vec![0xde, 0xad, 0xbe, 0xef];
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["md5"], "3q2+7w==");
        assert_eq!(json["crc32c"], "");

        let back: Object = serde_json::from_value(json).unwrap();
        assert_eq!(back.md5, vec![0xde, 0xad, 0xbe, 0xef]);
    }
}
