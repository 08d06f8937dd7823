//! Wire representation of the Cloud Storage JSON API resources.
//!
//! These structs mirror the JSON schema exchanged with the service.  They
//! are deliberately dumb: every field is a plain string or number exactly
//! as it travels on the wire, and conversion into the caller-facing types
//! lives in [`crate::convert`].  Unknown fields are ignored on input.
//!
//! The API encodes int64 values (`size`, `generation`, `metageneration`)
//! as JSON strings; both strings and numbers are accepted when decoding.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An object resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObject {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cache_control: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_encoding: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content_language: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<RawAccessControl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<RawOwner>,
    #[serde(default, with = "int64_string", skip_serializing_if = "is_zero")]
    pub size: u64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub md5_hash: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub crc32c: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub media_link: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
    #[serde(default, with = "int64_string", skip_serializing_if = "is_zero")]
    pub generation: i64,
    #[serde(default, with = "int64_string", skip_serializing_if = "is_zero")]
    pub metageneration: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time_created: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time_deleted: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated: String,
}

/// A bucket resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawBucket {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub acl: Vec<RawAccessControl>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_object_acl: Vec<RawAccessControl>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub location: String,
    #[serde(default, with = "int64_string", skip_serializing_if = "is_zero")]
    pub metageneration: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub storage_class: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub time_created: String,
}

/// One access-control entry (object or bucket ACL).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawAccessControl {
    #[serde(default)]
    pub entity: String,
    #[serde(default)]
    pub role: String,
}

/// The owner of an object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawOwner {
    #[serde(default)]
    pub entity: String,
}

/// One page of an object listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawObjects {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<RawObject>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

/// Error body returned by the service on non-2xx responses.
#[derive(Debug, Deserialize)]
pub struct RawErrorResponse {
    pub error: Option<RawErrorDetail>,
}

#[derive(Debug, Deserialize)]
pub struct RawErrorDetail {
    pub code: Option<u16>,
    pub message: Option<String>,
}

fn is_zero<T: Default + PartialEq>(value: &T) -> bool {
    *value == T::default()
}

/// Serde adapter for int64 values carried as JSON strings.
mod int64_string {
    use serde::{de, Deserialize, Deserializer, Serializer};
    use std::fmt::Display;
    use std::str::FromStr;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum StringOrNumber<T> {
        String(String),
        Number(T),
    }

    pub fn serialize<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: FromStr + Deserialize<'de>,
        T::Err: Display,
    {
        match StringOrNumber::<T>::deserialize(deserializer)? {
            StringOrNumber::String(s) => s.parse().map_err(de::Error::custom),
            StringOrNumber::Number(n) => Ok(n),
        }
    }
}
