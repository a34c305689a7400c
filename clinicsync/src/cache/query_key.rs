// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Hierarchical query keys
//!
//! A query key is an ordered sequence of segments, domain first. Keys compare
//! structurally, and a key is a prefix of every key that extends it, which is
//! what bulk invalidation matches on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One segment of a query key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Null,
    Bool(bool),
    Int(i64),
    Str(String),
    /// Filter parameters; ordered so `{a, b}` and `{b, a}` are the same segment
    Params(BTreeMap<String, KeySegment>),
}

impl KeySegment {
    /// Build a parameter segment from key/value pairs
    pub fn params<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<KeySegment>,
    {
        KeySegment::Params(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            KeySegment::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for KeySegment {
    fn from(value: &str) -> Self {
        KeySegment::Str(value.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(value: String) -> Self {
        KeySegment::Str(value)
    }
}

impl From<&String> for KeySegment {
    fn from(value: &String) -> Self {
        KeySegment::Str(value.clone())
    }
}

impl From<i64> for KeySegment {
    fn from(value: i64) -> Self {
        KeySegment::Int(value)
    }
}

impl From<i32> for KeySegment {
    fn from(value: i32) -> Self {
        KeySegment::Int(value as i64)
    }
}

impl From<u32> for KeySegment {
    fn from(value: u32) -> Self {
        KeySegment::Int(value as i64)
    }
}

impl From<u64> for KeySegment {
    fn from(value: u64) -> Self {
        KeySegment::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<bool> for KeySegment {
    fn from(value: bool) -> Self {
        KeySegment::Bool(value)
    }
}

impl From<chrono::NaiveDate> for KeySegment {
    fn from(value: chrono::NaiveDate) -> Self {
        KeySegment::Str(value.format("%Y-%m-%d").to_string())
    }
}

impl<T: Into<KeySegment>> From<Option<T>> for KeySegment {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(KeySegment::Null)
    }
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Null => write!(f, "null"),
            KeySegment::Bool(b) => write!(f, "{}", b),
            KeySegment::Int(i) => write!(f, "{}", i),
            KeySegment::Str(s) => write!(f, "{}", s),
            KeySegment::Params(params) => {
                write!(f, "{{")?;
                for (i, (k, v)) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}={}", k, v)?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Immutable, structurally compared cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Key consisting of the domain segment only
    pub fn domain(domain: &str) -> Self {
        QueryKey(vec![KeySegment::from(domain)])
    }

    /// Build a key from a domain name and trailing segments
    pub fn build<I, S>(domain: &str, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<KeySegment>,
    {
        let mut parts = vec![KeySegment::from(domain)];
        parts.extend(segments.into_iter().map(Into::into));
        QueryKey(parts)
    }

    /// Child key extending this one by one segment
    pub fn with(mut self, segment: impl Into<KeySegment>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Domain name (first segment)
    pub fn domain_name(&self) -> Option<&str> {
        self.0.first().and_then(KeySegment::as_str)
    }

    /// True if `prefix`'s segments are a leading run of this key's segments.
    /// A key is a prefix of itself.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Key with the last segment dropped
    pub fn parent(&self) -> Option<QueryKey> {
        if self.0.len() <= 1 {
            None
        } else {
            Some(QueryKey(self.0[..self.0.len() - 1].to_vec()))
        }
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Build a [`QueryKey`] from a domain and segments
///
/// ```ignore
/// let key = query_key!("appointments", "detail", 7);
/// ```
#[macro_export]
macro_rules! query_key {
    ($domain:expr $(, $segment:expr)* $(,)?) => {
        $crate::cache::QueryKey::domain($domain)$(.with($segment))*
    };
}
