//! Resource tags and tag filters
//!
//! Tags are lowercase words (`web`, `apache::vhost`, `stage.pre`). Adding a
//! namespaced tag also adds each of its segments, so a resource tagged
//! `apache::vhost` matches a filter for `apache` as well.

use crate::error::{Error, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static VALID_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\w[-\w:.]*$").expect("tag pattern is valid"));

static TAG_SEPARATOR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*,\s*").expect("separator pattern is valid"));

/// Check a tag against the allowed syntax
pub fn valid_tag(tag: &str) -> bool {
    VALID_TAG.is_match(tag)
}

/// Ordered, duplicate-free set of tags carried by a resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagSet(Vec<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag, plus each `::` segment of it
    pub fn insert(&mut self, tag: &str) -> Result<()> {
        let tag = tag.trim().to_lowercase();
        if !valid_tag(&tag) {
            return Err(Error::InvalidTag(tag));
        }

        if tag.contains("::") {
            for segment in tag.split("::").filter(|s| !s.is_empty()) {
                self.push_unique(segment);
            }
        }
        self.push_unique(&tag);
        Ok(())
    }

    /// Add several tags, stopping at the first invalid one
    pub fn extend<'a, I>(&mut self, tags: I) -> Result<()>
    where
        I: IntoIterator<Item = &'a str>,
    {
        for tag in tags {
            self.insert(tag)?;
        }
        Ok(())
    }

    fn push_unique(&mut self, tag: &str) {
        if !self.contains(tag) {
            self.0.push(tag.to_string());
        }
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// True if any of `tags` is present
    pub fn tagged_with_any<S: AsRef<str>>(&self, tags: &[S]) -> bool {
        tags.iter().any(|t| self.contains(t.as_ref()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Tag filter as configured on a transaction
///
/// Built either from a list (kept verbatim) or from a delimited string
/// such as `"web, db"`, which is split on commas with surrounding
/// whitespace removed. An empty list means "no filtering".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "TagListSetting", into = "Vec<String>")]
pub struct TagList(Vec<String>);

impl TagList {
    /// Split a comma or comma-space delimited string
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s.is_empty() {
            return Self::default();
        }
        Self(
            TAG_SEPARATOR
                .split(s)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for TagList {
    fn from(s: &str) -> Self {
        Self::parse(s)
    }
}

impl From<String> for TagList {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Vec<String>> for TagList {
    fn from(tags: Vec<String>) -> Self {
        Self(tags)
    }
}

impl From<Vec<&str>> for TagList {
    fn from(tags: Vec<&str>) -> Self {
        Self(tags.into_iter().map(str::to_string).collect())
    }
}

impl From<TagList> for Vec<String> {
    fn from(list: TagList) -> Self {
        list.0
    }
}

/// Accepted serialized shapes for a tag filter
#[derive(Deserialize)]
#[serde(untagged)]
enum TagListSetting {
    List(Vec<String>),
    Delimited(String),
}

impl From<TagListSetting> for TagList {
    fn from(setting: TagListSetting) -> Self {
        match setting {
            TagListSetting::List(tags) => Self(tags),
            TagListSetting::Delimited(s) => Self::parse(&s),
        }
    }
}
