//! Meter identity: name, tags, and meter kind.

use smallvec::SmallVec;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A key/value dimension attached to a meter.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag {
    /// Dimension name.
    pub key: String,
    /// Dimension value.
    pub value: String,
}

impl Tag {
    /// Create a tag from anything string-like.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}

/// Inline storage for the handful of tags a meter usually carries.
pub type Tags = SmallVec<[Tag; 4]>;

/// The kind of instrument behind a [`MeterId`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MeterKind {
    /// Monotonic event count.
    Counter,
    /// Instantaneous sampled value.
    Gauge,
    /// Latency distribution.
    Timer,
    /// Distribution of arbitrary amounts.
    DistributionSummary,
    /// Count derived from an external monotonic function.
    FunctionCounter,
    /// Count and total time derived from external monotonic functions.
    FunctionTimer,
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Timer => "timer",
            Self::DistributionSummary => "distribution_summary",
            Self::FunctionCounter => "function_counter",
            Self::FunctionTimer => "function_timer",
        };
        f.write_str(name)
    }
}

/// Identifies a meter within a registry.
///
/// Identity is the name plus the tag set. Tags are kept sorted by key
/// and deduplicated (last value wins), so two ids built from the same
/// tags in a different order are equal. The description and base unit
/// are carried along for publishers but do not take part in equality.
#[derive(Clone, Debug)]
pub struct MeterId {
    name: String,
    tags: Tags,
    description: Option<String>,
    base_unit: Option<String>,
}

impl MeterId {
    /// An id with no tags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Tags::new(),
            description: None,
            base_unit: None,
        }
    }

    /// Add or replace one tag.
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.insert_tag(Tag::new(key, value));
        self
    }

    /// Add or replace several tags.
    pub fn with_tags<I>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = Tag>,
    {
        for tag in tags {
            self.insert_tag(tag);
        }
        self
    }

    /// Attach a human-readable description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Attach a base unit (e.g. `"bytes"`).
    pub fn with_base_unit(mut self, unit: impl Into<String>) -> Self {
        self.base_unit = Some(unit.into());
        self
    }

    fn insert_tag(&mut self, tag: Tag) {
        match self.tags.binary_search_by(|t| t.key.cmp(&tag.key)) {
            Ok(pos) => self.tags[pos] = tag,
            Err(pos) => self.tags.insert(pos, tag),
        }
    }

    /// Meter name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tags, sorted by key.
    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    /// Value of the tag with the given key, if present.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .binary_search_by(|t| t.key.as_str().cmp(key))
            .ok()
            .map(|pos| self.tags[pos].value.as_str())
    }

    /// Description, if one was attached.
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Base unit, if one was attached.
    pub fn base_unit(&self) -> Option<&str> {
        self.base_unit.as_deref()
    }
}

impl PartialEq for MeterId {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.tags == other.tags
    }
}

impl Eq for MeterId {}

impl Hash for MeterId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.tags.hash(state);
    }
}

impl fmt::Display for MeterId {
    /// Renders as `name{k1=v1,k2=v2}`, or just `name` without tags.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if self.tags.is_empty() {
            return Ok(());
        }
        f.write_str("{")?;
        for (i, tag) in self.tags.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{tag}")?;
        }
        f.write_str("}")
    }
}

impl From<&str> for MeterId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for MeterId {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;

    fn hash_of(id: &MeterId) -> u64 {
        let mut h = DefaultHasher::new();
        id.hash(&mut h);
        h.finish()
    }

    #[test]
    fn tag_order_does_not_affect_identity() {
        let a = MeterId::new("http.requests")
            .with_tag("method", "GET")
            .with_tag("status", "200");
        let b = MeterId::new("http.requests")
            .with_tag("status", "200")
            .with_tag("method", "GET");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn duplicate_key_keeps_last_value() {
        let id = MeterId::new("jobs")
            .with_tag("queue", "low")
            .with_tag("queue", "high");
        assert_eq!(id.tags().len(), 1);
        assert_eq!(id.tag("queue"), Some("high"));
    }

    #[test]
    fn description_is_not_identity() {
        let a = MeterId::new("jobs").with_description("jobs run");
        let b = MeterId::new("jobs").with_base_unit("jobs");
        assert_eq!(a, b);
        assert_eq!(a.description(), Some("jobs run"));
        assert_eq!(b.base_unit(), Some("jobs"));
    }

    #[test]
    fn display_renders_sorted_tags() {
        let id = MeterId::new("cache.gets")
            .with_tag("result", "miss")
            .with_tag("cache", "users");
        assert_eq!(id.to_string(), "cache.gets{cache=users,result=miss}");
        assert_eq!(MeterId::new("plain").to_string(), "plain");
    }

    #[test]
    fn different_names_differ() {
        assert_ne!(MeterId::from("a"), MeterId::from("b"));
        assert_eq!(MeterKind::DistributionSummary.to_string(), "distribution_summary");
    }

    // ── proptest ───────────────────────────────────────────────

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn tags_stay_sorted_and_unique(
                pairs in prop::collection::vec(("[a-e]", "[a-z]{0,3}"), 0..12)
            ) {
                let id = MeterId::new("m")
                    .with_tags(pairs.iter().map(|(k, v)| Tag::new(k.clone(), v.clone())));
                for window in id.tags().windows(2) {
                    prop_assert!(window[0].key < window[1].key);
                }
            }

            #[test]
            fn insertion_order_is_irrelevant(
                pairs in prop::collection::btree_map("[a-h]", "[a-z]{1,3}", 0..8)
            ) {
                let forward = MeterId::new("m")
                    .with_tags(pairs.iter().map(|(k, v)| Tag::new(k.clone(), v.clone())));
                let backward = MeterId::new("m")
                    .with_tags(pairs.iter().rev().map(|(k, v)| Tag::new(k.clone(), v.clone())));
                prop_assert_eq!(&forward, &backward);
                prop_assert_eq!(hash_of(&forward), hash_of(&backward));
            }
        }
    }
}
