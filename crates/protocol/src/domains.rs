//! Domain freshness set

use std::collections::HashSet;

/// The set of cluster domains confirmed fully reported this sync cycle
///
/// Only a key whose endpoints belong to fresh domains may be mass
/// unregistered on swap; entries under stale domains are preserved until
/// the state store vouches for their domain again.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainSet(HashSet<String>);

impl DomainSet {
    /// Create an empty set (no domain is fresh)
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a domain as fresh
    #[inline]
    pub fn insert(&mut self, domain: impl Into<String>) {
        self.0.insert(domain.into());
    }

    /// Whether the given domain is fresh
    #[inline]
    pub fn contains(&self, domain: &str) -> bool {
        self.0.contains(domain)
    }

    /// Number of fresh domains
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no domain is fresh
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DomainSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}
