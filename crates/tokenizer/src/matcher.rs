//! Ordered selection of input keys by regular expression.

use std::collections::{BTreeMap, HashSet};

use regex::Regex;

use crate::errors::Result;

/// A list of key patterns compiled once. Patterns match at the start of a
/// key (a prefix match, as with `image_.*` selecting `image_primary`).
#[derive(Debug, Clone)]
pub struct KeyMatcher {
    sources: Vec<String>,
    patterns: Vec<Regex>,
}

impl KeyMatcher {
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut sources = Vec::new();
        let mut compiled = Vec::new();
        for pattern in patterns {
            let pattern = pattern.as_ref();
            compiled.push(Regex::new(&format!("^(?:{pattern})"))?);
            sources.push(pattern.to_string());
        }
        Ok(Self {
            sources,
            patterns: compiled,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.sources
    }

    pub fn is_match(&self, key: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(key))
    }

    /// Matching entries ordered by pattern, then by key. A key matched by
    /// several patterns appears once, at its first match.
    pub fn select<'a, V>(&self, inputs: &'a BTreeMap<String, V>) -> Vec<(&'a str, &'a V)> {
        let mut seen = HashSet::new();
        let mut selected = Vec::new();
        for pattern in &self.patterns {
            for (key, value) in inputs {
                if pattern.is_match(key) && seen.insert(key.as_str()) {
                    selected.push((key.as_str(), value));
                }
            }
        }
        selected
    }
}
