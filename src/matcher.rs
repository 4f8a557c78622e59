//! Longest-prefix matching of request paths against known API prefixes

use anyhow::{Context, Result};
use std::collections::BTreeSet;
use std::path::Path;

/// Immutable set of API path prefixes
///
/// Loaded once at startup and shared read-only between monitors. Prefixes are
/// kept in lexicographic order, so among equal-length candidates the smallest
/// one wins. Two different prefixes of the same path never share a length, so
/// in practice the longest match is unique.
#[derive(Debug, Clone, Default)]
pub struct ApiPathSet {
    prefixes: BTreeSet<String>,
}

impl ApiPathSet {
    /// Load prefixes from a newline-delimited file
    ///
    /// Surrounding whitespace is trimmed and blank lines are skipped.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!(path = %path.display(), "Loading API list");

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read API list file {}", path.display()))?;

        let set = Self::parse(&content);
        if set.is_empty() {
            tracing::warn!(path = %path.display(), "API list is empty, no log line will match");
        } else {
            tracing::info!(count = set.len(), "Loaded API prefixes");
        }
        for prefix in set.iter() {
            tracing::debug!(prefix = %prefix, "Loaded API");
        }

        Ok(set)
    }

    /// Build the set from the text of an API list file
    pub fn parse(content: &str) -> Self {
        content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect()
    }

    /// Return the longest prefix of `path` contained in the set
    pub fn longest_match(&self, path: &str) -> Option<&str> {
        let mut best: Option<&str> = None;
        for prefix in &self.prefixes {
            if path.starts_with(prefix.as_str()) && best.is_none_or(|b| prefix.len() > b.len()) {
                best = Some(prefix);
            }
        }
        best
    }

    pub fn len(&self) -> usize {
        self.prefixes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.prefixes.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ApiPathSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            prefixes: iter.into_iter().map(Into::into).collect(),
        }
    }
}
