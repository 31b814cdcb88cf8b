use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A selection of opaque OS-issued application/category tokens.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppTokenSet(BTreeSet<String>);

impl AppTokenSet {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self(
            tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.trim().is_empty())
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, token: &str) -> bool {
        self.0.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn overlaps(&self, other: &AppTokenSet) -> bool {
        !self.0.is_disjoint(&other.0)
    }

    pub fn union(&self, other: &AppTokenSet) -> AppTokenSet {
        Self(self.0.union(&other.0).cloned().collect())
    }

    pub fn difference(&self, other: &AppTokenSet) -> AppTokenSet {
        Self(self.0.difference(&other.0).cloned().collect())
    }
}

impl FromIterator<String> for AppTokenSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self::new(iter)
    }
}
