//! Response status classification.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Set of status codes, as decimal strings, that count as success.
///
/// Matching is exact string membership; `"2xx"` style ranges are not
/// interpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpectedStatusCodes(BTreeSet<String>);

impl ExpectedStatusCodes {
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.0.contains(code)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for ExpectedStatusCodes {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// Whether `code` is one of the expected status codes.
///
/// An empty set never matches.
#[must_use]
pub fn is_expected(code: &str, expected: &ExpectedStatusCodes) -> bool {
    expected.contains(code)
}
