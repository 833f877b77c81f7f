//! Bank directory: the static code → name table the query builder checks
//! bank codes against.
//!
//! The table itself is reference data owned elsewhere; this module only
//! loads and reads it.

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct BankDirectory {
    banks: BTreeMap<String, String>,
}

impl BankDirectory {
    /// Parse a JSON object of `{ "<code>": "<name>" }`.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let banks: BTreeMap<String, String> = serde_json::from_str(json)?;
        if banks.is_empty() {
            return Err(Error::Directory("no banks available".into()));
        }
        Ok(Self { banks })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&json)
    }

    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.banks.contains_key(code)
    }

    #[must_use]
    pub fn name(&self, code: &str) -> Option<&str> {
        self.banks.get(code).map(String::as_str)
    }

    /// Default selection: the lowest bank code.
    #[must_use]
    pub fn first_code(&self) -> Option<&str> {
        self.banks.keys().next().map(String::as_str)
    }

    /// Entries whose name contains `filter`, case-insensitively, ordered by code.
    pub fn search<'a>(
        &'a self,
        filter: &str,
    ) -> impl Iterator<Item = (&'a str, &'a str)> + use<'a> {
        let needle = filter.to_lowercase();
        self.banks
            .iter()
            .filter(move |(_, name)| name.to_lowercase().contains(&needle))
            .map(|(code, name)| (code.as_str(), name.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.banks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.banks.is_empty()
    }
}

impl<C: Into<String>, N: Into<String>> FromIterator<(C, N)> for BankDirectory {
    fn from_iter<I: IntoIterator<Item = (C, N)>>(iter: I) -> Self {
        Self {
            banks: iter
                .into_iter()
                .map(|(code, name)| (code.into(), name.into()))
                .collect(),
        }
    }
}
