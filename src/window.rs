//! Window resolution
//!
//! Maps logical window names to targets by exact URL. Every call works on
//! the slice it is given, so callers re-list targets before resolving.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::common::config::AmbiguityPolicy;
use crate::common::{Error, Result};
use crate::driver::Target;

/// Static mapping from logical window name to expected URL
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct WindowTable {
    windows: BTreeMap<String, String>,
}

/// Outcome of resolving one name against the current targets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Found(&'a Target),
    /// Not created yet, or already closed
    NotFound,
}

impl<'a> Resolution<'a> {
    pub fn target(self) -> Option<&'a Target> {
        match self {
            Resolution::Found(target) => Some(target),
            Resolution::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }
}

impl WindowTable {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            windows: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Expected URL of `name`
    pub fn locator(&self, name: &str) -> Result<&str> {
        self.windows
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::UnknownWindowName(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Find the target showing window `name`
    ///
    /// A name missing from the table is a configuration bug and fails with
    /// `UnknownWindowName`. Several targets on the same URL either fail with
    /// `AmbiguousWindow` or resolve to the first one, per `policy`.
    pub fn resolve<'a>(
        &self,
        name: &str,
        targets: &'a [Target],
        policy: AmbiguityPolicy,
    ) -> Result<Resolution<'a>> {
        let url = self.locator(name)?;
        let mut matches = targets.iter().filter(|t| t.url == url);

        let first = match matches.next() {
            Some(target) => target,
            None => return Ok(Resolution::NotFound),
        };

        let extra = matches.count();
        if extra > 0 {
            match policy {
                AmbiguityPolicy::Reject => {
                    return Err(Error::AmbiguousWindow {
                        name: name.to_string(),
                        url: url.to_string(),
                        count: extra + 1,
                    });
                }
                AmbiguityPolicy::First => {
                    tracing::warn!(
                        "{} targets share url {} of window '{}'; using {}",
                        extra + 1,
                        url,
                        name,
                        first.id
                    );
                }
            }
        }

        Ok(Resolution::Found(first))
    }

    /// Resolve every name at once; ambiguity is not an error here
    pub fn match_all<'a>(&self, targets: &'a [Target]) -> Vec<(&str, Vec<&'a Target>)> {
        self.windows
            .iter()
            .map(|(name, url)| {
                let found = targets.iter().filter(|t| t.url == *url).collect();
                (name.as_str(), found)
            })
            .collect()
    }

    /// Logical name of `target`, if its URL is in the table
    pub fn name_of(&self, target: &Target) -> Option<&str> {
        self.windows
            .iter()
            .find(|(_, url)| **url == target.url)
            .map(|(name, _)| name.as_str())
    }
}
