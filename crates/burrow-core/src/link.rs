use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// Identifier of a shortened link.
///
/// Ids are assigned sequentially per backend instance, starting at 1. The
/// public form is the decimal number, which is also the redirect path segment.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(u64);

impl LinkId {
    /// The id assigned to the first link of an empty backend.
    pub const FIRST: LinkId = LinkId(1);

    /// Creates a `LinkId` from its numeric value.
    ///
    /// Returns `None` for zero, which is never assigned.
    pub fn new(value: u64) -> Option<Self> {
        (value > 0).then_some(Self(value))
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Generates the full shortened URL based on the provided base URL.
    pub fn to_url(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self)
    }
}

impl Display for LinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for LinkId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .ok()
            .and_then(LinkId::new)
            .ok_or_else(|| CoreError::InvalidLinkId(s.to_string()))
    }
}

/// A link as listed in an owner's history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    pub id: LinkId,
    /// The original URL that was shortened.
    pub original_url: String,
}

/// Outcome of a create call.
///
/// `ids` holds one id per input URL in input order. `conflict` is set when at
/// least one URL was already stored and its existing id was returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Created {
    pub ids: Vec<LinkId>,
    pub conflict: bool,
}

/// Aggregate counts over a backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statistic {
    /// Total number of shortened URLs.
    pub urls: u64,
    /// Total number of distinct owners.
    pub users: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_valid_ids() {
        assert_eq!("1".parse::<LinkId>().unwrap(), LinkId::FIRST);
        assert_eq!("42".parse::<LinkId>().unwrap().get(), 42);
    }

    #[test]
    fn parse_rejects_zero_and_garbage() {
        assert!("0".parse::<LinkId>().is_err());
        assert!("".parse::<LinkId>().is_err());
        assert!("abc".parse::<LinkId>().is_err());
        assert!("-1".parse::<LinkId>().is_err());
    }

    #[test]
    fn to_url_trims_trailing_slash() {
        let id = LinkId::new(7).unwrap();
        assert_eq!(
            id.to_url("http://127.0.0.1:8080"),
            "http://127.0.0.1:8080/7"
        );
        assert_eq!(
            id.to_url("http://127.0.0.1:8080/"),
            "http://127.0.0.1:8080/7"
        );
    }
}
