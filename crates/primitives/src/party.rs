//! Party identities for the threshold signing group.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity of one signing party, the string form of the node's network
/// identity.
///
/// Party ids are compared and sorted lexicographically; every node must
/// derive the same participant ordering from the same id set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartyId(String);

impl PartyId {
    /// Wraps a raw identity string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identity bytes used to derive protocol identifiers.
    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

impl fmt::Display for PartyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartyId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for PartyId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Sorts a list of party ids into the canonical (lexicographic) signing
/// order.
pub fn sort_parties(mut parties: Vec<PartyId>) -> Vec<PartyId> {
    parties.sort();
    parties
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parties_sort_lexicographically() {
        let parties = vec![
            PartyId::from("12D3KooWC"),
            PartyId::from("12D3KooWA"),
            PartyId::from("12D3KooWB"),
        ];
        let sorted = sort_parties(parties);
        let ids: Vec<&str> = sorted.iter().map(PartyId::as_str).collect();
        assert_eq!(ids, vec!["12D3KooWA", "12D3KooWB", "12D3KooWC"]);
    }
}
