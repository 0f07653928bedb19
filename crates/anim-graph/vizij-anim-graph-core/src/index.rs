//! Node indices and the persisted `-1` sentinel.
//!
//! In memory an absent reference is always `Option<NodeIndex>`; the raw sentinel only
//! exists in the serialized settings layout (see [`optional`]).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw value written for an absent optional index.
pub const INVALID_INDEX: i16 = -1;

/// Index of a node within one compiled settings table.
///
/// Indices are only meaningful for the table that issued them; recompiling a graph may
/// assign different indices to the same authored node.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i16", into = "i16")]
pub struct NodeIndex(i16);

impl NodeIndex {
    /// Largest number of nodes a single table can address.
    pub const MAX_NODES: usize = i16::MAX as usize;

    pub const ZERO: NodeIndex = NodeIndex(0);

    /// Wrap a raw index; negative values (including the sentinel) are rejected.
    pub fn new(raw: i16) -> Option<Self> {
        (raw >= 0).then_some(NodeIndex(raw))
    }

    /// Convert a table position into an index, if it fits.
    pub fn from_usize(position: usize) -> Option<Self> {
        i16::try_from(position).ok().and_then(NodeIndex::new)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub fn raw(self) -> i16 {
        self.0
    }
}

impl fmt::Display for NodeIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a raw value cannot be used as a required index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{0} is not a valid node index")]
pub struct InvalidNodeIndex(pub i16);

impl TryFrom<i16> for NodeIndex {
    type Error = InvalidNodeIndex;

    fn try_from(raw: i16) -> Result<Self, Self::Error> {
        NodeIndex::new(raw).ok_or(InvalidNodeIndex(raw))
    }
}

impl From<NodeIndex> for i16 {
    fn from(index: NodeIndex) -> Self {
        index.0
    }
}

/// Raw form of an optional index, using [`INVALID_INDEX`] for `None`.
pub fn to_raw(index: Option<NodeIndex>) -> i16 {
    index.map_or(INVALID_INDEX, NodeIndex::raw)
}

/// Serde adapter storing `Option<NodeIndex>` as a plain `i16` with the `-1` sentinel.
pub mod optional {
    use super::{NodeIndex, INVALID_INDEX};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(index: &Option<NodeIndex>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_i16(super::to_raw(*index))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NodeIndex>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = i16::deserialize(deserializer)?;
        if raw == INVALID_INDEX {
            return Ok(None);
        }
        NodeIndex::new(raw)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("{raw} is not a valid node index")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "optional")]
        link: Option<NodeIndex>,
        required: NodeIndex,
    }

    #[test]
    fn rejects_negative_raw_values() {
        assert!(NodeIndex::new(-1).is_none());
        assert!(NodeIndex::new(-7).is_none());
        assert_eq!(NodeIndex::new(0).map(NodeIndex::get), Some(0));
        assert!(NodeIndex::from_usize(NodeIndex::MAX_NODES + 1).is_none());
    }

    #[test]
    fn optional_index_uses_sentinel_on_the_wire() {
        let json = serde_json::to_string(&Holder {
            link: None,
            required: NodeIndex::new(3).unwrap(),
        })
        .unwrap();
        assert_eq!(json, r#"{"link":-1,"required":3}"#);

        let back: Holder = serde_json::from_str(r#"{"link":4,"required":0}"#).unwrap();
        assert_eq!(back.link, NodeIndex::new(4));
    }

    #[test]
    fn required_index_refuses_sentinel() {
        let err = serde_json::from_str::<Holder>(r#"{"link":-1,"required":-1}"#);
        assert!(err.is_err());
        let err = serde_json::from_str::<Holder>(r#"{"link":-2,"required":1}"#);
        assert!(err.is_err());
    }
}
