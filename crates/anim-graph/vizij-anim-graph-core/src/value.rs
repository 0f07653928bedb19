//! Value types carried along graph pins.

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// Type of value produced by a node output or accepted by an input pin.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GraphValueType {
    Unknown,
    Bool,
    ID,
    Float,
    Vector,
    Target,
    BoneMask,
    Pose,
    Special,
}

static TYPE_NAMES: Lazy<HashMap<&'static str, GraphValueType>> = Lazy::new(|| {
    GraphValueType::ALL
        .iter()
        .map(|ty| (ty.name(), *ty))
        .collect()
});

impl GraphValueType {
    pub const ALL: [GraphValueType; 9] = [
        GraphValueType::Unknown,
        GraphValueType::Bool,
        GraphValueType::ID,
        GraphValueType::Float,
        GraphValueType::Vector,
        GraphValueType::Target,
        GraphValueType::BoneMask,
        GraphValueType::Pose,
        GraphValueType::Special,
    ];

    pub fn name(self) -> &'static str {
        match self {
            GraphValueType::Unknown => "Unknown",
            GraphValueType::Bool => "Bool",
            GraphValueType::ID => "ID",
            GraphValueType::Float => "Float",
            GraphValueType::Vector => "Vector",
            GraphValueType::Target => "Target",
            GraphValueType::BoneMask => "BoneMask",
            GraphValueType::Pose => "Pose",
            GraphValueType::Special => "Special",
        }
    }

    /// Reverse lookup through the process-wide name registry.
    pub fn from_name(name: &str) -> Option<GraphValueType> {
        TYPE_NAMES.get(name).copied()
    }

    /// Value nodes can feed control inputs; pose nodes feed other pose nodes.
    pub fn is_value(self) -> bool {
        !matches!(
            self,
            GraphValueType::Pose | GraphValueType::Special | GraphValueType::Unknown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_registry() {
        for ty in GraphValueType::ALL {
            assert_eq!(GraphValueType::from_name(ty.name()), Some(ty));
        }
        assert_eq!(GraphValueType::from_name("Matrix"), None);
    }
}
