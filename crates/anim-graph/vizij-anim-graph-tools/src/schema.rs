//! Pin layouts of the authoring node kinds.
//!
//! The registry is built once per process and is serializable so editors can draw
//! nodes without linking the compiler.

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use serde::Serialize;
use vizij_anim_graph::GraphValueType;

#[derive(Debug, Clone, Serialize)]
pub struct PinSpec {
    pub name: &'static str,
    pub value_type: GraphValueType,
    pub optional: bool,
}

/// Variable-arity inputs named `"{prefix} {n}"`, counted from zero.
#[derive(Debug, Clone, Serialize)]
pub struct DynamicPinSpec {
    pub prefix: &'static str,
    pub value_type: GraphValueType,
}

impl DynamicPinSpec {
    pub fn pin_name(&self, position: usize) -> String {
        format!("{} {position}", self.prefix)
    }

    /// Position encoded in `name`, if it is one of these pins.
    pub fn parse_pin_name(&self, name: &str) -> Option<usize> {
        let (prefix, tail) = name.rsplit_once(' ')?;
        if prefix != self.prefix {
            return None;
        }
        tail.parse().ok()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeSignature {
    pub type_name: &'static str,
    pub label: &'static str,
    pub category: &'static str,
    pub inputs: Vec<PinSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_inputs: Option<DynamicPinSpec>,
    /// `None` for the result node, which has no output pin.
    pub output: Option<GraphValueType>,
}

impl NodeSignature {
    /// Type and optionality of the input pin called `name`.
    pub fn input(&self, name: &str) -> Option<(GraphValueType, bool)> {
        if let Some(pin) = self.inputs.iter().find(|pin| pin.name == name) {
            return Some((pin.value_type, pin.optional));
        }
        self.dynamic_inputs
            .as_ref()
            .filter(|dynamic| dynamic.parse_pin_name(name).is_some())
            .map(|dynamic| (dynamic.value_type, false))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Registry {
    pub version: &'static str,
    pub nodes: Vec<NodeSignature>,
}

fn pin(name: &'static str, value_type: GraphValueType) -> PinSpec {
    PinSpec {
        name,
        value_type,
        optional: false,
    }
}

fn optional_pin(name: &'static str, value_type: GraphValueType) -> PinSpec {
    PinSpec {
        name,
        value_type,
        optional: true,
    }
}

fn leaf(
    type_name: &'static str,
    label: &'static str,
    category: &'static str,
    output: GraphValueType,
) -> NodeSignature {
    NodeSignature {
        type_name,
        label,
        category,
        inputs: Vec::new(),
        dynamic_inputs: None,
        output: Some(output),
    }
}

pub fn registry() -> Registry {
    use GraphValueType::{BoneMask, Bool, Float, Pose, ID};

    Registry {
        version: "1",
        nodes: vec![
            NodeSignature {
                type_name: "result",
                label: "Result",
                category: "Output",
                inputs: vec![pin("Pose", Pose)],
                dynamic_inputs: None,
                output: None,
            },
            leaf("float_parameter", "Float Parameter", "Parameters", Float),
            leaf("bool_parameter", "Bool Parameter", "Parameters", Bool),
            leaf("id_parameter", "ID Parameter", "Parameters", ID),
            leaf("float_constant", "Float", "Values", Float),
            leaf("bool_constant", "Bool", "Values", Bool),
            leaf("id_constant", "ID", "Values", ID),
            leaf("bone_mask", "Bone Mask", "Bone Masks", BoneMask),
            leaf("fixed_weight_bone_mask", "Fixed Weight Mask", "Bone Masks", BoneMask),
            NodeSignature {
                type_name: "bone_mask_blend",
                label: "Bone Mask Blend",
                category: "Bone Masks",
                inputs: vec![
                    pin("Blend Weight", Float),
                    pin("Source", BoneMask),
                    pin("Target", BoneMask),
                ],
                dynamic_inputs: None,
                output: Some(BoneMask),
            },
            NodeSignature {
                type_name: "bone_mask_selector",
                label: "Bone Mask Selector",
                category: "Bone Masks",
                inputs: vec![pin("Parameter", ID), pin("Default Mask", BoneMask)],
                dynamic_inputs: Some(DynamicPinSpec {
                    prefix: "Mask",
                    value_type: BoneMask,
                }),
                output: Some(BoneMask),
            },
            leaf("reference_pose", "Reference Pose", "Poses", Pose),
            NodeSignature {
                type_name: "pose_blend",
                label: "Blend",
                category: "Poses",
                inputs: vec![
                    pin("Source", Pose),
                    pin("Target", Pose),
                    pin("Blend Weight", Float),
                    optional_pin("Bone Mask", BoneMask),
                ],
                dynamic_inputs: None,
                output: Some(Pose),
            },
            NodeSignature {
                type_name: "graph_events",
                label: "Graph Events",
                category: "Events",
                inputs: vec![pin("Pose", Pose)],
                dynamic_inputs: None,
                output: Some(Pose),
            },
            leaf("child_graph", "Child Graph", "Graphs", Pose),
        ],
    }
}

static SIGNATURES: Lazy<HashMap<&'static str, NodeSignature>> = Lazy::new(|| {
    registry()
        .nodes
        .into_iter()
        .map(|signature| (signature.type_name, signature))
        .collect()
});

/// Signature registered for `type_name`.
pub fn signature(type_name: &str) -> Option<&'static NodeSignature> {
    SIGNATURES.get(type_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dynamic_pin_names_parse() {
        let masks = DynamicPinSpec {
            prefix: "Mask",
            value_type: GraphValueType::BoneMask,
        };
        assert_eq!(masks.pin_name(3), "Mask 3");
        assert_eq!(masks.parse_pin_name("Mask 12"), Some(12));
        assert_eq!(masks.parse_pin_name("Default Mask"), None);
        assert_eq!(masks.parse_pin_name("Mask x"), None);
    }

    #[test]
    fn selector_pins_resolve_through_signature() {
        let selector = signature("bone_mask_selector").unwrap();
        assert_eq!(selector.input("Parameter"), Some((GraphValueType::ID, false)));
        assert_eq!(selector.input("Mask 0"), Some((GraphValueType::BoneMask, false)));
        assert_eq!(selector.input("Weight"), None);

        let blend = signature("pose_blend").unwrap();
        assert_eq!(blend.input("Bone Mask"), Some((GraphValueType::BoneMask, true)));
    }

    #[test]
    fn registry_serializes_for_editors() {
        let json = serde_json::to_value(registry()).unwrap();
        let nodes = json["nodes"].as_array().unwrap();
        assert_eq!(nodes.len(), 15);
        assert!(nodes.iter().any(|n| n["type_name"] == "bone_mask_selector"
            && n["dynamic_inputs"]["prefix"] == "Mask"));
    }
}
