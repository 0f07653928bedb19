//! The compiled settings table: one immutable block per node, addressed by index.
//!
//! Settings hold only primitive fields and indices of other nodes. Every index a node
//! stores points to a node compiled before it, so the table is topologically ordered
//! and a node's inputs can always be instantiated before the node itself.

use hashbrown::HashMap;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::GraphError;
use crate::ids::StringId;
use crate::index::{self, NodeIndex};
use crate::value::GraphValueType;

/// Layout version written into every table.
pub const SETTINGS_TABLE_VERSION: u32 = 1;

/// Closed set of runtime node kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    ControlParameterFloat,
    ControlParameterBool,
    ControlParameterId,
    ConstFloat,
    ConstBool,
    ConstId,
    BoneMask,
    FixedWeightBoneMask,
    BoneMaskBlend,
    BoneMaskSelector,
    ReferencePose,
    PoseBlend,
    GraphEvents,
    ChildGraph,
}

static KIND_NAMES: Lazy<HashMap<&'static str, NodeKind>> =
    Lazy::new(|| NodeKind::ALL.iter().map(|kind| (kind.name(), *kind)).collect());

impl NodeKind {
    pub const ALL: [NodeKind; 14] = [
        NodeKind::ControlParameterFloat,
        NodeKind::ControlParameterBool,
        NodeKind::ControlParameterId,
        NodeKind::ConstFloat,
        NodeKind::ConstBool,
        NodeKind::ConstId,
        NodeKind::BoneMask,
        NodeKind::FixedWeightBoneMask,
        NodeKind::BoneMaskBlend,
        NodeKind::BoneMaskSelector,
        NodeKind::ReferencePose,
        NodeKind::PoseBlend,
        NodeKind::GraphEvents,
        NodeKind::ChildGraph,
    ];

    pub fn name(self) -> &'static str {
        match self {
            NodeKind::ControlParameterFloat => "control_parameter_float",
            NodeKind::ControlParameterBool => "control_parameter_bool",
            NodeKind::ControlParameterId => "control_parameter_id",
            NodeKind::ConstFloat => "const_float",
            NodeKind::ConstBool => "const_bool",
            NodeKind::ConstId => "const_id",
            NodeKind::BoneMask => "bone_mask",
            NodeKind::FixedWeightBoneMask => "fixed_weight_bone_mask",
            NodeKind::BoneMaskBlend => "bone_mask_blend",
            NodeKind::BoneMaskSelector => "bone_mask_selector",
            NodeKind::ReferencePose => "reference_pose",
            NodeKind::PoseBlend => "pose_blend",
            NodeKind::GraphEvents => "graph_events",
            NodeKind::ChildGraph => "child_graph",
        }
    }

    pub fn from_name(name: &str) -> Option<NodeKind> {
        KIND_NAMES.get(name).copied()
    }

    /// Type of value this kind outputs.
    pub fn value_type(self) -> GraphValueType {
        match self {
            NodeKind::ControlParameterFloat | NodeKind::ConstFloat => GraphValueType::Float,
            NodeKind::ControlParameterBool | NodeKind::ConstBool => GraphValueType::Bool,
            NodeKind::ControlParameterId | NodeKind::ConstId => GraphValueType::ID,
            NodeKind::BoneMask
            | NodeKind::FixedWeightBoneMask
            | NodeKind::BoneMaskBlend
            | NodeKind::BoneMaskSelector => GraphValueType::BoneMask,
            NodeKind::ReferencePose
            | NodeKind::PoseBlend
            | NodeKind::GraphEvents
            | NodeKind::ChildGraph => GraphValueType::Pose,
        }
    }

    pub fn is_control_parameter(self) -> bool {
        matches!(
            self,
            NodeKind::ControlParameterFloat
                | NodeKind::ControlParameterBool
                | NodeKind::ControlParameterId
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneMaskSettings {
    pub mask_id: StringId,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FixedWeightBoneMaskSettings {
    /// Stored as authored; the runtime clamps it when building the mask.
    pub bone_weight: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneMaskBlendSettings {
    pub blend_weight_value_node: NodeIndex,
    pub source_mask_node: NodeIndex,
    pub target_mask_node: NodeIndex,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneMaskSelectorSettings {
    pub parameter_value_node: NodeIndex,
    pub default_mask_node: NodeIndex,
    /// Option masks, positionally paired with `parameter_values`.
    pub mask_nodes: Vec<NodeIndex>,
    pub parameter_values: Vec<StringId>,
    pub switch_dynamically: bool,
    pub blend_time: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseBlendSettings {
    pub source_node: NodeIndex,
    pub target_node: NodeIndex,
    pub blend_weight_value_node: NodeIndex,
    #[serde(with = "index::optional")]
    pub bone_mask_node: Option<NodeIndex>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphEventsSettings {
    pub child_node: NodeIndex,
    pub event_ids: Vec<StringId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChildGraphSettings {
    /// Slot of the child graph in the data set's resource list.
    pub child_graph_idx: u16,
}

/// One node's compiled parameters. The node's index is its position in the table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSettings {
    ControlParameterFloat { id: StringId, default: f32 },
    ControlParameterBool { id: StringId, default: bool },
    ControlParameterId { id: StringId, default: StringId },
    ConstFloat { value: f32 },
    ConstBool { value: bool },
    ConstId { value: StringId },
    BoneMask(BoneMaskSettings),
    FixedWeightBoneMask(FixedWeightBoneMaskSettings),
    BoneMaskBlend(BoneMaskBlendSettings),
    BoneMaskSelector(BoneMaskSelectorSettings),
    ReferencePose,
    PoseBlend(PoseBlendSettings),
    GraphEvents(GraphEventsSettings),
    ChildGraph(ChildGraphSettings),
}

macro_rules! settings_from {
    ($($settings:ident => $variant:ident),* $(,)?) => {
        $(
            impl From<$settings> for NodeSettings {
                fn from(settings: $settings) -> Self {
                    NodeSettings::$variant(settings)
                }
            }
        )*
    };
}

settings_from! {
    BoneMaskSettings => BoneMask,
    FixedWeightBoneMaskSettings => FixedWeightBoneMask,
    BoneMaskBlendSettings => BoneMaskBlend,
    BoneMaskSelectorSettings => BoneMaskSelector,
    PoseBlendSettings => PoseBlend,
    GraphEventsSettings => GraphEvents,
    ChildGraphSettings => ChildGraph,
}

impl NodeSettings {
    pub fn kind(&self) -> NodeKind {
        match self {
            NodeSettings::ControlParameterFloat { .. } => NodeKind::ControlParameterFloat,
            NodeSettings::ControlParameterBool { .. } => NodeKind::ControlParameterBool,
            NodeSettings::ControlParameterId { .. } => NodeKind::ControlParameterId,
            NodeSettings::ConstFloat { .. } => NodeKind::ConstFloat,
            NodeSettings::ConstBool { .. } => NodeKind::ConstBool,
            NodeSettings::ConstId { .. } => NodeKind::ConstId,
            NodeSettings::BoneMask(_) => NodeKind::BoneMask,
            NodeSettings::FixedWeightBoneMask(_) => NodeKind::FixedWeightBoneMask,
            NodeSettings::BoneMaskBlend(_) => NodeKind::BoneMaskBlend,
            NodeSettings::BoneMaskSelector(_) => NodeKind::BoneMaskSelector,
            NodeSettings::ReferencePose => NodeKind::ReferencePose,
            NodeSettings::PoseBlend(_) => NodeKind::PoseBlend,
            NodeSettings::GraphEvents(_) => NodeKind::GraphEvents,
            NodeSettings::ChildGraph(_) => NodeKind::ChildGraph,
        }
    }

    pub fn value_type(&self) -> GraphValueType {
        self.kind().value_type()
    }

    /// Control parameter id, if this node is a control parameter.
    pub fn parameter_id(&self) -> Option<&StringId> {
        match self {
            NodeSettings::ControlParameterFloat { id, .. }
            | NodeSettings::ControlParameterBool { id, .. }
            | NodeSettings::ControlParameterId { id, .. } => Some(id),
            _ => None,
        }
    }

    /// Every node index stored in these settings, with the value type expected there.
    pub fn inputs(&self) -> Vec<(NodeIndex, GraphValueType)> {
        match self {
            NodeSettings::BoneMaskBlend(s) => vec![
                (s.blend_weight_value_node, GraphValueType::Float),
                (s.source_mask_node, GraphValueType::BoneMask),
                (s.target_mask_node, GraphValueType::BoneMask),
            ],
            NodeSettings::BoneMaskSelector(s) => {
                let mut inputs = vec![
                    (s.parameter_value_node, GraphValueType::ID),
                    (s.default_mask_node, GraphValueType::BoneMask),
                ];
                inputs.extend(s.mask_nodes.iter().map(|n| (*n, GraphValueType::BoneMask)));
                inputs
            }
            NodeSettings::PoseBlend(s) => {
                let mut inputs = vec![
                    (s.source_node, GraphValueType::Pose),
                    (s.target_node, GraphValueType::Pose),
                    (s.blend_weight_value_node, GraphValueType::Float),
                ];
                if let Some(mask) = s.bone_mask_node {
                    inputs.push((mask, GraphValueType::BoneMask));
                }
                inputs
            }
            NodeSettings::GraphEvents(s) => vec![(s.child_node, GraphValueType::Pose)],
            _ => Vec::new(),
        }
    }
}

/// Flat, versioned array of node settings plus the root and parameter lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SettingsTable {
    pub version: u32,
    pub node_count: u16,
    pub nodes: Vec<NodeSettings>,
    pub root: NodeIndex,
    #[serde(default, serialize_with = "serialize_sorted")]
    pub parameter_lookup: HashMap<StringId, NodeIndex>,
}

/// Write the lookup in id order so a table always serializes to the same bytes.
fn serialize_sorted<S>(lookup: &HashMap<StringId, NodeIndex>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    lookup.iter().collect::<BTreeMap<_, _>>().serialize(serializer)
}

impl SettingsTable {
    pub fn new(
        nodes: Vec<NodeSettings>,
        root: NodeIndex,
        parameter_lookup: HashMap<StringId, NodeIndex>,
    ) -> Result<Self, GraphError> {
        let node_count = u16::try_from(nodes.len())
            .ok()
            .filter(|count| (*count as usize) <= NodeIndex::MAX_NODES)
            .ok_or(GraphError::NodeCountMismatch {
                declared: NodeIndex::MAX_NODES,
                actual: nodes.len(),
            })?;
        let table = SettingsTable {
            version: SETTINGS_TABLE_VERSION,
            node_count,
            nodes,
            root,
            parameter_lookup,
        };
        table.validate()?;
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: NodeIndex) -> Option<&NodeSettings> {
        self.nodes.get(index.get())
    }

    pub fn parameter_index(&self, id: &StringId) -> Option<NodeIndex> {
        self.parameter_lookup.get(id).copied()
    }

    /// Indices of child-graph nodes, in table order.
    pub fn child_graph_nodes(&self) -> Vec<NodeIndex> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| matches!(node, NodeSettings::ChildGraph(_)))
            .filter_map(|(i, _)| NodeIndex::from_usize(i))
            .collect()
    }

    /// Check every stored index once, so instantiation never has to.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.version != SETTINGS_TABLE_VERSION {
            return Err(GraphError::UnsupportedVersion {
                found: self.version,
                expected: SETTINGS_TABLE_VERSION,
            });
        }
        let count = self.nodes.len();
        if self.node_count as usize != count || count > NodeIndex::MAX_NODES {
            return Err(GraphError::NodeCountMismatch {
                declared: self.node_count as usize,
                actual: count,
            });
        }

        for (position, settings) in self.nodes.iter().enumerate() {
            // position < count <= MAX_NODES, so it always fits
            let Some(node) = NodeIndex::from_usize(position) else {
                continue;
            };
            for (input, expected) in settings.inputs() {
                if input.get() >= count {
                    return Err(GraphError::IndexOutOfRange {
                        node: position,
                        index: input.raw(),
                        count,
                    });
                }
                if input >= node {
                    return Err(GraphError::ForwardReference { node, index: input });
                }
                let actual = self.nodes[input.get()].value_type();
                if actual != expected {
                    return Err(GraphError::ValueTypeMismatch {
                        node,
                        index: input,
                        expected,
                        actual,
                    });
                }
            }
        }

        let root = self.get(self.root).ok_or(GraphError::IndexOutOfRange {
            node: count,
            index: self.root.raw(),
            count,
        })?;
        if root.value_type() != GraphValueType::Pose {
            return Err(GraphError::InvalidRoot(self.root));
        }

        for (id, index) in &self.parameter_lookup {
            match self.get(*index).and_then(NodeSettings::parameter_id) {
                Some(stored) if stored == id => {}
                _ => return Err(GraphError::UnknownParameter(id.to_string())),
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let table: SettingsTable = serde_json::from_str(json)?;
        table.validate()?;
        Ok(table)
    }

    pub fn to_json(&self) -> Result<String, GraphError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn idx(raw: i16) -> NodeIndex {
        NodeIndex::new(raw).unwrap()
    }

    fn mask_blend_table() -> Vec<NodeSettings> {
        vec![
            NodeSettings::ConstFloat { value: 0.5 },
            NodeSettings::FixedWeightBoneMask(FixedWeightBoneMaskSettings { bone_weight: 0.0 }),
            NodeSettings::FixedWeightBoneMask(FixedWeightBoneMaskSettings { bone_weight: 1.0 }),
            NodeSettings::BoneMaskBlend(BoneMaskBlendSettings {
                blend_weight_value_node: idx(0),
                source_mask_node: idx(1),
                target_mask_node: idx(2),
            }),
            NodeSettings::ReferencePose,
            NodeSettings::ReferencePose,
            NodeSettings::PoseBlend(PoseBlendSettings {
                source_node: idx(4),
                target_node: idx(5),
                blend_weight_value_node: idx(0),
                bone_mask_node: Some(idx(3)),
            }),
        ]
    }

    #[test]
    fn kind_names_resolve_through_registry() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::from_name(kind.name()), Some(kind));
        }
        let json = serde_json::to_string(&NodeKind::BoneMaskSelector).unwrap();
        assert_eq!(json, format!("\"{}\"", NodeKind::BoneMaskSelector.name()));
    }

    #[test]
    fn valid_table_persists_with_sentinel() {
        let mut nodes = mask_blend_table();
        if let NodeSettings::PoseBlend(blend) = &mut nodes[6] {
            blend.bone_mask_node = None;
        }
        let table = SettingsTable::new(nodes, idx(6), HashMap::new()).unwrap();
        let json = table.to_json().unwrap();
        assert!(json.contains("\"bone_mask_node\": -1"));
        assert_eq!(SettingsTable::from_json(&json).unwrap(), table);
    }

    #[test]
    fn rejects_out_of_range_index() {
        let mut nodes = mask_blend_table();
        nodes.truncate(4);
        nodes.push(NodeSettings::GraphEvents(GraphEventsSettings {
            child_node: idx(40),
            event_ids: vec![],
        }));
        let err = SettingsTable::new(nodes, idx(4), HashMap::new()).unwrap_err();
        assert!(matches!(err, GraphError::IndexOutOfRange { node: 4, index: 40, .. }));
    }

    #[test]
    fn rejects_forward_reference_and_type_mismatch() {
        let mut nodes = mask_blend_table();
        nodes.swap(0, 3);
        let err = SettingsTable::new(nodes, idx(6), HashMap::new()).unwrap_err();
        assert!(matches!(err, GraphError::ForwardReference { .. }));

        let mut nodes = mask_blend_table();
        nodes[0] = NodeSettings::ConstBool { value: true };
        let err = SettingsTable::new(nodes, idx(6), HashMap::new()).unwrap_err();
        assert!(matches!(
            err,
            GraphError::ValueTypeMismatch { expected: GraphValueType::Float, .. }
        ));
    }

    #[test]
    fn parameter_lookup_serializes_in_id_order() {
        let mut nodes = vec![
            NodeSettings::ControlParameterFloat {
                id: StringId::new("Speed"),
                default: 0.0,
            },
            NodeSettings::ControlParameterFloat {
                id: StringId::new("Aim"),
                default: 0.0,
            },
            NodeSettings::ControlParameterFloat {
                id: StringId::new("Lean"),
                default: 0.0,
            },
        ];
        nodes.push(NodeSettings::ReferencePose);
        let lookup: HashMap<StringId, NodeIndex> = [("Speed", 0), ("Aim", 1), ("Lean", 2)]
            .into_iter()
            .map(|(id, raw)| (StringId::new(id), idx(raw)))
            .collect();
        let table = SettingsTable::new(nodes, idx(3), lookup).unwrap();

        let json = serde_json::to_string(&table).unwrap();
        assert!(json.contains(r#""parameter_lookup":{"Aim":1,"Lean":2,"Speed":0}"#), "{json}");
        let mut reversed = table.clone();
        reversed.parameter_lookup = [("Lean", 2), ("Aim", 1), ("Speed", 0)]
            .into_iter()
            .map(|(id, raw)| (StringId::new(id), idx(raw)))
            .collect();
        assert_eq!(serde_json::to_string(&reversed).unwrap(), json);
        assert_eq!(SettingsTable::from_json(&json).unwrap(), table);
    }

    #[test]
    fn root_must_be_a_pose() {
        let err = SettingsTable::new(mask_blend_table(), idx(3), HashMap::new()).unwrap_err();
        assert_eq!(err, GraphError::InvalidRoot(idx(3)));
    }

    #[test]
    fn declared_count_must_match() {
        let table = SettingsTable::new(mask_blend_table(), idx(6), HashMap::new()).unwrap();
        let mut value = serde_json::to_value(&table).unwrap();
        value["node_count"] = serde_json::json!(3);
        let err = SettingsTable::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, GraphError::NodeCountMismatch { declared: 3, actual: 7 }));
    }
}
