//! Editable node + pin graph.
//!
//! Nodes are addressed by a stable [`NodeId`]; every input pin stores at most one link to
//! the node feeding it. Output pins are implicit: each node kind has at most one output,
//! typed by its signature. Editing operations keep the graph acyclic and type correct,
//! but documents loaded from disk are only checked by [`ToolsGraph::validate_layout`]
//! and by the compiler.

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

use anyhow::Context;
use hashbrown::HashSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use vizij_anim_graph::{GraphValueType, ResourceId, StringId};

use crate::error::GraphEditError;
use crate::nodes::ToolsNodeKind;
use crate::schema::NodeSignature;

/// Authoring identity of a node; survives recompilation, unlike runtime indices.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(Uuid);

impl NodeId {
    pub fn new_v4() -> Self {
        NodeId(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        NodeId(id)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputPin {
    pub name: String,
    #[serde(default)]
    pub link: Option<NodeId>,
}

impl InputPin {
    pub fn new(name: impl Into<String>) -> Self {
        InputPin {
            name: name.into(),
            link: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolsNode {
    pub id: NodeId,
    /// Display name; falls back to the kind's label when empty.
    #[serde(default)]
    pub name: String,
    pub kind: ToolsNodeKind,
    #[serde(default)]
    pub inputs: Vec<InputPin>,
}

impl ToolsNode {
    /// Node with a fresh id and the default pins of its kind.
    pub fn new(kind: ToolsNodeKind) -> Self {
        let mut inputs: Vec<InputPin> = kind
            .signature()
            .map(|sig| sig.inputs.iter().map(|pin| InputPin::new(pin.name)).collect())
            .unwrap_or_default();
        if let Some(dynamic) = kind.signature().and_then(|sig| sig.dynamic_inputs.as_ref()) {
            let count = kind.selection_keys().map_or(0, <[StringId]>::len);
            inputs.extend((0..count).map(|position| InputPin::new(dynamic.pin_name(position))));
        }
        ToolsNode {
            id: NodeId::new_v4(),
            name: String::new(),
            kind,
            inputs,
        }
    }

    pub fn signature(&self) -> Option<&'static NodeSignature> {
        self.kind.signature()
    }

    pub fn display_name(&self) -> &str {
        if !self.name.is_empty() {
            return &self.name;
        }
        self.signature().map_or("", |sig| sig.label)
    }

    pub fn input(&self, pin: &str) -> Option<&InputPin> {
        self.inputs.iter().find(|input| input.name == pin)
    }

    fn input_mut(&mut self, pin: &str) -> Option<&mut InputPin> {
        self.inputs.iter_mut().find(|input| input.name == pin)
    }

    /// Node feeding `pin`, if the pin exists and is connected.
    pub fn input_link(&self, pin: &str) -> Option<NodeId> {
        self.input(pin).and_then(|input| input.link)
    }

    fn is_dynamic_pin(&self, name: &str) -> bool {
        self.signature()
            .and_then(|sig| sig.dynamic_inputs.as_ref())
            .and_then(|dynamic| dynamic.parse_pin_name(name))
            .is_some()
    }

    /// Dynamic pins, in stored (left-to-right) order.
    pub fn dynamic_pins(&self) -> impl Iterator<Item = &InputPin> + '_ {
        self.inputs
            .iter()
            .filter(move |input| self.is_dynamic_pin(&input.name))
    }

    pub fn num_dynamic_pins(&self) -> usize {
        self.dynamic_pins().count()
    }

    fn validate_pins(&self) -> Result<(), GraphEditError> {
        let Some(signature) = self.signature() else {
            return Ok(());
        };
        let invalid = |reason: String| GraphEditError::InvalidLayout {
            node: self.id,
            reason,
        };
        let mut seen = HashSet::new();
        for input in &self.inputs {
            if signature.input(&input.name).is_none() {
                return Err(invalid(format!("unknown input pin '{}'", input.name)));
            }
            if !seen.insert(input.name.as_str()) {
                return Err(invalid(format!("input pin '{}' appears twice", input.name)));
            }
        }
        if let Some(dynamic) = signature.dynamic_inputs.as_ref() {
            for (position, input) in self.dynamic_pins().enumerate() {
                if dynamic.parse_pin_name(&input.name) != Some(position) {
                    return Err(invalid(format!(
                        "dynamic pin '{}' is out of order; expected '{}'",
                        input.name,
                        dynamic.pin_name(position)
                    )));
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsGraph {
    pub name: StringId,
    #[serde(default)]
    pub skeleton: Option<ResourceId>,
    #[serde(default)]
    pub nodes: Vec<ToolsNode>,
}

impl ToolsGraph {
    pub fn new(name: impl Into<StringId>) -> Self {
        ToolsGraph {
            name: name.into(),
            skeleton: None,
            nodes: Vec::new(),
        }
    }

    pub fn with_skeleton(mut self, skeleton: ResourceId) -> Self {
        self.skeleton = Some(skeleton);
        self
    }

    pub fn add_node(&mut self, kind: ToolsNodeKind) -> NodeId {
        self.insert(ToolsNode::new(kind))
    }

    pub fn add_named_node(&mut self, name: impl Into<String>, kind: ToolsNodeKind) -> NodeId {
        let mut node = ToolsNode::new(kind);
        node.name = name.into();
        self.insert(node)
    }

    fn insert(&mut self, node: ToolsNode) -> NodeId {
        let id = node.id;
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: NodeId) -> Option<&ToolsNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ToolsNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    fn require_mut(&mut self, id: NodeId) -> Result<&mut ToolsNode, GraphEditError> {
        self.node_mut(id).ok_or(GraphEditError::UnknownNode(id))
    }

    /// Remove a node and every link pointing at it.
    pub fn remove_node(&mut self, id: NodeId) -> Option<ToolsNode> {
        let position = self.nodes.iter().position(|node| node.id == id)?;
        let removed = self.nodes.remove(position);
        for input in self.nodes.iter_mut().flat_map(|node| node.inputs.iter_mut()) {
            if input.link == Some(id) {
                input.link = None;
            }
        }
        Some(removed)
    }

    /// Connect the output of `from` to input `pin` of `to`, replacing any previous link.
    pub fn connect(&mut self, from: NodeId, to: NodeId, pin: &str) -> Result<(), GraphEditError> {
        let source = self.node(from).ok_or(GraphEditError::UnknownNode(from))?;
        let target = self.node(to).ok_or(GraphEditError::UnknownNode(to))?;
        let actual = source
            .kind
            .output_type()
            .ok_or(GraphEditError::NoOutput(from))?;
        let unknown_pin = || GraphEditError::UnknownPin {
            node: to,
            pin: pin.to_string(),
        };
        if target.input(pin).is_none() {
            return Err(unknown_pin());
        }
        let (expected, _) = target
            .signature()
            .and_then(|sig| sig.input(pin))
            .ok_or_else(unknown_pin)?;
        if expected != actual {
            return Err(GraphEditError::TypeMismatch {
                pin: pin.to_string(),
                expected,
                actual,
            });
        }
        if from == to || self.depends_on(from, to) {
            return Err(GraphEditError::WouldCreateCycle { from, to });
        }

        if let Some(input) = self.require_mut(to)?.input_mut(pin) {
            input.link = Some(from);
        }
        Ok(())
    }

    /// Clear the link on `pin`, returning the node that was connected.
    pub fn disconnect(&mut self, to: NodeId, pin: &str) -> Result<Option<NodeId>, GraphEditError> {
        let node = self.require_mut(to)?;
        let input = node.input_mut(pin).ok_or_else(|| GraphEditError::UnknownPin {
            node: to,
            pin: pin.to_string(),
        })?;
        Ok(input.link.take())
    }

    /// True when `node` reads, directly or transitively, from `upstream`.
    pub fn depends_on(&self, node: NodeId, upstream: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(current) = self.node(current) else {
                continue;
            };
            for link in current.inputs.iter().filter_map(|input| input.link) {
                if link == upstream {
                    return true;
                }
                stack.push(link);
            }
        }
        false
    }

    /// Append an option pin (and an empty selection key) to a node with dynamic inputs.
    /// Returns the new pin's name.
    pub fn add_dynamic_pin(&mut self, id: NodeId) -> Result<String, GraphEditError> {
        let node = self.require_mut(id)?;
        let dynamic = node
            .signature()
            .and_then(|sig| sig.dynamic_inputs.as_ref())
            .ok_or(GraphEditError::NoDynamicPins(id))?;
        let name = dynamic.pin_name(node.num_dynamic_pins());
        node.inputs.push(InputPin::new(name.clone()));
        if let Some(keys) = node.kind.selection_keys_mut() {
            keys.push(StringId::none());
        }
        Ok(name)
    }

    /// Remove option pin `position`. Its selection key goes with it when pins and keys
    /// are aligned; remaining option pins are renamed to stay contiguous.
    pub fn remove_dynamic_pin(&mut self, id: NodeId, position: usize) -> Result<(), GraphEditError> {
        let node = self.require_mut(id)?;
        let dynamic = node
            .signature()
            .and_then(|sig| sig.dynamic_inputs.as_ref())
            .ok_or(GraphEditError::NoDynamicPins(id))?;

        let pin_count = node.num_dynamic_pins();
        let slot = node
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, input)| dynamic.parse_pin_name(&input.name).is_some())
            .nth(position)
            .map(|(slot, _)| slot)
            .ok_or(GraphEditError::UnknownDynamicPin { node: id, position })?;
        node.inputs.remove(slot);

        if let Some(keys) = node.kind.selection_keys_mut() {
            if keys.len() == pin_count {
                keys.remove(position);
            }
        }

        let mut next = 0;
        for input in node.inputs.iter_mut() {
            if dynamic.parse_pin_name(&input.name).is_some() {
                input.name = dynamic.pin_name(next);
                next += 1;
            }
        }
        Ok(())
    }

    /// Every set identifier used by the graph's nodes.
    pub fn collect_ids(&self) -> BTreeSet<StringId> {
        let mut ids = BTreeSet::new();
        for node in &self.nodes {
            node.kind.collect_ids(&mut ids);
        }
        ids
    }

    /// Replace `old` with `new` wherever a node uses it. Returns the number of nodes changed.
    pub fn rename_ids(&mut self, old: &StringId, new: &StringId) -> usize {
        self.nodes
            .iter_mut()
            .map(|node| node.kind.rename_id(old, new))
            .filter(|changed| *changed)
            .count()
    }

    /// Structural checks: unique node ids, known and unique pin names, contiguous
    /// dynamic pins, and links that point at existing nodes with an output.
    pub fn validate_layout(&self) -> Result<(), GraphEditError> {
        let mut ids = HashSet::new();
        for node in &self.nodes {
            if !ids.insert(node.id) {
                return Err(GraphEditError::DuplicateNode(node.id));
            }
        }
        for node in &self.nodes {
            node.validate_pins()?;
            for link in node.inputs.iter().filter_map(|input| input.link) {
                let source = self.node(link).ok_or(GraphEditError::UnknownNode(link))?;
                if source.kind.output_type().is_none() {
                    return Err(GraphEditError::NoOutput(link));
                }
            }
        }
        Ok(())
    }

    /// Value type produced by `id`, if it exists and has an output.
    pub fn output_type(&self, id: NodeId) -> Option<GraphValueType> {
        self.node(id).and_then(|node| node.kind.output_type())
    }

    pub fn from_json_str(json: &str) -> Result<Self, GraphEditError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, GraphEditError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("reading graph {}", path.display()))?;
        let graph = Self::from_json_str(&json)
            .with_context(|| format!("parsing graph {}", path.display()))?;
        graph
            .validate_layout()
            .with_context(|| format!("validating graph {}", path.display()))?;
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blend_weight() -> ToolsNodeKind {
        ToolsNodeKind::FloatConstant { value: 0.5 }
    }

    #[test]
    fn new_nodes_get_signature_pins() {
        let node = ToolsNode::new(ToolsNodeKind::BoneMaskSelector {
            parameter_values: vec![StringId::new("a"), StringId::new("b")],
            switch_dynamically: false,
            blend_time: 0.0,
        });
        let names: Vec<_> = node.inputs.iter().map(|pin| pin.name.as_str()).collect();
        assert_eq!(names, ["Parameter", "Default Mask", "Mask 0", "Mask 1"]);
        assert_eq!(node.display_name(), "Bone Mask Selector");
    }

    #[test]
    fn connect_checks_types_and_pins() {
        let mut graph = ToolsGraph::new("g");
        let weight = graph.add_node(blend_weight());
        let mask = graph.add_node(ToolsNodeKind::FixedWeightBoneMask { bone_weight: 1.0 });
        let blend = graph.add_node(ToolsNodeKind::BoneMaskBlend);

        graph.connect(weight, blend, "Blend Weight").unwrap();
        graph.connect(mask, blend, "Source").unwrap();
        assert_eq!(graph.node(blend).unwrap().input_link("Source"), Some(mask));

        let err = graph.connect(weight, blend, "Target").unwrap_err();
        assert!(matches!(err, GraphEditError::TypeMismatch { .. }));
        let err = graph.connect(mask, blend, "Mask 0").unwrap_err();
        assert!(matches!(err, GraphEditError::UnknownPin { .. }));
    }

    #[test]
    fn connect_rejects_cycles() {
        let mut graph = ToolsGraph::new("g");
        let a = graph.add_node(ToolsNodeKind::PoseBlend);
        let b = graph.add_node(ToolsNodeKind::PoseBlend);
        graph.connect(a, b, "Source").unwrap();
        let err = graph.connect(b, a, "Target").unwrap_err();
        assert_eq!(err, GraphEditError::WouldCreateCycle { from: b, to: a });
        let err = graph.connect(a, a, "Target").unwrap_err();
        assert!(matches!(err, GraphEditError::WouldCreateCycle { .. }));
    }

    #[test]
    fn remove_node_clears_links() {
        let mut graph = ToolsGraph::new("g");
        let pose = graph.add_node(ToolsNodeKind::ReferencePose);
        let events = graph.add_node(ToolsNodeKind::GraphEvents { event_ids: vec![] });
        graph.connect(pose, events, "Pose").unwrap();
        assert!(graph.remove_node(pose).is_some());
        assert_eq!(graph.node(events).unwrap().input_link("Pose"), None);
        assert!(graph.remove_node(pose).is_none());
    }

    #[test]
    fn layout_rejects_unknown_pins_and_links() {
        let mut graph = ToolsGraph::new("g");
        let blend = graph.add_node(ToolsNodeKind::BoneMaskBlend);
        graph.validate_layout().unwrap();

        graph.node_mut(blend).unwrap().inputs.push(InputPin::new("Mask 0"));
        assert!(matches!(
            graph.validate_layout(),
            Err(GraphEditError::InvalidLayout { .. })
        ));

        graph.node_mut(blend).unwrap().inputs.pop();
        let ghost = NodeId::new_v4();
        graph.node_mut(blend).unwrap().inputs[0].link = Some(ghost);
        assert_eq!(graph.validate_layout(), Err(GraphEditError::UnknownNode(ghost)));
    }
}
