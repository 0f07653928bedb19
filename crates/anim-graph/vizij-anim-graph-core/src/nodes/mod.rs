//! Runtime node family.
//!
//! [`RuntimeNode`] is a closed set of node kinds. Building a tree is two-phase: a
//! [`NodeFactory`] may pre-build a node whose concrete kind differs from the declared
//! settings kind (see [`DefaultNodeFactory`]), after which [`RuntimeNode::wire`]
//! resolves the node's child references. Wiring is the same operation whichever way the
//! node was created.

mod bone_masks;
mod poses;
mod values;

use std::sync::Arc;

pub use bone_masks::{
    BoneMaskBlendNode, BoneMaskSelectorNode, FixedBoneMaskSelectorNode, FixedWeightBoneMaskNode,
    NamedBoneMaskNode,
};
pub use poses::{ChildGraphNode, GraphEventsNode, PoseBlendNode, ReferencePoseNode};
pub use values::ControlParameter;

use crate::bone_mask::BoneMask;
use crate::context::EvaluationContext;
use crate::error::GraphError;
use crate::events::SampledEventRange;
use crate::ids::StringId;
use crate::index::NodeIndex;
use crate::instantiation::{InstantiationContext, InstantiationOptions, NodeRef};
use crate::math::Transform;
use crate::settings::{NodeKind, NodeSettings};
use crate::task::TaskIndex;
use crate::tree::NodeTree;
use crate::value::GraphValueType;

/// Output of a pose node for one update.
#[derive(Clone, Debug, PartialEq)]
pub struct PoseNodeResult {
    /// Task producing this node's pose; `None` when the node produced no pose.
    pub task_index: Option<TaskIndex>,
    pub root_motion_delta: Transform,
    pub sampled_event_range: SampledEventRange,
}

impl PoseNodeResult {
    pub fn empty(range: SampledEventRange) -> Self {
        PoseNodeResult {
            task_index: None,
            root_motion_delta: Transform::IDENTITY,
            sampled_event_range: range,
        }
    }
}

/// Output of a value node, as sampled by tooling.
#[derive(Clone, Debug, PartialEq)]
pub enum NodeValue {
    Float(f32),
    Bool(bool),
    Id(StringId),
    BoneMask(Option<Arc<BoneMask>>),
}

/// Value remembered for the update it was computed in.
#[derive(Clone, Debug)]
pub(crate) struct UpdateCache<T> {
    entry: Option<(u32, T)>,
}

impl<T> Default for UpdateCache<T> {
    fn default() -> Self {
        UpdateCache { entry: None }
    }
}

impl<T: Clone> UpdateCache<T> {
    pub(crate) fn get(&self, update_id: u32) -> Option<T> {
        match &self.entry {
            Some((id, value)) if *id == update_id => Some(value.clone()),
            _ => None,
        }
    }

    pub(crate) fn store(&mut self, update_id: u32, value: T) -> T {
        self.entry = Some((update_id, value.clone()));
        value
    }

    pub(crate) fn clear(&mut self) {
        self.entry = None;
    }
}

/// A link resolved at wiring time, or an error naming the unwired node.
pub(crate) fn wired(link: Option<NodeRef>, this: NodeIndex) -> Result<NodeRef, GraphError> {
    link.ok_or(GraphError::UnwiredNode(this))
}

#[derive(Debug)]
pub enum RuntimeNode {
    ControlParameterFloat(ControlParameter<f32>),
    ControlParameterBool(ControlParameter<bool>),
    ControlParameterId(ControlParameter<StringId>),
    ConstFloat(f32),
    ConstBool(bool),
    ConstId(StringId),
    BoneMask(NamedBoneMaskNode),
    FixedWeightBoneMask(FixedWeightBoneMaskNode),
    BoneMaskBlend(BoneMaskBlendNode),
    BoneMaskSelector(BoneMaskSelectorNode),
    /// Selector declared with `switch_dynamically == false`.
    FixedBoneMaskSelector(FixedBoneMaskSelectorNode),
    ReferencePose(ReferencePoseNode),
    PoseBlend(PoseBlendNode),
    GraphEvents(GraphEventsNode),
    ChildGraph(ChildGraphNode),
}

impl RuntimeNode {
    /// Unwired node of the kind declared by `settings`.
    pub fn create(settings: &NodeSettings) -> RuntimeNode {
        match settings {
            NodeSettings::ControlParameterFloat { default, .. } => {
                RuntimeNode::ControlParameterFloat(ControlParameter::new(*default))
            }
            NodeSettings::ControlParameterBool { default, .. } => {
                RuntimeNode::ControlParameterBool(ControlParameter::new(*default))
            }
            NodeSettings::ControlParameterId { default, .. } => {
                RuntimeNode::ControlParameterId(ControlParameter::new(default.clone()))
            }
            NodeSettings::ConstFloat { value } => RuntimeNode::ConstFloat(*value),
            NodeSettings::ConstBool { value } => RuntimeNode::ConstBool(*value),
            NodeSettings::ConstId { value } => RuntimeNode::ConstId(value.clone()),
            NodeSettings::BoneMask(_) => RuntimeNode::BoneMask(NamedBoneMaskNode::default()),
            NodeSettings::FixedWeightBoneMask(_) => {
                RuntimeNode::FixedWeightBoneMask(FixedWeightBoneMaskNode::default())
            }
            NodeSettings::BoneMaskBlend(_) => RuntimeNode::BoneMaskBlend(BoneMaskBlendNode::default()),
            NodeSettings::BoneMaskSelector(_) => {
                RuntimeNode::BoneMaskSelector(BoneMaskSelectorNode::default())
            }
            NodeSettings::ReferencePose => RuntimeNode::ReferencePose(ReferencePoseNode::default()),
            NodeSettings::PoseBlend(_) => RuntimeNode::PoseBlend(PoseBlendNode::default()),
            NodeSettings::GraphEvents(_) => RuntimeNode::GraphEvents(GraphEventsNode::default()),
            NodeSettings::ChildGraph(_) => RuntimeNode::ChildGraph(ChildGraphNode::default()),
        }
    }

    /// Create (or take the pre-built node) and wire it.
    pub fn instantiate(
        settings: &NodeSettings,
        options: InstantiationOptions,
        ctx: &mut InstantiationContext<'_>,
    ) -> Result<RuntimeNode, GraphError> {
        let mut node = match options {
            InstantiationOptions::CreateNode => RuntimeNode::create(settings),
            InstantiationOptions::NodeAlreadyCreated(node) => node,
        };
        node.wire(settings, ctx)?;
        Ok(node)
    }

    /// Resolve child references and settings-derived state.
    pub fn wire(
        &mut self,
        settings: &NodeSettings,
        ctx: &mut InstantiationContext<'_>,
    ) -> Result<(), GraphError> {
        match (self, settings) {
            (RuntimeNode::ControlParameterFloat(_), NodeSettings::ControlParameterFloat { .. })
            | (RuntimeNode::ControlParameterBool(_), NodeSettings::ControlParameterBool { .. })
            | (RuntimeNode::ControlParameterId(_), NodeSettings::ControlParameterId { .. })
            | (RuntimeNode::ConstFloat(_), NodeSettings::ConstFloat { .. })
            | (RuntimeNode::ConstBool(_), NodeSettings::ConstBool { .. })
            | (RuntimeNode::ConstId(_), NodeSettings::ConstId { .. })
            | (RuntimeNode::ReferencePose(_), NodeSettings::ReferencePose) => Ok(()),
            (RuntimeNode::BoneMask(node), NodeSettings::BoneMask(s)) => {
                node.wire(s, ctx);
                Ok(())
            }
            (RuntimeNode::FixedWeightBoneMask(node), NodeSettings::FixedWeightBoneMask(s)) => {
                node.wire(s, ctx);
                Ok(())
            }
            (RuntimeNode::BoneMaskBlend(node), NodeSettings::BoneMaskBlend(s)) => {
                node.wire(s, ctx);
                Ok(())
            }
            (RuntimeNode::BoneMaskSelector(node), NodeSettings::BoneMaskSelector(s)) => {
                node.wire(s, ctx);
                Ok(())
            }
            (RuntimeNode::FixedBoneMaskSelector(node), NodeSettings::BoneMaskSelector(s)) => {
                node.wire(s, ctx);
                Ok(())
            }
            (RuntimeNode::PoseBlend(node), NodeSettings::PoseBlend(s)) => {
                node.wire(s, ctx);
                Ok(())
            }
            (RuntimeNode::GraphEvents(node), NodeSettings::GraphEvents(s)) => {
                node.wire(s, ctx);
                Ok(())
            }
            (RuntimeNode::ChildGraph(node), NodeSettings::ChildGraph(s)) => node.wire(s, ctx),
            (_, settings) => Err(GraphError::IncompatibleNodeKind {
                node: ctx.current_node(),
                kind: settings.kind().name(),
            }),
        }
    }

    /// Declared kind. Specialized nodes report the kind they were declared as.
    pub fn kind(&self) -> NodeKind {
        match self {
            RuntimeNode::ControlParameterFloat(_) => NodeKind::ControlParameterFloat,
            RuntimeNode::ControlParameterBool(_) => NodeKind::ControlParameterBool,
            RuntimeNode::ControlParameterId(_) => NodeKind::ControlParameterId,
            RuntimeNode::ConstFloat(_) => NodeKind::ConstFloat,
            RuntimeNode::ConstBool(_) => NodeKind::ConstBool,
            RuntimeNode::ConstId(_) => NodeKind::ConstId,
            RuntimeNode::BoneMask(_) => NodeKind::BoneMask,
            RuntimeNode::FixedWeightBoneMask(_) => NodeKind::FixedWeightBoneMask,
            RuntimeNode::BoneMaskBlend(_) => NodeKind::BoneMaskBlend,
            RuntimeNode::BoneMaskSelector(_) | RuntimeNode::FixedBoneMaskSelector(_) => {
                NodeKind::BoneMaskSelector
            }
            RuntimeNode::ReferencePose(_) => NodeKind::ReferencePose,
            RuntimeNode::PoseBlend(_) => NodeKind::PoseBlend,
            RuntimeNode::GraphEvents(_) => NodeKind::GraphEvents,
            RuntimeNode::ChildGraph(_) => NodeKind::ChildGraph,
        }
    }

    pub fn value_type(&self) -> GraphValueType {
        self.kind().value_type()
    }

    /// Forget per-update caches and selection state.
    pub fn reset(&mut self) {
        match self {
            RuntimeNode::BoneMaskBlend(node) => node.reset(),
            RuntimeNode::BoneMaskSelector(node) => node.reset(),
            RuntimeNode::FixedBoneMaskSelector(node) => node.reset(),
            RuntimeNode::ReferencePose(node) => node.reset(),
            RuntimeNode::PoseBlend(node) => node.reset(),
            RuntimeNode::GraphEvents(node) => node.reset(),
            RuntimeNode::ChildGraph(node) => node.reset(),
            _ => {}
        }
    }

    fn type_mismatch(&self, this: NodeIndex, expected: GraphValueType) -> GraphError {
        GraphError::ValueTypeMismatch {
            node: this,
            index: this,
            expected,
            actual: self.value_type(),
        }
    }

    pub(crate) fn evaluate_float(&self, this: NodeIndex) -> Result<f32, GraphError> {
        match self {
            RuntimeNode::ControlParameterFloat(p) => Ok(p.value),
            RuntimeNode::ConstFloat(value) => Ok(*value),
            _ => Err(self.type_mismatch(this, GraphValueType::Float)),
        }
    }

    pub(crate) fn evaluate_bool(&self, this: NodeIndex) -> Result<bool, GraphError> {
        match self {
            RuntimeNode::ControlParameterBool(p) => Ok(p.value),
            RuntimeNode::ConstBool(value) => Ok(*value),
            _ => Err(self.type_mismatch(this, GraphValueType::Bool)),
        }
    }

    pub(crate) fn evaluate_id(&self, this: NodeIndex) -> Result<StringId, GraphError> {
        match self {
            RuntimeNode::ControlParameterId(p) => Ok(p.value.clone()),
            RuntimeNode::ConstId(value) => Ok(value.clone()),
            _ => Err(self.type_mismatch(this, GraphValueType::ID)),
        }
    }

    /// `Ok(None)` means "no mask": the consumer applies its weight to every bone.
    pub(crate) fn evaluate_bone_mask(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<Arc<BoneMask>>, GraphError> {
        match self {
            RuntimeNode::BoneMask(node) => Ok(node.mask()),
            RuntimeNode::FixedWeightBoneMask(node) => Ok(node.mask()),
            RuntimeNode::BoneMaskBlend(node) => node.evaluate(this, tree, ctx),
            RuntimeNode::BoneMaskSelector(node) => node.evaluate(this, tree, ctx),
            RuntimeNode::FixedBoneMaskSelector(node) => node.evaluate(this, tree, ctx),
            _ => Err(self.type_mismatch(this, GraphValueType::BoneMask)),
        }
    }

    pub(crate) fn update_pose(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<PoseNodeResult, GraphError> {
        match self {
            RuntimeNode::ReferencePose(node) => node.update(this, ctx),
            RuntimeNode::PoseBlend(node) => node.update(this, tree, ctx),
            RuntimeNode::GraphEvents(node) => node.update(this, tree, ctx),
            RuntimeNode::ChildGraph(node) => node.update(this, tree, ctx),
            _ => Err(self.type_mismatch(this, GraphValueType::Pose)),
        }
    }
}

/// Pre-builds nodes whose concrete kind differs from the declared settings kind.
pub trait NodeFactory {
    /// `None` lets the tree builder create the declared kind.
    fn create(&self, settings: &NodeSettings) -> Option<RuntimeNode>;
}

/// Builds [`FixedBoneMaskSelectorNode`] for selectors that never switch at runtime.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultNodeFactory;

impl NodeFactory for DefaultNodeFactory {
    fn create(&self, settings: &NodeSettings) -> Option<RuntimeNode> {
        match settings {
            NodeSettings::BoneMaskSelector(s) if !s.switch_dynamically => Some(
                RuntimeNode::FixedBoneMaskSelector(FixedBoneMaskSelectorNode::default()),
            ),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::BoneMaskSelectorSettings;

    fn selector(switch_dynamically: bool) -> NodeSettings {
        let idx = |raw| NodeIndex::new(raw).unwrap();
        NodeSettings::BoneMaskSelector(BoneMaskSelectorSettings {
            parameter_value_node: idx(0),
            default_mask_node: idx(1),
            mask_nodes: vec![],
            parameter_values: vec![],
            switch_dynamically,
            blend_time: 0.2,
        })
    }

    #[test]
    fn factory_specializes_fixed_selectors_only() {
        let factory = DefaultNodeFactory;
        assert!(matches!(
            factory.create(&selector(false)),
            Some(RuntimeNode::FixedBoneMaskSelector(_))
        ));
        assert!(factory.create(&selector(true)).is_none());
        assert!(factory.create(&NodeSettings::ReferencePose).is_none());
    }

    #[test]
    fn specialized_node_keeps_declared_kind() {
        let node = DefaultNodeFactory.create(&selector(false)).unwrap();
        assert_eq!(node.kind(), NodeKind::BoneMaskSelector);
        assert_eq!(node.value_type(), GraphValueType::BoneMask);
    }

    #[test]
    fn update_cache_is_keyed_by_update() {
        let mut cache = UpdateCache::default();
        assert_eq!(cache.get(1), None);
        cache.store(1, 5.0f32);
        assert_eq!(cache.get(1), Some(5.0));
        assert_eq!(cache.get(2), None);
        cache.clear();
        assert_eq!(cache.get(1), None);
    }
}
