//! Graph instances: a node tree plus its nested child graph instances.

use std::fmt;
use std::sync::Arc;

use crate::config::GraphConfig;
use crate::context::{EvaluationContext, PhysicsWorldHandle};
use crate::data_set::{GraphDataSet, GraphVariation};
use crate::diagnostics::GraphLogEntry;
use crate::error::GraphError;
use crate::ids::StringId;
use crate::index::NodeIndex;
use crate::instantiation::NodeRef;
use crate::math::Transform;
use crate::nodes::{DefaultNodeFactory, NodeFactory, NodeValue, PoseNodeResult, RuntimeNode};
use crate::settings::{NodeSettings, SettingsTable};
use crate::task::Pose;
use crate::tree::NodeTree;
use crate::value::GraphValueType;

/// One running copy of a compiled graph.
pub struct GraphInstance {
    definition: Arc<SettingsTable>,
    data_set: Arc<GraphDataSet>,
    user_id: u64,
    root: NodeRef,
    tree: NodeTree,
    instantiation_log: Vec<GraphLogEntry>,
    instantiation_log_forwarded: bool,
}

impl GraphInstance {
    pub fn new(variation: &GraphVariation, user_id: u64) -> Result<Self, GraphError> {
        Self::with_factory(variation, user_id, &GraphConfig::default(), &DefaultNodeFactory)
    }

    pub fn with_factory(
        variation: &GraphVariation,
        user_id: u64,
        config: &GraphConfig,
        factory: &dyn NodeFactory,
    ) -> Result<Self, GraphError> {
        Self::instantiate(
            Arc::clone(&variation.definition),
            Arc::clone(&variation.data_set),
            user_id,
            config,
            factory,
            0,
        )
    }

    fn instantiate(
        definition: Arc<SettingsTable>,
        data_set: Arc<GraphDataSet>,
        user_id: u64,
        config: &GraphConfig,
        factory: &dyn NodeFactory,
        depth: usize,
    ) -> Result<Self, GraphError> {
        if depth > config.max_graph_depth {
            return Err(GraphError::NestingTooDeep {
                limit: config.max_graph_depth,
            });
        }
        definition.validate()?;

        let child_nodes = definition.child_graph_nodes();
        if child_nodes.len() > config.max_child_graphs {
            return Err(GraphError::TooManyChildGraphs {
                count: child_nodes.len(),
                limit: config.max_child_graphs,
            });
        }

        let mut children = Vec::with_capacity(child_nodes.len());
        for node in &child_nodes {
            let Some(NodeSettings::ChildGraph(settings)) = definition.get(*node) else {
                continue;
            };
            let slot = settings.child_graph_idx as usize;
            let variation = match data_set.resource(slot) {
                None => {
                    return Err(GraphError::ResourceOutOfRange {
                        node: *node,
                        slot,
                        count: data_set.resources.len(),
                    })
                }
                Some(_) => data_set
                    .child_graph(slot)
                    .ok_or(GraphError::NotAChildGraph { node: *node, slot })?,
            };
            if variation.data_set.skeleton.id != data_set.skeleton.id {
                return Err(GraphError::SkeletonMismatch {
                    expected: data_set.skeleton.id.to_string(),
                    actual: variation.data_set.skeleton.id.to_string(),
                });
            }
            children.push(Self::instantiate(
                Arc::clone(&variation.definition),
                Arc::clone(&variation.data_set),
                user_id,
                config,
                factory,
                depth + 1,
            )?);
        }

        let mut instantiation_log = Vec::new();
        let tree = NodeTree::build(
            &definition,
            &data_set,
            user_id,
            factory,
            children,
            u16::try_from(depth).unwrap_or(u16::MAX),
            &mut instantiation_log,
        )?;
        let root = NodeRef::new(definition.root);
        log::debug!(
            "instantiated graph '{}' for user {user_id}: {} nodes, {} child graphs",
            data_set.variation_id,
            tree.len(),
            child_nodes.len()
        );

        Ok(GraphInstance {
            definition,
            data_set,
            user_id,
            root,
            tree,
            instantiation_log,
            instantiation_log_forwarded: false,
        })
    }

    pub fn definition(&self) -> &Arc<SettingsTable> {
        &self.definition
    }

    pub fn data_set(&self) -> &Arc<GraphDataSet> {
        &self.data_set
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn num_nodes(&self) -> usize {
        self.tree.len()
    }

    pub fn root_index(&self) -> NodeIndex {
        self.root.index()
    }

    pub fn child_graphs(&self) -> &[GraphInstance] {
        self.tree.children()
    }

    pub fn node(&self, index: NodeIndex) -> Option<&RuntimeNode> {
        self.tree.node(index)
    }

    /// Warnings raised while the tree was built. The first evaluation against a context
    /// with diagnostics enabled also forwards these, and those of every child graph, to
    /// its sink.
    pub fn instantiation_log(&self) -> &[GraphLogEntry] {
        &self.instantiation_log
    }

    fn forward_instantiation_log(&self, ctx: &mut EvaluationContext) {
        ctx.forward_entries(&self.instantiation_log);
        for child in self.tree.children() {
            child.forward_instantiation_log(ctx);
        }
    }

    // Control parameters

    pub fn parameter_index(&self, id: &str) -> Option<NodeIndex> {
        self.definition.parameter_lookup.get(id).copied()
    }

    fn parameter_mut(&mut self, id: &str) -> Result<&mut RuntimeNode, GraphError> {
        let index = self
            .parameter_index(id)
            .ok_or_else(|| GraphError::UnknownParameter(id.to_string()))?;
        self.tree
            .node_mut(index)
            .ok_or(GraphError::ReentrantEvaluation(index))
    }

    fn parameter_mismatch(id: &str, expected: GraphValueType, node: &RuntimeNode) -> GraphError {
        GraphError::ParameterTypeMismatch {
            name: id.to_string(),
            expected,
            actual: node.value_type(),
        }
    }

    pub fn set_parameter_float(&mut self, id: &str, value: f32) -> Result<(), GraphError> {
        match self.parameter_mut(id)? {
            RuntimeNode::ControlParameterFloat(parameter) => {
                parameter.set(value);
                Ok(())
            }
            node => Err(Self::parameter_mismatch(id, GraphValueType::Float, node)),
        }
    }

    pub fn set_parameter_bool(&mut self, id: &str, value: bool) -> Result<(), GraphError> {
        match self.parameter_mut(id)? {
            RuntimeNode::ControlParameterBool(parameter) => {
                parameter.set(value);
                Ok(())
            }
            node => Err(Self::parameter_mismatch(id, GraphValueType::Bool, node)),
        }
    }

    pub fn set_parameter_id(&mut self, id: &str, value: impl Into<StringId>) -> Result<(), GraphError> {
        match self.parameter_mut(id)? {
            RuntimeNode::ControlParameterId(parameter) => {
                parameter.set(value.into());
                Ok(())
            }
            node => Err(Self::parameter_mismatch(id, GraphValueType::ID, node)),
        }
    }

    /// Drop cached outputs and selector state, here and in every child graph.
    pub fn reset(&mut self) {
        self.tree.reset();
    }

    fn check_context(&self, ctx: &EvaluationContext) -> Result<(), GraphError> {
        if !ctx.is_valid() {
            log::error!("graph instance for user {} driven by an invalid context", self.user_id);
            return Err(GraphError::InvalidContext);
        }
        let skeleton = ctx.require_skeleton()?;
        if !Arc::ptr_eq(skeleton, &self.data_set.skeleton) && skeleton.id != self.data_set.skeleton.id
        {
            return Err(GraphError::SkeletonMismatch {
                expected: self.data_set.skeleton.id.to_string(),
                actual: skeleton.id.to_string(),
            });
        }
        Ok(())
    }

    /// Walk the tree for the context's current update, registering pose tasks.
    pub fn evaluate(&mut self, ctx: &mut EvaluationContext) -> Result<PoseNodeResult, GraphError> {
        self.check_context(ctx)?;
        if !self.instantiation_log_forwarded && ctx.diagnostics_enabled() {
            self.forward_instantiation_log(ctx);
            self.instantiation_log_forwarded = true;
        }
        self.evaluate_nested(ctx)
    }

    /// Evaluation of a child graph; the parent has already checked the context.
    pub(crate) fn evaluate_nested(
        &mut self,
        ctx: &mut EvaluationContext,
    ) -> Result<PoseNodeResult, GraphError> {
        self.tree.update_pose(self.root, ctx)
    }

    /// Sample a value node's current output (tooling / previews).
    pub fn sample_value(
        &mut self,
        index: NodeIndex,
        ctx: &mut EvaluationContext,
    ) -> Result<NodeValue, GraphError> {
        self.check_context(ctx)?;
        let value_type = self
            .tree
            .node(index)
            .map(RuntimeNode::value_type)
            .ok_or(GraphError::IndexOutOfRange {
                node: index.get(),
                index: index.raw(),
                count: self.tree.len(),
            })?;
        let node = NodeRef::new(index);
        match value_type {
            GraphValueType::Float => self.tree.float_value(node, ctx).map(NodeValue::Float),
            GraphValueType::Bool => self.tree.bool_value(node, ctx).map(NodeValue::Bool),
            GraphValueType::ID => self.tree.id_value(node, ctx).map(NodeValue::Id),
            GraphValueType::BoneMask => self.tree.bone_mask(node, ctx).map(NodeValue::BoneMask),
            other => Err(GraphError::ValueTypeMismatch {
                node: index,
                index,
                expected: GraphValueType::Float,
                actual: other,
            }),
        }
    }

    /// One full frame: start the update, walk the tree, execute tasks.
    pub fn run_frame(
        &mut self,
        ctx: &mut EvaluationContext,
        delta_time: f32,
        world_transform: Transform,
        physics_world: Option<PhysicsWorldHandle>,
    ) -> Result<Pose, GraphError> {
        self.check_context(ctx)?;
        ctx.update(delta_time, world_transform, physics_world)?;
        let result = self.evaluate(ctx)?;
        let pose = ctx.execute_tasks(result.task_index)?;
        Ok(pose.clone())
    }
}

impl fmt::Debug for GraphInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphInstance")
            .field("variation", &self.data_set.variation_id)
            .field("user_id", &self.user_id)
            .field("nodes", &self.tree.len())
            .field("child_graphs", &self.tree.children().len())
            .finish()
    }
}
