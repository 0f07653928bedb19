//! Runtime node storage for one graph instance.
//!
//! Nodes are evaluated by taking them out of their slot for the duration of the call,
//! which leaves the rest of the tree (and the child graph instances) free to borrow
//! mutably. Inputs always sit at lower indices, so a vacant slot during evaluation means
//! the tree is being re-entered.

use std::sync::Arc;

use crate::bone_mask::BoneMask;
use crate::context::EvaluationContext;
use crate::data_set::GraphDataSet;
use crate::diagnostics::GraphLogEntry;
use crate::error::GraphError;
use crate::ids::StringId;
use crate::index::NodeIndex;
use crate::instance::GraphInstance;
use crate::instantiation::{InstantiationContext, InstantiationOptions, NodeRef};
use crate::nodes::{NodeFactory, PoseNodeResult, RuntimeNode};
use crate::settings::SettingsTable;

#[derive(Debug)]
struct NodeSlot {
    node: Option<RuntimeNode>,
    last_update: Option<u32>,
}

pub(crate) struct NodeTree {
    slots: Vec<NodeSlot>,
    children: Vec<GraphInstance>,
}

impl NodeTree {
    pub(crate) fn build(
        definition: &SettingsTable,
        data_set: &Arc<GraphDataSet>,
        user_id: u64,
        factory: &dyn NodeFactory,
        children: Vec<GraphInstance>,
        graph_depth: u16,
        log: &mut Vec<GraphLogEntry>,
    ) -> Result<Self, GraphError> {
        let child_graph_nodes = definition.child_graph_nodes();
        let mut ctx = InstantiationContext::new(
            definition.len(),
            &child_graph_nodes,
            data_set,
            user_id,
            graph_depth,
            log,
        );

        let mut slots = Vec::with_capacity(definition.len());
        for (position, settings) in definition.nodes.iter().enumerate() {
            let index = NodeIndex::from_usize(position).ok_or(GraphError::NodeCountMismatch {
                declared: NodeIndex::MAX_NODES,
                actual: definition.len(),
            })?;
            ctx.set_current_node(index);
            let options = match factory.create(settings) {
                Some(node) => InstantiationOptions::NodeAlreadyCreated(node),
                None => InstantiationOptions::CreateNode,
            };
            let node = RuntimeNode::instantiate(settings, options, &mut ctx)?;
            slots.push(NodeSlot {
                node: Some(node),
                last_update: None,
            });
        }
        Ok(NodeTree { slots, children })
    }

    pub(crate) fn len(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn node(&self, index: NodeIndex) -> Option<&RuntimeNode> {
        self.slots.get(index.get()).and_then(|slot| slot.node.as_ref())
    }

    pub(crate) fn node_mut(&mut self, index: NodeIndex) -> Option<&mut RuntimeNode> {
        self.slots
            .get_mut(index.get())
            .and_then(|slot| slot.node.as_mut())
    }

    pub(crate) fn children(&self) -> &[GraphInstance] {
        &self.children
    }

    pub(crate) fn child_mut(&mut self, slot: usize) -> Option<&mut GraphInstance> {
        self.children.get_mut(slot)
    }

    pub(crate) fn reset(&mut self) {
        for slot in &mut self.slots {
            slot.last_update = None;
            if let Some(node) = slot.node.as_mut() {
                node.reset();
            }
        }
        for child in &mut self.children {
            child.reset();
        }
    }

    fn with_node<R>(
        &mut self,
        node: NodeRef,
        ctx: &mut EvaluationContext,
        f: impl FnOnce(&mut RuntimeNode, &mut NodeTree, &mut EvaluationContext) -> Result<R, GraphError>,
    ) -> Result<R, GraphError> {
        let index = node.index();
        let count = self.slots.len();
        let slot = self
            .slots
            .get_mut(index.get())
            .ok_or(GraphError::IndexOutOfRange {
                node: index.get(),
                index: index.raw(),
                count,
            })?;
        let Some(mut runtime) = slot.node.take() else {
            return Err(GraphError::ReentrantEvaluation(index));
        };
        if slot.last_update != Some(ctx.update_id()) {
            slot.last_update = Some(ctx.update_id());
            ctx.track_active_node(index);
        }

        let result = f(&mut runtime, self, ctx);
        self.slots[index.get()].node = Some(runtime);
        result
    }

    pub(crate) fn float_value(
        &mut self,
        node: NodeRef,
        ctx: &mut EvaluationContext,
    ) -> Result<f32, GraphError> {
        self.with_node(node, ctx, |runtime, _, _| runtime.evaluate_float(node.index()))
    }

    pub(crate) fn bool_value(
        &mut self,
        node: NodeRef,
        ctx: &mut EvaluationContext,
    ) -> Result<bool, GraphError> {
        self.with_node(node, ctx, |runtime, _, _| runtime.evaluate_bool(node.index()))
    }

    pub(crate) fn id_value(
        &mut self,
        node: NodeRef,
        ctx: &mut EvaluationContext,
    ) -> Result<StringId, GraphError> {
        self.with_node(node, ctx, |runtime, _, _| runtime.evaluate_id(node.index()))
    }

    pub(crate) fn bone_mask(
        &mut self,
        node: NodeRef,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<Arc<BoneMask>>, GraphError> {
        self.with_node(node, ctx, |runtime, tree, ctx| {
            runtime.evaluate_bone_mask(node.index(), tree, ctx)
        })
    }

    pub(crate) fn update_pose(
        &mut self,
        node: NodeRef,
        ctx: &mut EvaluationContext,
    ) -> Result<PoseNodeResult, GraphError> {
        self.with_node(node, ctx, |runtime, tree, ctx| {
            runtime.update_pose(node.index(), tree, ctx)
        })
    }
}
