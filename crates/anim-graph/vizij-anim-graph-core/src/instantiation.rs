//! Resolution of settings indices into live node references while a tree is built.

use std::sync::Arc;

use crate::data_set::GraphDataSet;
use crate::diagnostics::{GraphLogEntry, Severity};
use crate::index::NodeIndex;
use crate::nodes::RuntimeNode;
use crate::skeleton::Skeleton;

/// Reference to a node of the tree being built, checked against the tree size when it
/// was resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef(NodeIndex);

impl NodeRef {
    pub(crate) fn new(index: NodeIndex) -> Self {
        NodeRef(index)
    }

    pub fn index(self) -> NodeIndex {
        self.0
    }
}

/// How the tree builder obtained a node before wiring it.
#[derive(Debug)]
pub enum InstantiationOptions {
    /// Build the node kind declared by the settings.
    CreateNode,
    /// A factory already built a (possibly more specialized) node; only wire it.
    NodeAlreadyCreated(RuntimeNode),
}

/// Short-lived helper handed to each node while it is wired.
pub struct InstantiationContext<'a> {
    current_node: NodeIndex,
    node_count: usize,
    child_graph_nodes: &'a [NodeIndex],
    data_set: &'a Arc<GraphDataSet>,
    user_id: u64,
    graph_depth: u16,
    log: &'a mut Vec<GraphLogEntry>,
}

impl<'a> InstantiationContext<'a> {
    pub(crate) fn new(
        node_count: usize,
        child_graph_nodes: &'a [NodeIndex],
        data_set: &'a Arc<GraphDataSet>,
        user_id: u64,
        graph_depth: u16,
        log: &'a mut Vec<GraphLogEntry>,
    ) -> Self {
        InstantiationContext {
            current_node: NodeIndex::ZERO,
            node_count,
            child_graph_nodes,
            data_set,
            user_id,
            graph_depth,
            log,
        }
    }

    pub(crate) fn set_current_node(&mut self, node: NodeIndex) {
        self.current_node = node;
    }

    /// Node currently being wired.
    pub fn current_node(&self) -> NodeIndex {
        self.current_node
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn data_set(&self) -> &Arc<GraphDataSet> {
        self.data_set
    }

    pub fn skeleton(&self) -> &Arc<Skeleton> {
        &self.data_set.skeleton
    }

    /// Resolve a mandatory child reference.
    pub fn resolve_required(&self, index: NodeIndex) -> NodeRef {
        debug_assert!(
            index.get() < self.node_count,
            "node {} references index {index} outside a tree of {} nodes",
            self.current_node,
            self.node_count
        );
        NodeRef(index)
    }

    /// Resolve an optional child reference; `None` stays `None`.
    pub fn resolve_optional(&self, index: Option<NodeIndex>) -> Option<NodeRef> {
        index.map(|index| self.resolve_required(index))
    }

    pub fn resolve_all(&self, indices: &[NodeIndex]) -> Vec<NodeRef> {
        indices.iter().map(|index| self.resolve_required(*index)).collect()
    }

    /// Slot of the current node's child graph instance, if it is a child-graph node.
    pub fn child_graph_for_current_node(&self) -> Option<usize> {
        self.child_graph_nodes
            .iter()
            .position(|node| *node == self.current_node)
    }

    /// Record a warning against the current node. Entries land in the instance's
    /// instantiation log and reach a diagnostics sink on the first evaluation that has one.
    pub fn log_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("instantiating node {}: {message}", self.current_node);
        self.log.push(GraphLogEntry {
            update_id: 0,
            graph_depth: self.graph_depth,
            severity: Severity::Warning,
            node_index: Some(self.current_node),
            message,
        });
    }
}
