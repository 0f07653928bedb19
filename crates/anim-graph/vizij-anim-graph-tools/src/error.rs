//! Compile and edit errors for authoring graphs

use vizij_anim_graph::{GraphError, GraphValueType};

use crate::compilation::CompileLogEntry;
use crate::graph::NodeId;

/// A compile failure, attached to the authoring node that caused it where there is one.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum CompileError {
    #[error("node '{node_name}' ({node}): required pin '{pin}' is not connected")]
    DisconnectedRequiredPin {
        node: NodeId,
        node_name: String,
        pin: String,
    },

    #[error("node '{node_name}' ({node}): invalid identifier '{value}': {reason}")]
    InvalidIdentifier {
        node: NodeId,
        node_name: String,
        value: String,
        reason: String,
    },

    #[error("node '{node_name}' ({node}): {options} options but only {keys} selection keys")]
    MissingSelectionKeys {
        node: NodeId,
        node_name: String,
        options: usize,
        keys: usize,
    },

    #[error("node '{node_name}' ({node}): selection key {position} is invalid: {reason}")]
    InvalidSelectionKey {
        node: NodeId,
        node_name: String,
        position: usize,
        reason: String,
    },

    #[error("node '{node_name}' ({node}) depends on itself")]
    CycleDetected { node: NodeId, node_name: String },

    #[error("node '{node_name}' ({node}): pin '{pin}' expects {expected:?}, connected node outputs {actual:?}")]
    PinTypeMismatch {
        node: NodeId,
        node_name: String,
        pin: String,
        expected: GraphValueType,
        actual: Option<GraphValueType>,
    },

    #[error("node '{node_name}' ({node}): {reason}")]
    InvalidPinLayout {
        node: NodeId,
        node_name: String,
        reason: String,
    },

    #[error("node '{node_name}' ({node}): {reason}")]
    InvalidResource {
        node: NodeId,
        node_name: String,
        reason: String,
    },

    #[error("node '{node_name}' ({node}): control parameter '{id}' is declared more than once")]
    DuplicateParameter {
        node: NodeId,
        node_name: String,
        id: String,
    },

    #[error("result node {0} cannot be used as an input")]
    ResultNodeAsInput(NodeId),

    #[error("graph has no result node")]
    NoResultNode,

    #[error("graph has {0} result nodes; exactly one is allowed")]
    MultipleResultNodes(usize),

    #[error("graph has {count} nodes, more than the limit of {limit}")]
    TooManyNodes { count: usize, limit: usize },

    #[error("link to unknown node {0}")]
    UnknownNode(NodeId),

    #[error("compiled table is invalid: {0}")]
    InvalidTable(#[from] GraphError),
}

impl CompileError {
    /// Authoring node the error is attached to.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            CompileError::DisconnectedRequiredPin { node, .. }
            | CompileError::InvalidIdentifier { node, .. }
            | CompileError::MissingSelectionKeys { node, .. }
            | CompileError::InvalidSelectionKey { node, .. }
            | CompileError::CycleDetected { node, .. }
            | CompileError::PinTypeMismatch { node, .. }
            | CompileError::InvalidPinLayout { node, .. }
            | CompileError::InvalidResource { node, .. }
            | CompileError::DuplicateParameter { node, .. } => Some(*node),
            CompileError::ResultNodeAsInput(node) | CompileError::UnknownNode(node) => Some(*node),
            CompileError::NoResultNode
            | CompileError::MultipleResultNodes(_)
            | CompileError::TooManyNodes { .. }
            | CompileError::InvalidTable(_) => None,
        }
    }
}

/// Compile error plus everything logged before it.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[error("{error}")]
pub struct CompilationFailure {
    pub error: CompileError,
    pub log: Vec<CompileLogEntry>,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum GraphEditError {
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    #[error("node {node} has no input pin '{pin}'")]
    UnknownPin { node: NodeId, pin: String },

    #[error("node {0} has no output")]
    NoOutput(NodeId),

    #[error("cannot connect {actual:?} output to {expected:?} pin '{pin}'")]
    TypeMismatch {
        pin: String,
        expected: GraphValueType,
        actual: GraphValueType,
    },

    #[error("connecting {from} to {to} would create a cycle")]
    WouldCreateCycle { from: NodeId, to: NodeId },

    #[error("node {0} does not support dynamic pins")]
    NoDynamicPins(NodeId),

    #[error("node {node} has no dynamic pin {position}")]
    UnknownDynamicPin { node: NodeId, position: usize },

    #[error("node {0} appears more than once")]
    DuplicateNode(NodeId),

    #[error("node {node}: {reason}")]
    InvalidLayout { node: NodeId, reason: String },

    #[error("failed to parse graph: {0}")]
    Parse(String),
}

impl From<serde_json::Error> for GraphEditError {
    fn from(err: serde_json::Error) -> Self {
        GraphEditError::Parse(err.to_string())
    }
}
