//! Error types for loading, instancing and evaluating graphs

use crate::index::NodeIndex;
use crate::value::GraphValueType;

/// Runtime-side failures.
///
/// Most of these indicate a corrupted compiled asset or a call-order bug; they are
/// reported instead of asserted so release builds can reject bad data at load time.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum GraphError {
    /// The evaluation context is missing its skeleton or task system
    #[error("evaluation context is not valid: skeleton and task system are both required")]
    InvalidContext,

    #[error("a layer is already active; layers do not nest")]
    LayerAlreadyActive,

    #[error("unsupported settings table version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("settings table declares {declared} nodes but stores {actual}")]
    NodeCountMismatch { declared: usize, actual: usize },

    /// A stored index does not address a node in this table
    #[error("node {node} references index {index}, but the table has {count} nodes")]
    IndexOutOfRange {
        node: usize,
        index: i16,
        count: usize,
    },

    /// Inputs must be compiled before the nodes that read them
    #[error("node {node} references node {index}, which is not compiled before it")]
    ForwardReference { node: NodeIndex, index: NodeIndex },

    #[error("node {node} expects a {expected:?} input at {index}, found {actual:?}")]
    ValueTypeMismatch {
        node: NodeIndex,
        index: NodeIndex,
        expected: GraphValueType,
        actual: GraphValueType,
    },

    #[error("root node {0} does not produce a pose")]
    InvalidRoot(NodeIndex),

    #[error("graph uses {count} child graphs, more than the limit of {limit}")]
    TooManyChildGraphs { count: usize, limit: usize },

    #[error("child graphs nest deeper than {limit} levels")]
    NestingTooDeep { limit: usize },

    #[error("resource {0} could not be resolved")]
    UnresolvedResource(String),

    #[error("data set has no skeleton")]
    MissingSkeleton,

    #[error("node {node} uses resource slot {slot}, but the data set has {count} resources")]
    ResourceOutOfRange {
        node: NodeIndex,
        slot: usize,
        count: usize,
    },

    #[error("resource slot {slot} used by node {node} is not a child graph")]
    NotAChildGraph { node: NodeIndex, slot: usize },

    #[error("graph was built for skeleton '{expected}', context uses '{actual}'")]
    SkeletonMismatch { expected: String, actual: String },

    #[error("task limit of {limit} exceeded")]
    TaskLimitExceeded { limit: usize },

    #[error("task dependency {dependency} is not registered (only {registered} tasks)")]
    InvalidTaskDependency { dependency: u16, registered: usize },

    #[error("tasks were already executed for this update")]
    TasksAlreadyExecuted,

    #[error("unknown control parameter '{0}'")]
    UnknownParameter(String),

    #[error("control parameter '{name}' is {actual:?}, not {expected:?}")]
    ParameterTypeMismatch {
        name: String,
        expected: GraphValueType,
        actual: GraphValueType,
    },

    /// Node settings and runtime node kind disagree during wiring
    #[error("node {node} cannot be wired from {kind} settings")]
    IncompatibleNodeKind { node: NodeIndex, kind: &'static str },

    #[error("node {0} was evaluated before being wired")]
    UnwiredNode(NodeIndex),

    #[error("node {0} was re-entered while it was being evaluated")]
    ReentrantEvaluation(NodeIndex),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}
