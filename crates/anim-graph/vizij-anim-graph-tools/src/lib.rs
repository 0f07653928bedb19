//! Authoring side of the Vizij animation graph.
//!
//! A [`ToolsGraph`] is the editable node + pin graph. [`compile_graph`] flattens it into
//! the runtime [`SettingsTable`](vizij_anim_graph::SettingsTable) through a
//! [`GraphCompilationContext`], compiling every reachable node exactly once.

pub mod compilation;
pub mod error;
pub mod graph;
pub mod nodes;
pub mod schema;

pub use compilation::{
    compile_graph, CompileLogEntry, CompileOptions, CompiledGraph, GraphCompilationContext,
    NodeCompilationState, PendingSettings,
};
pub use error::{CompilationFailure, CompileError, GraphEditError};
pub use graph::{InputPin, NodeId, ToolsGraph, ToolsNode};
pub use nodes::ToolsNodeKind;
pub use schema::{registry, signature, DynamicPinSpec, NodeSignature, PinSpec, Registry};
