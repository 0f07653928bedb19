//! Graph compilation: [`ToolsGraph`] -> [`SettingsTable`].
//!
//! Compilation is recursive and memoized per authoring node. A node asks the context for
//! its settings slot with [`GraphCompilationContext::get_or_create_settings`]; only when
//! that returns [`NodeCompilationState::NeedCompilation`] does it compile its inputs and
//! fill in its settings. Runtime indices are handed out when a node's settings are
//! registered, after all of its inputs, so
//!
//! * every stored index points at a lower index,
//! * a node that fails to compile never occupies a slot,
//! * a node shared by several parents is compiled once and all of them see the same index.
//!
//! Any error aborts the whole compilation; no partial table is ever returned.

use std::marker::PhantomData;
use std::sync::Arc;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use vizij_anim_graph::{
    AssetResolver, DataSetDescriptor, GraphDataSet, GraphError, GraphVariation, NodeIndex,
    NodeSettings, ResourceId, SettingsTable, Severity, StringId,
};

use crate::error::{CompilationFailure, CompileError, GraphEditError};
use crate::graph::{NodeId, ToolsGraph, ToolsNode};
use crate::nodes::{self, ToolsNodeKind};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Reject links whose source output type differs from the pin type.
    pub validate_pin_types: bool,
    /// Upper bound on authored nodes.
    pub max_nodes: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            validate_pin_types: true,
            max_nodes: NodeIndex::MAX_NODES,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompileLogEntry {
    pub severity: Severity,
    pub node: Option<NodeId>,
    pub message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum CompiledSlot {
    InProgress,
    Compiled(NodeIndex),
}

/// Settings slot reserved for a node whose fields still have to be filled in.
#[derive(Debug)]
pub struct PendingSettings<S> {
    node: NodeId,
    _settings: PhantomData<S>,
}

impl<S> PendingSettings<S> {
    pub fn node(&self) -> NodeId {
        self.node
    }
}

#[derive(Debug)]
pub enum NodeCompilationState<S> {
    AlreadyCompiled(NodeIndex),
    NeedCompilation(PendingSettings<S>),
}

pub struct GraphCompilationContext<'g> {
    graph: &'g ToolsGraph,
    options: CompileOptions,
    lookup: HashMap<NodeId, usize>,
    compiled: HashMap<NodeId, CompiledSlot>,
    settings: Vec<NodeSettings>,
    parameter_lookup: HashMap<StringId, NodeIndex>,
    resources: Vec<ResourceId>,
    log: Vec<CompileLogEntry>,
}

impl<'g> GraphCompilationContext<'g> {
    pub fn new(graph: &'g ToolsGraph, options: CompileOptions) -> Self {
        let lookup = graph
            .nodes
            .iter()
            .enumerate()
            .map(|(position, node)| (node.id, position))
            .collect();
        Self {
            graph,
            options,
            lookup,
            compiled: HashMap::new(),
            settings: Vec::new(),
            parameter_lookup: HashMap::new(),
            resources: Vec::new(),
            log: Vec::new(),
        }
    }

    pub fn graph(&self) -> &'g ToolsGraph {
        self.graph
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn node(&mut self, id: NodeId) -> Result<&'g ToolsNode, CompileError> {
        let graph = self.graph;
        match self.lookup.get(&id).and_then(|position| graph.nodes.get(*position)) {
            Some(node) => Ok(node),
            None => Err(self.log_error(CompileError::UnknownNode(id))),
        }
    }

    /// Number of settings slots allocated so far.
    pub fn num_compiled(&self) -> usize {
        self.settings.len()
    }

    /// Runtime index of an already compiled node.
    pub fn node_index(&self, id: NodeId) -> Option<NodeIndex> {
        match self.compiled.get(&id) {
            Some(CompiledSlot::Compiled(index)) => Some(*index),
            _ => None,
        }
    }

    pub fn settings(&self, index: NodeIndex) -> Option<&NodeSettings> {
        self.settings.get(index.get())
    }

    pub fn log(&self) -> &[CompileLogEntry] {
        &self.log
    }

    /// Memoized entry point for a node's compile function.
    ///
    /// A node reached again while it is still compiling depends on itself, which fails
    /// with [`CompileError::CycleDetected`].
    pub fn get_or_create_settings<S>(
        &mut self,
        node: &ToolsNode,
    ) -> Result<NodeCompilationState<S>, CompileError> {
        match self.compiled.get(&node.id) {
            Some(CompiledSlot::Compiled(index)) => Ok(NodeCompilationState::AlreadyCompiled(*index)),
            Some(CompiledSlot::InProgress) => Err(self.log_error(CompileError::CycleDetected {
                node: node.id,
                node_name: node.display_name().to_string(),
            })),
            None => {
                self.compiled.insert(node.id, CompiledSlot::InProgress);
                Ok(NodeCompilationState::NeedCompilation(PendingSettings {
                    node: node.id,
                    _settings: PhantomData,
                }))
            }
        }
    }

    /// Allocate the next runtime index for a fully compiled node.
    pub fn register<S>(&mut self, pending: PendingSettings<S>, settings: S) -> Result<NodeIndex, CompileError>
    where
        S: Into<NodeSettings>,
    {
        let count = self.settings.len();
        let index = NodeIndex::from_usize(count)
            .filter(|_| count < self.options.max_nodes)
            .ok_or_else(|| {
                self.log_error(CompileError::TooManyNodes {
                    count: count + 1,
                    limit: self.options.max_nodes.min(NodeIndex::MAX_NODES),
                })
            })?;
        let settings = settings.into();
        log::debug!("compiled node {} as {:?} at index {index}", pending.node, settings.kind());
        self.settings.push(settings);
        self.compiled.insert(pending.node, CompiledSlot::Compiled(index));
        Ok(index)
    }

    /// Register a control parameter and add it to the parameter lookup.
    pub fn register_parameter(
        &mut self,
        pending: PendingSettings<NodeSettings>,
        node: &ToolsNode,
        settings: NodeSettings,
    ) -> Result<NodeIndex, CompileError> {
        let Some(id) = settings.parameter_id().cloned() else {
            return self.register(pending, settings);
        };
        if self.parameter_lookup.contains_key(&id) {
            return Err(self.log_error(CompileError::DuplicateParameter {
                node: node.id,
                node_name: node.display_name().to_string(),
                id: id.to_string(),
            }));
        }
        let index = self.register(pending, settings)?;
        self.parameter_lookup.insert(id, index);
        Ok(index)
    }

    /// Slot of `resource` in the compiled data set, adding it on first use.
    pub fn register_resource(&mut self, node: &ToolsNode, resource: &ResourceId) -> Result<u16, CompileError> {
        let slot = match self.resources.iter().position(|existing| existing == resource) {
            Some(slot) => slot,
            None => {
                self.resources.push(resource.clone());
                self.resources.len() - 1
            }
        };
        u16::try_from(slot).map_err(|_| {
            self.log_error(CompileError::InvalidResource {
                node: node.id,
                node_name: node.display_name().to_string(),
                reason: "too many resources".to_string(),
            })
        })
    }

    /// Compile the node with id `id` (memoized).
    pub fn compile_node(&mut self, id: NodeId) -> Result<NodeIndex, CompileError> {
        let node = self.node(id)?;
        let result = nodes::compile(node, self);
        if result.is_err() && self.compiled.get(&id) == Some(&CompiledSlot::InProgress) {
            self.compiled.remove(&id);
        }
        result
    }

    /// Compile whatever feeds `pin`; a disconnected pin is an error naming `node`.
    pub fn compile_input(&mut self, node: &ToolsNode, pin: &str) -> Result<NodeIndex, CompileError> {
        match self.compile_optional_input(node, pin)? {
            Some(index) => Ok(index),
            None => Err(self.log_error(CompileError::DisconnectedRequiredPin {
                node: node.id,
                node_name: node.display_name().to_string(),
                pin: pin.to_string(),
            })),
        }
    }

    /// Compile whatever feeds `pin`, or `None` when it is disconnected.
    pub fn compile_optional_input(
        &mut self,
        node: &ToolsNode,
        pin: &str,
    ) -> Result<Option<NodeIndex>, CompileError> {
        let Some(source_id) = node.input_link(pin) else {
            return Ok(None);
        };
        let source = self.node(source_id)?;
        if matches!(source.kind, ToolsNodeKind::Result) {
            return Err(self.log_error(CompileError::ResultNodeAsInput(source_id)));
        }
        if self.options.validate_pin_types {
            let expected = node.signature().and_then(|sig| sig.input(pin)).map(|(ty, _)| ty);
            let actual = source.kind.output_type();
            if let Some(expected) = expected {
                if actual != Some(expected) {
                    return Err(self.log_error(CompileError::PinTypeMismatch {
                        node: node.id,
                        node_name: node.display_name().to_string(),
                        pin: pin.to_string(),
                        expected,
                        actual,
                    }));
                }
            }
        }
        self.compile_node(source_id).map(Some)
    }

    /// Record a hard error and hand it back for propagation.
    pub fn log_error(&mut self, error: CompileError) -> CompileError {
        log::error!("graph '{}': {error}", self.graph.name);
        self.log.push(CompileLogEntry {
            severity: Severity::Error,
            node: error.node(),
            message: error.to_string(),
        });
        error
    }

    pub fn log_warning(&mut self, node: &ToolsNode, message: impl Into<String>) {
        let message = message.into();
        log::warn!(
            "graph '{}': node '{}' ({}): {message}",
            self.graph.name,
            node.display_name(),
            node.id
        );
        self.log.push(CompileLogEntry {
            severity: Severity::Warning,
            node: Some(node.id),
            message,
        });
    }

    fn layout_error(&mut self, error: GraphEditError) -> CompileError {
        let graph = self.graph;
        let name_of = |node: NodeId| {
            graph
                .node(node)
                .map(|n| n.display_name().to_string())
                .unwrap_or_default()
        };
        let error = match error {
            GraphEditError::UnknownNode(node) => CompileError::UnknownNode(node),
            GraphEditError::InvalidLayout { node, reason } => CompileError::InvalidPinLayout {
                node_name: name_of(node),
                node,
                reason,
            },
            GraphEditError::DuplicateNode(node) => CompileError::InvalidPinLayout {
                node_name: name_of(node),
                node,
                reason: "node id appears more than once".to_string(),
            },
            GraphEditError::NoOutput(node) => CompileError::ResultNodeAsInput(node),
            other => CompileError::InvalidTable(GraphError::Serialization(other.to_string())),
        };
        self.log_error(error)
    }

    fn compile_graph_root(&mut self) -> Result<NodeIndex, CompileError> {
        let graph = self.graph;
        if graph.nodes.len() > self.options.max_nodes {
            return Err(self.log_error(CompileError::TooManyNodes {
                count: graph.nodes.len(),
                limit: self.options.max_nodes,
            }));
        }
        if let Err(error) = graph.validate_layout() {
            return Err(self.layout_error(error));
        }

        let results: Vec<&ToolsNode> = graph
            .nodes
            .iter()
            .filter(|node| matches!(node.kind, ToolsNodeKind::Result))
            .collect();
        let result = match results.as_slice() {
            [] => return Err(self.log_error(CompileError::NoResultNode)),
            [result] => *result,
            many => return Err(self.log_error(CompileError::MultipleResultNodes(many.len()))),
        };

        // Control parameters take the first indices, in declaration order.
        for node in graph.nodes.iter().filter(|node| node.kind.is_control_parameter()) {
            self.compile_node(node.id)?;
        }

        let root = self.compile_input(result, "Pose")?;

        for node in &graph.nodes {
            if !matches!(node.kind, ToolsNodeKind::Result) && self.node_index(node.id).is_none() {
                self.log_warning(node, "not connected to the result; skipped");
            }
        }
        Ok(root)
    }

    fn finish(self, root: NodeIndex) -> Result<CompiledGraph, CompilationFailure> {
        let GraphCompilationContext {
            graph,
            compiled,
            settings,
            parameter_lookup,
            resources,
            mut log,
            ..
        } = self;

        let settings = match SettingsTable::new(settings, root, parameter_lookup) {
            Ok(settings) => settings,
            Err(error) => {
                let error = CompileError::InvalidTable(error);
                log::error!("graph '{}': {error}", graph.name);
                log.push(CompileLogEntry {
                    severity: Severity::Error,
                    node: None,
                    message: error.to_string(),
                });
                return Err(CompilationFailure { error, log });
            }
        };

        let node_index_map = compiled
            .into_iter()
            .filter_map(|(id, slot)| match slot {
                CompiledSlot::Compiled(index) => Some((id, index)),
                CompiledSlot::InProgress => None,
            })
            .collect();

        Ok(CompiledGraph {
            settings,
            data_set: DataSetDescriptor {
                variation_id: graph.name.clone(),
                skeleton: graph.skeleton.clone(),
                resources,
            },
            node_index_map,
            log,
        })
    }
}

/// Output of a successful compilation.
#[derive(Clone, Debug)]
pub struct CompiledGraph {
    pub settings: SettingsTable,
    pub data_set: DataSetDescriptor,
    /// Runtime index of every compiled authoring node.
    pub node_index_map: HashMap<NodeId, NodeIndex>,
    /// Warnings recorded along the way.
    pub log: Vec<CompileLogEntry>,
}

impl CompiledGraph {
    pub fn runtime_index(&self, id: NodeId) -> Option<NodeIndex> {
        self.node_index_map.get(&id).copied()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CompileLogEntry> + '_ {
        self.log
            .iter()
            .filter(|entry| entry.severity == Severity::Warning)
    }

    /// Resolve the data set and pair it with the compiled table.
    pub fn variation(&self, resolver: &dyn AssetResolver) -> Result<GraphVariation, GraphError> {
        let data_set = GraphDataSet::from_descriptor(&self.data_set, resolver)?;
        Ok(GraphVariation::new(
            Arc::new(self.settings.clone()),
            Arc::new(data_set),
        ))
    }
}

/// Compile `graph` into a runtime settings table.
pub fn compile_graph(graph: &ToolsGraph, options: CompileOptions) -> Result<CompiledGraph, CompilationFailure> {
    let mut context = GraphCompilationContext::new(graph, options);
    match context.compile_graph_root() {
        Ok(root) => context.finish(root),
        Err(error) => Err(CompilationFailure {
            error,
            log: context.log,
        }),
    }
}
