//! Development diagnostics: per-node log entries, active-node tracking and root motion.
//!
//! Nodes always talk to a [`DiagnosticsSink`]. Production contexts hold
//! [`NullDiagnostics`], which drops everything; tools and tests install
//! [`RecordingDiagnostics`] and read the captured data back through a shared handle.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::index::NodeIndex;
use crate::math::Transform;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

/// A diagnostic tagged with the update it happened in and the node that raised it.
///
/// Entries raised while a tree is built carry `update_id` 0. Node indices are local to
/// one graph; `graph_depth` is 0 for the instance being driven and one more for each
/// child graph level below it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphLogEntry {
    pub update_id: u32,
    #[serde(default)]
    pub graph_depth: u16,
    pub severity: Severity,
    pub node_index: Option<NodeIndex>,
    pub message: String,
}

/// A node evaluated during the current update.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActiveNode {
    pub graph_depth: u16,
    pub node_index: NodeIndex,
}

impl ActiveNode {
    pub fn root(node_index: NodeIndex) -> Self {
        ActiveNode {
            graph_depth: 0,
            node_index,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootMotionAction {
    Sample,
    Blend,
    Modify,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RootMotionRecord {
    pub update_id: u32,
    #[serde(default)]
    pub graph_depth: u16,
    pub node_index: NodeIndex,
    pub action: RootMotionAction,
    pub delta: Transform,
}

pub trait DiagnosticsSink: Send {
    /// Whether anything recorded here is kept. Callers may skip building messages when
    /// this is false.
    fn is_enabled(&self) -> bool {
        false
    }

    fn begin_update(&mut self, _update_id: u32) {}

    fn log(&mut self, _entry: GraphLogEntry) {}

    fn track_active_node(&mut self, _node: ActiveNode) {}

    fn record_root_motion(&mut self, _record: RootMotionRecord) {}
}

/// Sink that keeps nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullDiagnostics;

impl DiagnosticsSink for NullDiagnostics {}

#[derive(Debug, Default)]
struct DiagnosticsLog {
    entries: Vec<GraphLogEntry>,
    active_nodes: Vec<ActiveNode>,
    root_motion: Vec<RootMotionRecord>,
}

/// Sink that records everything. Clones share the same storage, so one handle can be
/// boxed into a context while another is kept for inspection.
///
/// Log entries accumulate across updates; active nodes and root motion records only
/// cover the most recent update.
#[derive(Clone, Debug, Default)]
pub struct RecordingDiagnostics {
    inner: Arc<Mutex<DiagnosticsLog>>,
}

impl RecordingDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, DiagnosticsLog> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn entries(&self) -> Vec<GraphLogEntry> {
        self.lock().entries.clone()
    }

    pub fn active_nodes(&self) -> Vec<ActiveNode> {
        self.lock().active_nodes.clone()
    }

    pub fn root_motion_records(&self) -> Vec<RootMotionRecord> {
        self.lock().root_motion.clone()
    }

    pub fn clear(&self) {
        let mut log = self.lock();
        log.entries.clear();
        log.active_nodes.clear();
        log.root_motion.clear();
    }
}

impl DiagnosticsSink for RecordingDiagnostics {
    fn is_enabled(&self) -> bool {
        true
    }

    fn begin_update(&mut self, _update_id: u32) {
        let mut log = self.lock();
        log.active_nodes.clear();
        log.root_motion.clear();
    }

    fn log(&mut self, entry: GraphLogEntry) {
        self.lock().entries.push(entry);
    }

    fn track_active_node(&mut self, node: ActiveNode) {
        self.lock().active_nodes.push(node);
    }

    fn record_root_motion(&mut self, record: RootMotionRecord) {
        self.lock().root_motion.push(record);
    }
}
