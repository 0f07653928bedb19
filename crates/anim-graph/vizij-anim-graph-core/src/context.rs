//! Per-frame ambient state handed to every node during evaluation.
//!
//! One [`EvaluationContext`] is created per owning entity and reused across frames:
//!
//! ```text
//! new(owner, skeleton) -> initialize(task_system) -> update(..)* -> shutdown()
//! ```
//!
//! The context is only valid once it has both a skeleton and a task system; graph
//! instances refuse to evaluate against an invalid context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::bone_mask::BoneMask;
use crate::config::GraphConfig;
use crate::diagnostics::{
    ActiveNode, DiagnosticsSink, GraphLogEntry, NullDiagnostics, RootMotionAction, RootMotionRecord,
    Severity,
};
use crate::error::GraphError;
use crate::events::{SampledEventRange, SampledEventsBuffer};
use crate::index::NodeIndex;
use crate::math::Transform;
use crate::skeleton::Skeleton;
use crate::task::{Pose, PoseTask, TaskIndex, TaskSystem};

/// Whether the subtree being evaluated is fading in (or fully on) versus phasing out.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchState {
    #[default]
    Active,
    Inactive,
}

/// Opaque physics world reference, passed through untouched.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct PhysicsWorldHandle(pub u64);

/// State of the layer currently being evaluated; supplied by the layering node.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphLayerContext {
    pub layer_weight: f32,
    pub root_motion_weight: f32,
    pub layer_mask: Option<Arc<BoneMask>>,
}

impl Default for GraphLayerContext {
    fn default() -> Self {
        GraphLayerContext {
            layer_weight: 1.0,
            root_motion_weight: 1.0,
            layer_mask: None,
        }
    }
}

pub struct EvaluationContext {
    user_id: u64,
    skeleton: Option<Arc<Skeleton>>,
    task_system: Option<TaskSystem>,
    pub sampled_events: SampledEventsBuffer,
    /// Pose produced by the previous update, if any.
    pub previous_pose: Option<Pose>,
    pub branch_state: BranchState,
    update_id: u32,
    delta_time: f32,
    world_transform: Transform,
    world_transform_inverse: Transform,
    physics_world: Option<PhysicsWorldHandle>,
    layer_context: Option<GraphLayerContext>,
    graph_depth: u16,
    diagnostics: Box<dyn DiagnosticsSink>,
}

impl EvaluationContext {
    pub fn new(user_id: u64, skeleton: Option<Arc<Skeleton>>) -> Self {
        Self::with_config(user_id, skeleton, &GraphConfig::default())
    }

    pub fn with_config(user_id: u64, skeleton: Option<Arc<Skeleton>>, config: &GraphConfig) -> Self {
        EvaluationContext {
            user_id,
            skeleton,
            task_system: None,
            sampled_events: SampledEventsBuffer::with_capacity(config.event_buffer_capacity),
            previous_pose: None,
            branch_state: BranchState::Active,
            update_id: 0,
            delta_time: 0.0,
            world_transform: Transform::IDENTITY,
            world_transform_inverse: Transform::IDENTITY,
            physics_world: None,
            layer_context: None,
            graph_depth: 0,
            diagnostics: Box::new(NullDiagnostics),
        }
    }

    pub fn initialize(&mut self, task_system: TaskSystem) {
        self.task_system = Some(task_system);
    }

    /// Release the task system and drop per-update state. The context is invalid
    /// afterwards until initialized again.
    pub fn shutdown(&mut self) -> Option<TaskSystem> {
        self.sampled_events.clear();
        self.previous_pose = None;
        self.layer_context = None;
        self.branch_state = BranchState::Active;
        self.task_system.take()
    }

    pub fn set_skeleton(&mut self, skeleton: Arc<Skeleton>) {
        self.skeleton = Some(skeleton);
    }

    pub fn is_valid(&self) -> bool {
        self.skeleton.is_some() && self.task_system.is_some()
    }

    /// Start a new update. Fails without touching any state if the context is invalid.
    pub fn update(
        &mut self,
        delta_time: f32,
        world_transform: Transform,
        physics_world: Option<PhysicsWorldHandle>,
    ) -> Result<(), GraphError> {
        let Some(task_system) = self.task_system.as_mut() else {
            log::error!("update called on context {} without a task system", self.user_id);
            return Err(GraphError::InvalidContext);
        };
        if self.skeleton.is_none() {
            log::error!("update called on context {} without a skeleton", self.user_id);
            return Err(GraphError::InvalidContext);
        }

        if let Some(pose) = task_system.take_result() {
            self.previous_pose = Some(pose);
        }
        task_system.reset();

        self.update_id = self.update_id.wrapping_add(1);
        self.delta_time = delta_time;
        self.world_transform = world_transform;
        self.world_transform_inverse = world_transform.inverse();
        self.physics_world = physics_world;
        self.branch_state = BranchState::Active;
        self.layer_context = None;
        self.sampled_events.clear();
        self.diagnostics.begin_update(self.update_id);
        Ok(())
    }

    pub fn user_id(&self) -> u64 {
        self.user_id
    }

    pub fn update_id(&self) -> u32 {
        self.update_id
    }

    pub fn delta_time(&self) -> f32 {
        self.delta_time
    }

    pub fn world_transform(&self) -> &Transform {
        &self.world_transform
    }

    pub fn world_transform_inverse(&self) -> &Transform {
        &self.world_transform_inverse
    }

    pub fn physics_world(&self) -> Option<PhysicsWorldHandle> {
        self.physics_world
    }

    pub fn skeleton(&self) -> Option<&Arc<Skeleton>> {
        self.skeleton.as_ref()
    }

    pub fn require_skeleton(&self) -> Result<&Arc<Skeleton>, GraphError> {
        self.skeleton.as_ref().ok_or(GraphError::InvalidContext)
    }

    // Layering

    pub fn is_in_layer(&self) -> bool {
        self.layer_context.is_some()
    }

    pub fn layer_context(&self) -> Option<&GraphLayerContext> {
        self.layer_context.as_ref()
    }

    pub fn begin_layer(&mut self, layer: GraphLayerContext) -> Result<(), GraphError> {
        debug_assert!(self.layer_context.is_none(), "layers do not nest");
        if self.layer_context.is_some() {
            return Err(GraphError::LayerAlreadyActive);
        }
        self.layer_context = Some(layer);
        Ok(())
    }

    pub fn end_layer(&mut self) -> Option<GraphLayerContext> {
        self.layer_context.take()
    }

    // Events and branches

    /// Zero-length range anchored at the buffer's current length.
    pub fn empty_sampled_event_range(&self) -> SampledEventRange {
        SampledEventRange::empty(self.sampled_events.num_sampled_events())
    }

    /// Run `f` with the branch state set to `state`, restoring the previous state after.
    pub fn with_branch_state<R>(
        &mut self,
        state: BranchState,
        f: impl FnOnce(&mut EvaluationContext) -> R,
    ) -> R {
        let previous = std::mem::replace(&mut self.branch_state, state);
        let result = f(self);
        self.branch_state = previous;
        result
    }

    /// Number of child graphs between the driven instance and the node being evaluated.
    pub fn graph_depth(&self) -> u16 {
        self.graph_depth
    }

    /// Run `f` one child graph level deeper.
    pub(crate) fn with_child_graph<R>(&mut self, f: impl FnOnce(&mut EvaluationContext) -> R) -> R {
        self.graph_depth += 1;
        let result = f(self);
        self.graph_depth -= 1;
        result
    }

    // Tasks

    pub fn task_system(&self) -> Option<&TaskSystem> {
        self.task_system.as_ref()
    }

    pub fn register_pose_task(
        &mut self,
        source_node: NodeIndex,
        task: PoseTask,
    ) -> Result<TaskIndex, GraphError> {
        self.task_system
            .as_mut()
            .ok_or(GraphError::InvalidContext)?
            .register_task(source_node, task)
    }

    /// Execute this update's tasks, producing the pose of `final_task`.
    pub fn execute_tasks(&mut self, final_task: Option<TaskIndex>) -> Result<&Pose, GraphError> {
        let skeleton = self.skeleton.clone().ok_or(GraphError::InvalidContext)?;
        self.task_system
            .as_mut()
            .ok_or(GraphError::InvalidContext)?
            .execute(&skeleton, final_task)
    }

    // Diagnostics

    pub fn set_diagnostics(&mut self, sink: Box<dyn DiagnosticsSink>) {
        self.diagnostics = sink;
    }

    pub fn diagnostics_enabled(&self) -> bool {
        self.diagnostics.is_enabled()
    }

    pub fn track_active_node(&mut self, node: NodeIndex) {
        self.diagnostics.track_active_node(ActiveNode {
            graph_depth: self.graph_depth,
            node_index: node,
        });
    }

    /// Hand entries recorded outside an update (tree building) to the sink as they are.
    pub(crate) fn forward_entries(&mut self, entries: &[GraphLogEntry]) {
        for entry in entries {
            self.diagnostics.log(entry.clone());
        }
    }

    pub fn log_warning(&mut self, node: Option<NodeIndex>, message: impl Into<String>) {
        let message = message.into();
        log::warn!("[update {}] node {:?}: {message}", self.update_id, node);
        self.push_entry(Severity::Warning, node, message);
    }

    pub fn log_error(&mut self, node: Option<NodeIndex>, message: impl Into<String>) {
        let message = message.into();
        log::error!("[update {}] node {:?}: {message}", self.update_id, node);
        self.push_entry(Severity::Error, node, message);
    }

    fn push_entry(&mut self, severity: Severity, node_index: Option<NodeIndex>, message: String) {
        self.diagnostics.log(GraphLogEntry {
            update_id: self.update_id,
            graph_depth: self.graph_depth,
            severity,
            node_index,
            message,
        });
    }

    pub fn record_root_motion(&mut self, node: NodeIndex, action: RootMotionAction, delta: Transform) {
        if !self.diagnostics.is_enabled() {
            return;
        }
        self.diagnostics.record_root_motion(RootMotionRecord {
            update_id: self.update_id,
            graph_depth: self.graph_depth,
            node_index: node,
            action,
            delta,
        });
    }
}

impl std::fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("user_id", &self.user_id)
            .field("update_id", &self.update_id)
            .field("valid", &self.is_valid())
            .field("branch_state", &self.branch_state)
            .field("in_layer", &self.is_in_layer())
            .field("sampled_events", &self.sampled_events.num_sampled_events())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::RecordingDiagnostics;

    fn skeleton() -> Arc<Skeleton> {
        Arc::new(Skeleton {
            id: "empty".into(),
            bones: vec![],
            bone_masks: vec![],
        })
    }

    fn ready_context() -> EvaluationContext {
        let mut ctx = EvaluationContext::new(7, Some(skeleton()));
        ctx.initialize(TaskSystem::new(&GraphConfig::default()));
        ctx
    }

    #[test]
    fn invalid_until_skeleton_and_tasks_supplied() {
        let mut ctx = EvaluationContext::new(1, None);
        assert!(!ctx.is_valid());
        assert_eq!(ctx.update(0.016, Transform::IDENTITY, None), Err(GraphError::InvalidContext));
        assert_eq!(ctx.update_id(), 0);

        ctx.initialize(TaskSystem::new(&GraphConfig::default()));
        assert!(!ctx.is_valid());
        assert_eq!(ctx.update(0.016, Transform::IDENTITY, None), Err(GraphError::InvalidContext));
        assert_eq!(ctx.update_id(), 0);

        ctx.set_skeleton(skeleton());
        assert!(ctx.is_valid());
        ctx.update(0.016, Transform::IDENTITY, None).unwrap();
        assert_eq!(ctx.update_id(), 1);

        assert!(ctx.shutdown().is_some());
        assert!(!ctx.is_valid());
    }

    #[test]
    fn update_caches_inverse_world_transform() {
        let mut ctx = ready_context();
        let world = Transform::new([3.0, 0.0, -1.0], [0.0, 0.0, 0.0, 1.0], 2.0);
        ctx.update(0.5, world, Some(PhysicsWorldHandle(9))).unwrap();
        assert!(ctx
            .world_transform()
            .compose(ctx.world_transform_inverse())
            .approx_eq(&Transform::IDENTITY, 1e-5));
        assert_eq!(ctx.delta_time(), 0.5);
        assert_eq!(ctx.physics_world(), Some(PhysicsWorldHandle(9)));
    }

    #[test]
    fn empty_range_is_stable_without_new_events() {
        let mut ctx = ready_context();
        ctx.update(0.016, Transform::IDENTITY, None).unwrap();
        let node = NodeIndex::new(0).unwrap();
        ctx.sampled_events.emplace_graph_event(node, "step".into(), true);
        let first = ctx.empty_sampled_event_range();
        let second = ctx.empty_sampled_event_range();
        assert_eq!(first, second);
        assert_eq!(first.start, 1);
        assert!(first.is_empty());
    }

    #[test]
    fn layer_context_is_set_between_begin_and_end() {
        let mut ctx = ready_context();
        assert!(!ctx.is_in_layer());
        ctx.begin_layer(GraphLayerContext::default()).unwrap();
        assert!(ctx.is_in_layer());
        assert!(ctx.end_layer().is_some());
        assert!(!ctx.is_in_layer());
    }

    #[test]
    fn branch_state_is_restored() {
        let mut ctx = ready_context();
        let inner = ctx.with_branch_state(BranchState::Inactive, |ctx| ctx.branch_state);
        assert_eq!(inner, BranchState::Inactive);
        assert_eq!(ctx.branch_state, BranchState::Active);
    }

    #[test]
    fn log_entries_carry_update_and_node() {
        let recorder = RecordingDiagnostics::new();
        let mut ctx = ready_context();
        ctx.set_diagnostics(Box::new(recorder.clone()));
        ctx.update(0.016, Transform::IDENTITY, None).unwrap();
        ctx.update(0.016, Transform::IDENTITY, None).unwrap();
        ctx.log_warning(NodeIndex::new(4), "mask missing");

        let entries = recorder.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].update_id, 2);
        assert_eq!(entries[0].node_index, NodeIndex::new(4));
        assert_eq!(entries[0].severity, Severity::Warning);
        assert_eq!(entries[0].graph_depth, 0);
    }

    #[test]
    fn child_graph_scope_tags_diagnostics_with_depth() {
        let recorder = RecordingDiagnostics::new();
        let mut ctx = ready_context();
        ctx.set_diagnostics(Box::new(recorder.clone()));
        ctx.update(0.016, Transform::IDENTITY, None).unwrap();
        let node = NodeIndex::ZERO;

        ctx.track_active_node(node);
        ctx.with_child_graph(|ctx| {
            ctx.track_active_node(node);
            ctx.with_child_graph(|ctx| ctx.log_warning(Some(node), "nested"));
        });
        assert_eq!(ctx.graph_depth(), 0);

        let depths: Vec<u16> = recorder.active_nodes().iter().map(|n| n.graph_depth).collect();
        assert_eq!(depths, [0, 1]);
        assert_eq!(recorder.entries()[0].graph_depth, 2);
    }
}
