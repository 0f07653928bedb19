//! Pose nodes. These never compute poses directly; they register tasks.

use super::{wired, PoseNodeResult, UpdateCache};
use crate::context::{BranchState, EvaluationContext};
use crate::diagnostics::RootMotionAction;
use crate::error::GraphError;
use crate::ids::StringId;
use crate::index::NodeIndex;
use crate::instantiation::{InstantiationContext, NodeRef};
use crate::math::Transform;
use crate::settings::{ChildGraphSettings, GraphEventsSettings, PoseBlendSettings};
use crate::task::PoseTask;
use crate::tree::NodeTree;

#[derive(Debug, Default)]
pub struct ReferencePoseNode {
    cache: UpdateCache<PoseNodeResult>,
}

impl ReferencePoseNode {
    pub(crate) fn reset(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn update(
        &mut self,
        this: NodeIndex,
        ctx: &mut EvaluationContext,
    ) -> Result<PoseNodeResult, GraphError> {
        if let Some(result) = self.cache.get(ctx.update_id()) {
            return Ok(result);
        }
        let task = ctx.register_pose_task(this, PoseTask::ReferencePose)?;
        let result = PoseNodeResult {
            task_index: Some(task),
            root_motion_delta: Transform::IDENTITY,
            sampled_event_range: ctx.empty_sampled_event_range(),
        };
        Ok(self.cache.store(ctx.update_id(), result))
    }
}

/// Blends from a source pose (phasing out) to a target pose by a weight input, with an
/// optional bone mask.
///
/// Both inputs inherit the caller's branch state while the source still contributes.
/// Once the weight reaches 1 the source is evaluated as an inactive branch, so it still
/// registers its task but samples no events. Sampled events are scaled by the weight of
/// the side that produced them.
#[derive(Debug, Default)]
pub struct PoseBlendNode {
    source: Option<NodeRef>,
    target: Option<NodeRef>,
    weight: Option<NodeRef>,
    bone_mask: Option<NodeRef>,
    cache: UpdateCache<PoseNodeResult>,
}

impl PoseBlendNode {
    pub(crate) fn wire(&mut self, settings: &PoseBlendSettings, ctx: &mut InstantiationContext<'_>) {
        self.source = Some(ctx.resolve_required(settings.source_node));
        self.target = Some(ctx.resolve_required(settings.target_node));
        self.weight = Some(ctx.resolve_required(settings.blend_weight_value_node));
        self.bone_mask = ctx.resolve_optional(settings.bone_mask_node);
    }

    pub(crate) fn reset(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn update(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<PoseNodeResult, GraphError> {
        if let Some(result) = self.cache.get(ctx.update_id()) {
            return Ok(result);
        }
        let start = ctx.sampled_events.num_sampled_events();

        let raw_weight = tree.float_value(wired(self.weight, this)?, ctx)?;
        let weight = if raw_weight.is_nan() {
            0.0
        } else {
            raw_weight.clamp(0.0, 1.0)
        };
        let source_ref = wired(self.source, this)?;
        let target_ref = wired(self.target, this)?;
        let source_state = if weight >= 1.0 {
            BranchState::Inactive
        } else {
            ctx.branch_state
        };
        let source = ctx.with_branch_state(source_state, |ctx| tree.update_pose(source_ref, ctx))?;
        let target = tree.update_pose(target_ref, ctx)?;
        let bone_mask = match self.bone_mask {
            Some(mask) => tree.bone_mask(mask, ctx)?,
            None => None,
        };

        let events = &mut ctx.sampled_events;
        events.update_weights(source.sampled_event_range, 1.0 - weight);
        events.update_weights(target.sampled_event_range, weight);

        let task_index = match (source.task_index, target.task_index) {
            (Some(source_task), Some(target_task)) => Some(ctx.register_pose_task(
                this,
                PoseTask::Blend {
                    source: source_task,
                    target: target_task,
                    weight,
                    bone_mask,
                },
            )?),
            (source_task, target_task) => target_task.or(source_task),
        };

        let root_motion_delta =
            Transform::blend(&source.root_motion_delta, &target.root_motion_delta, weight);
        ctx.record_root_motion(this, RootMotionAction::Blend, root_motion_delta);

        let result = PoseNodeResult {
            task_index,
            root_motion_delta,
            sampled_event_range: ctx.sampled_events.range_since(start),
        };
        Ok(self.cache.store(ctx.update_id(), result))
    }
}

/// Passes its child's pose through and samples authored events on active branches.
#[derive(Debug, Default)]
pub struct GraphEventsNode {
    child: Option<NodeRef>,
    event_ids: Vec<StringId>,
    cache: UpdateCache<PoseNodeResult>,
}

impl GraphEventsNode {
    pub(crate) fn wire(&mut self, settings: &GraphEventsSettings, ctx: &mut InstantiationContext<'_>) {
        self.child = Some(ctx.resolve_required(settings.child_node));
        self.event_ids = settings.event_ids.clone();
    }

    pub(crate) fn reset(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn update(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<PoseNodeResult, GraphError> {
        if let Some(result) = self.cache.get(ctx.update_id()) {
            return Ok(result);
        }
        let start = ctx.sampled_events.num_sampled_events();
        let child = tree.update_pose(wired(self.child, this)?, ctx)?;

        if ctx.branch_state == BranchState::Active {
            for id in &self.event_ids {
                ctx.sampled_events.emplace_graph_event(this, id.clone(), true);
            }
        }

        let result = PoseNodeResult {
            task_index: child.task_index,
            root_motion_delta: child.root_motion_delta,
            sampled_event_range: ctx.sampled_events.range_since(start),
        };
        Ok(self.cache.store(ctx.update_id(), result))
    }
}

/// Evaluates a nested graph instance inline, sharing the caller's context.
#[derive(Debug, Default)]
pub struct ChildGraphNode {
    child: Option<usize>,
    cache: UpdateCache<PoseNodeResult>,
}

impl ChildGraphNode {
    pub(crate) fn wire(
        &mut self,
        settings: &ChildGraphSettings,
        ctx: &mut InstantiationContext<'_>,
    ) -> Result<(), GraphError> {
        let slot = ctx
            .child_graph_for_current_node()
            .ok_or(GraphError::NotAChildGraph {
                node: ctx.current_node(),
                slot: settings.child_graph_idx as usize,
            })?;
        self.child = Some(slot);
        Ok(())
    }

    pub(crate) fn reset(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn update(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<PoseNodeResult, GraphError> {
        if let Some(result) = self.cache.get(ctx.update_id()) {
            return Ok(result);
        }
        let slot = self.child.ok_or(GraphError::UnwiredNode(this))?;
        let instance = tree.child_mut(slot).ok_or(GraphError::UnwiredNode(this))?;
        let result = ctx.with_child_graph(|ctx| instance.evaluate_nested(ctx))?;
        Ok(self.cache.store(ctx.update_id(), result))
    }
}
