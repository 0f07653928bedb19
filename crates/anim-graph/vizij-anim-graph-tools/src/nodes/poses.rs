//! Pose node compilation.

use vizij_anim_graph::data_set::GRAPH_RESOURCE_EXTENSION;
use vizij_anim_graph::settings::{ChildGraphSettings, GraphEventsSettings, PoseBlendSettings};
use vizij_anim_graph::{NodeIndex, NodeSettings, ResourceId, StringId};

use super::validate_id;
use crate::compilation::{GraphCompilationContext, NodeCompilationState};
use crate::error::CompileError;
use crate::graph::ToolsNode;

pub(super) fn compile_reference_pose(
    node: &ToolsNode,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    match ctx.get_or_create_settings::<NodeSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => Ok(index),
        NodeCompilationState::NeedCompilation(pending) => {
            ctx.register(pending, NodeSettings::ReferencePose)
        }
    }
}

pub(super) fn compile_pose_blend(
    node: &ToolsNode,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<PoseBlendSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    let source_node = ctx.compile_input(node, "Source")?;
    let target_node = ctx.compile_input(node, "Target")?;
    let blend_weight_value_node = ctx.compile_input(node, "Blend Weight")?;
    let bone_mask_node = ctx.compile_optional_input(node, "Bone Mask")?;
    ctx.register(
        pending,
        PoseBlendSettings {
            source_node,
            target_node,
            blend_weight_value_node,
            bone_mask_node,
        },
    )
}

pub(super) fn compile_graph_events(
    node: &ToolsNode,
    event_ids: &[StringId],
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<GraphEventsSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    let child_node = ctx.compile_input(node, "Pose")?;
    for id in event_ids {
        validate_id(node, id, ctx)?;
    }
    if event_ids.is_empty() {
        ctx.log_warning(node, "no events to emit");
    }
    ctx.register(
        pending,
        GraphEventsSettings {
            child_node,
            event_ids: event_ids.to_vec(),
        },
    )
}

pub(super) fn compile_child_graph(
    node: &ToolsNode,
    graph: Option<&ResourceId>,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<ChildGraphSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    let invalid = |reason: String| CompileError::InvalidResource {
        node: node.id,
        node_name: node.display_name().to_string(),
        reason,
    };
    let Some(graph) = graph else {
        return Err(ctx.log_error(invalid("no child graph assigned".to_string())));
    };
    if graph.extension() != GRAPH_RESOURCE_EXTENSION {
        return Err(ctx.log_error(invalid(format!(
            "'{graph}' is not an animation graph (.{GRAPH_RESOURCE_EXTENSION})"
        ))));
    }
    let child_graph_idx = ctx.register_resource(node, graph)?;
    ctx.register(pending, ChildGraphSettings { child_graph_idx })
}
