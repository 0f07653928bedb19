use vizij_anim_graph::{NodeIndex, NodeSettings};

use super::validate_id;
use crate::compilation::{GraphCompilationContext, NodeCompilationState};
use crate::error::CompileError;
use crate::graph::ToolsNode;

pub(super) fn compile_parameter(
    node: &ToolsNode,
    settings: NodeSettings,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<NodeSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    if let Some(id) = settings.parameter_id() {
        validate_id(node, id, ctx)?;
    }
    if let NodeSettings::ControlParameterId { default, .. } = &settings {
        if default.is_set() {
            validate_id(node, default, ctx)?;
        }
    }
    ctx.register_parameter(pending, node, settings)
}

pub(super) fn compile_constant(
    node: &ToolsNode,
    settings: NodeSettings,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<NodeSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    // An unset ID constant is a valid "no id" value.
    if let NodeSettings::ConstId { value } = &settings {
        if value.is_set() {
            validate_id(node, value, ctx)?;
        }
    }
    ctx.register(pending, settings)
}
