//! Bone mask node compilation.

use vizij_anim_graph::settings::{
    BoneMaskBlendSettings, BoneMaskSelectorSettings, BoneMaskSettings, FixedWeightBoneMaskSettings,
};
use vizij_anim_graph::{NodeIndex, StringId};

use super::validate_id;
use crate::compilation::{GraphCompilationContext, NodeCompilationState};
use crate::error::CompileError;
use crate::graph::ToolsNode;

/// Weight shown in the editor; the compiled value keeps the authored number.
pub fn displayed_bone_weight(bone_weight: f32) -> f32 {
    if bone_weight.is_nan() {
        0.0
    } else {
        bone_weight.clamp(0.0, 1.0)
    }
}

pub(super) fn compile_named(
    node: &ToolsNode,
    mask_id: &StringId,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<BoneMaskSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    validate_id(node, mask_id, ctx)?;
    ctx.register(
        pending,
        BoneMaskSettings {
            mask_id: mask_id.clone(),
        },
    )
}

pub(super) fn compile_fixed_weight(
    node: &ToolsNode,
    bone_weight: f32,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<FixedWeightBoneMaskSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    ctx.register(pending, FixedWeightBoneMaskSettings { bone_weight })
}

pub(super) fn compile_blend(
    node: &ToolsNode,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<BoneMaskBlendSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    let blend_weight_value_node = ctx.compile_input(node, "Blend Weight")?;
    let source_mask_node = ctx.compile_input(node, "Source")?;
    let target_mask_node = ctx.compile_input(node, "Target")?;
    ctx.register(
        pending,
        BoneMaskBlendSettings {
            blend_weight_value_node,
            source_mask_node,
            target_mask_node,
        },
    )
}

pub(super) struct SelectorFields<'a> {
    pub parameter_values: &'a [StringId],
    pub switch_dynamically: bool,
    pub blend_time: f32,
}

pub(super) fn compile_selector(
    node: &ToolsNode,
    fields: SelectorFields<'_>,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    let pending = match ctx.get_or_create_settings::<BoneMaskSelectorSettings>(node)? {
        NodeCompilationState::AlreadyCompiled(index) => return Ok(index),
        NodeCompilationState::NeedCompilation(pending) => pending,
    };
    let parameter_value_node = ctx.compile_input(node, "Parameter")?;
    let default_mask_node = ctx.compile_input(node, "Default Mask")?;

    let option_pins: Vec<String> = node.dynamic_pins().map(|pin| pin.name.clone()).collect();
    let mut mask_nodes = Vec::with_capacity(option_pins.len());
    for pin in &option_pins {
        mask_nodes.push(ctx.compile_input(node, pin)?);
    }

    let keys = fields.parameter_values;
    if keys.len() < mask_nodes.len() {
        return Err(ctx.log_error(CompileError::MissingSelectionKeys {
            node: node.id,
            node_name: node.display_name().to_string(),
            options: mask_nodes.len(),
            keys: keys.len(),
        }));
    }
    for (position, key) in keys.iter().enumerate() {
        if let Err(reason) = key.validate() {
            return Err(ctx.log_error(CompileError::InvalidSelectionKey {
                node: node.id,
                node_name: node.display_name().to_string(),
                position,
                reason,
            }));
        }
    }
    if keys.len() > mask_nodes.len() {
        ctx.log_warning(
            node,
            format!(
                "{} selection keys for {} options; ignoring the last {}",
                keys.len(),
                mask_nodes.len(),
                keys.len() - mask_nodes.len()
            ),
        );
    }

    let parameter_values = keys[..mask_nodes.len()].to_vec();
    ctx.register(
        pending,
        BoneMaskSelectorSettings {
            parameter_value_node,
            default_mask_node,
            mask_nodes,
            parameter_values,
            switch_dynamically: fields.switch_dynamically,
            blend_time: fields.blend_time,
        },
    )
}
