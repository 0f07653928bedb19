//! Authoring node kinds and their compile functions.

mod bone_masks;
mod poses;
mod values;

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use vizij_anim_graph::{GraphValueType, NodeIndex, NodeSettings, ResourceId, StringId};

use crate::compilation::GraphCompilationContext;
use crate::error::CompileError;
use crate::graph::ToolsNode;
use crate::schema::{self, NodeSignature};

pub use bone_masks::displayed_bone_weight;

/// What an authoring node is, with its authored (non-pin) fields.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolsNodeKind {
    /// Graph output; its `Pose` input is the runtime root.
    Result,
    FloatParameter {
        id: StringId,
        #[serde(default)]
        default: f32,
    },
    BoolParameter {
        id: StringId,
        #[serde(default)]
        default: bool,
    },
    IdParameter {
        id: StringId,
        #[serde(default)]
        default: StringId,
    },
    FloatConstant {
        value: f32,
    },
    BoolConstant {
        value: bool,
    },
    IdConstant {
        value: StringId,
    },
    BoneMask {
        #[serde(default)]
        mask_id: StringId,
    },
    FixedWeightBoneMask {
        bone_weight: f32,
    },
    BoneMaskBlend,
    BoneMaskSelector {
        /// Selection keys, paired positionally with the `Mask N` pins.
        #[serde(default)]
        parameter_values: Vec<StringId>,
        #[serde(default)]
        switch_dynamically: bool,
        #[serde(default)]
        blend_time: f32,
    },
    ReferencePose,
    PoseBlend,
    GraphEvents {
        #[serde(default)]
        event_ids: Vec<StringId>,
    },
    ChildGraph {
        #[serde(default)]
        graph: Option<ResourceId>,
    },
}

impl ToolsNodeKind {
    pub fn type_name(&self) -> &'static str {
        match self {
            ToolsNodeKind::Result => "result",
            ToolsNodeKind::FloatParameter { .. } => "float_parameter",
            ToolsNodeKind::BoolParameter { .. } => "bool_parameter",
            ToolsNodeKind::IdParameter { .. } => "id_parameter",
            ToolsNodeKind::FloatConstant { .. } => "float_constant",
            ToolsNodeKind::BoolConstant { .. } => "bool_constant",
            ToolsNodeKind::IdConstant { .. } => "id_constant",
            ToolsNodeKind::BoneMask { .. } => "bone_mask",
            ToolsNodeKind::FixedWeightBoneMask { .. } => "fixed_weight_bone_mask",
            ToolsNodeKind::BoneMaskBlend => "bone_mask_blend",
            ToolsNodeKind::BoneMaskSelector { .. } => "bone_mask_selector",
            ToolsNodeKind::ReferencePose => "reference_pose",
            ToolsNodeKind::PoseBlend => "pose_blend",
            ToolsNodeKind::GraphEvents { .. } => "graph_events",
            ToolsNodeKind::ChildGraph { .. } => "child_graph",
        }
    }

    pub fn signature(&self) -> Option<&'static NodeSignature> {
        schema::signature(self.type_name())
    }

    pub fn output_type(&self) -> Option<GraphValueType> {
        self.signature().and_then(|sig| sig.output)
    }

    pub fn is_control_parameter(&self) -> bool {
        matches!(
            self,
            ToolsNodeKind::FloatParameter { .. }
                | ToolsNodeKind::BoolParameter { .. }
                | ToolsNodeKind::IdParameter { .. }
        )
    }

    pub fn selection_keys(&self) -> Option<&[StringId]> {
        match self {
            ToolsNodeKind::BoneMaskSelector {
                parameter_values, ..
            } => Some(parameter_values),
            _ => None,
        }
    }

    pub(crate) fn selection_keys_mut(&mut self) -> Option<&mut Vec<StringId>> {
        match self {
            ToolsNodeKind::BoneMaskSelector {
                parameter_values, ..
            } => Some(parameter_values),
            _ => None,
        }
    }

    fn ids_mut(&mut self) -> Vec<&mut StringId> {
        match self {
            ToolsNodeKind::FloatParameter { id, .. } | ToolsNodeKind::BoolParameter { id, .. } => {
                vec![id]
            }
            ToolsNodeKind::IdParameter { id, default } => vec![id, default],
            ToolsNodeKind::IdConstant { value } => vec![value],
            ToolsNodeKind::BoneMask { mask_id } => vec![mask_id],
            ToolsNodeKind::BoneMaskSelector {
                parameter_values, ..
            } => parameter_values.iter_mut().collect(),
            ToolsNodeKind::GraphEvents { event_ids } => event_ids.iter_mut().collect(),
            _ => Vec::new(),
        }
    }

    /// Add every set identifier this node uses to `ids`.
    pub fn collect_ids(&self, ids: &mut BTreeSet<StringId>) {
        let used: Vec<&StringId> = match self {
            ToolsNodeKind::FloatParameter { id, .. } | ToolsNodeKind::BoolParameter { id, .. } => {
                vec![id]
            }
            ToolsNodeKind::IdParameter { id, default } => vec![id, default],
            ToolsNodeKind::IdConstant { value } => vec![value],
            ToolsNodeKind::BoneMask { mask_id } => vec![mask_id],
            ToolsNodeKind::BoneMaskSelector {
                parameter_values, ..
            } => parameter_values.iter().collect(),
            ToolsNodeKind::GraphEvents { event_ids } => event_ids.iter().collect(),
            _ => Vec::new(),
        };
        ids.extend(used.into_iter().filter(|id| id.is_set()).cloned());
    }

    /// Replace `old` with `new`; returns whether anything changed. Unset ids are never
    /// renamed.
    pub fn rename_id(&mut self, old: &StringId, new: &StringId) -> bool {
        if !old.is_set() {
            return false;
        }
        let mut changed = false;
        for id in self.ids_mut() {
            if id == old {
                *id = new.clone();
                changed = true;
            }
        }
        changed
    }
}

/// Dispatch to the compile function of `node`'s kind.
pub(crate) fn compile(
    node: &ToolsNode,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<NodeIndex, CompileError> {
    match &node.kind {
        ToolsNodeKind::Result => Err(ctx.log_error(CompileError::ResultNodeAsInput(node.id))),
        ToolsNodeKind::FloatParameter { id, default } => values::compile_parameter(
            node,
            NodeSettings::ControlParameterFloat {
                id: id.clone(),
                default: *default,
            },
            ctx,
        ),
        ToolsNodeKind::BoolParameter { id, default } => values::compile_parameter(
            node,
            NodeSettings::ControlParameterBool {
                id: id.clone(),
                default: *default,
            },
            ctx,
        ),
        ToolsNodeKind::IdParameter { id, default } => values::compile_parameter(
            node,
            NodeSettings::ControlParameterId {
                id: id.clone(),
                default: default.clone(),
            },
            ctx,
        ),
        ToolsNodeKind::FloatConstant { value } => {
            values::compile_constant(node, NodeSettings::ConstFloat { value: *value }, ctx)
        }
        ToolsNodeKind::BoolConstant { value } => {
            values::compile_constant(node, NodeSettings::ConstBool { value: *value }, ctx)
        }
        ToolsNodeKind::IdConstant { value } => values::compile_constant(
            node,
            NodeSettings::ConstId {
                value: value.clone(),
            },
            ctx,
        ),
        ToolsNodeKind::BoneMask { mask_id } => bone_masks::compile_named(node, mask_id, ctx),
        ToolsNodeKind::FixedWeightBoneMask { bone_weight } => {
            bone_masks::compile_fixed_weight(node, *bone_weight, ctx)
        }
        ToolsNodeKind::BoneMaskBlend => bone_masks::compile_blend(node, ctx),
        ToolsNodeKind::BoneMaskSelector {
            parameter_values,
            switch_dynamically,
            blend_time,
        } => bone_masks::compile_selector(
            node,
            bone_masks::SelectorFields {
                parameter_values,
                switch_dynamically: *switch_dynamically,
                blend_time: *blend_time,
            },
            ctx,
        ),
        ToolsNodeKind::ReferencePose => poses::compile_reference_pose(node, ctx),
        ToolsNodeKind::PoseBlend => poses::compile_pose_blend(node, ctx),
        ToolsNodeKind::GraphEvents { event_ids } => poses::compile_graph_events(node, event_ids, ctx),
        ToolsNodeKind::ChildGraph { graph } => poses::compile_child_graph(node, graph.as_ref(), ctx),
    }
}

/// Validate an authored identifier, attaching failures to `node`.
pub(crate) fn validate_id(
    node: &ToolsNode,
    id: &StringId,
    ctx: &mut GraphCompilationContext<'_>,
) -> Result<(), CompileError> {
    id.validate().map_err(|reason| {
        ctx.log_error(CompileError::InvalidIdentifier {
            node: node.id,
            node_name: node.display_name().to_string(),
            value: id.as_str().to_string(),
            reason,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_a_signature() {
        let kinds = [
            ToolsNodeKind::Result,
            ToolsNodeKind::BoneMaskBlend,
            ToolsNodeKind::ReferencePose,
            ToolsNodeKind::PoseBlend,
            ToolsNodeKind::ChildGraph { graph: None },
            ToolsNodeKind::FixedWeightBoneMask { bone_weight: 0.0 },
        ];
        for kind in kinds {
            assert!(kind.signature().is_some(), "{}", kind.type_name());
        }
        assert_eq!(ToolsNodeKind::Result.output_type(), None);
        assert_eq!(
            ToolsNodeKind::BoneMaskBlend.output_type(),
            Some(GraphValueType::BoneMask)
        );
    }

    #[test]
    fn kinds_serialize_with_type_tag() {
        let kind: ToolsNodeKind =
            serde_json::from_str(r#"{"type":"bone_mask","mask_id":"Arms"}"#).unwrap();
        assert_eq!(
            kind,
            ToolsNodeKind::BoneMask {
                mask_id: StringId::new("Arms")
            }
        );
        let json = serde_json::to_value(ToolsNodeKind::PoseBlend).unwrap();
        assert_eq!(json["type"], "pose_blend");
    }

    #[test]
    fn ids_are_collected_and_renamed() {
        let mut kind = ToolsNodeKind::BoneMaskSelector {
            parameter_values: vec![StringId::new("walk"), StringId::none(), StringId::new("run")],
            switch_dynamically: true,
            blend_time: 0.2,
        };
        let mut ids = BTreeSet::new();
        kind.collect_ids(&mut ids);
        assert_eq!(ids.len(), 2);

        assert!(kind.rename_id(&StringId::new("walk"), &StringId::new("stroll")));
        assert!(!kind.rename_id(&StringId::new("walk"), &StringId::new("stroll")));
        assert_eq!(kind.selection_keys().unwrap()[0], StringId::new("stroll"));
    }

    #[test]
    fn renaming_an_unset_id_leaves_blank_keys_alone() {
        let mut kind = ToolsNodeKind::BoneMaskSelector {
            parameter_values: vec![StringId::none(), StringId::new("run"), StringId::none()],
            switch_dynamically: false,
            blend_time: 0.0,
        };
        assert!(!kind.rename_id(&StringId::none(), &StringId::new("walk")));
        assert_eq!(
            kind.selection_keys().unwrap(),
            [StringId::none(), StringId::new("run"), StringId::none()]
        );
    }
}
