//! Bone mask nodes: named, fixed weight, blend and selector.

use std::sync::Arc;

use super::{wired, UpdateCache};
use crate::bone_mask::BoneMask;
use crate::context::EvaluationContext;
use crate::error::GraphError;
use crate::ids::StringId;
use crate::index::NodeIndex;
use crate::instantiation::{InstantiationContext, NodeRef};
use crate::settings::{
    BoneMaskBlendSettings, BoneMaskSelectorSettings, BoneMaskSettings, FixedWeightBoneMaskSettings,
};
use crate::tree::NodeTree;

fn sanitize_weight(weight: f32) -> f32 {
    if weight.is_nan() {
        0.0
    } else {
        weight.clamp(0.0, 1.0)
    }
}

/// Blend two optional masks. A missing mask counts as full weight on every bone.
fn blend_optional(
    source: Option<Arc<BoneMask>>,
    target: Option<Arc<BoneMask>>,
    t: f32,
    num_bones: usize,
) -> Option<Arc<BoneMask>> {
    if t <= 0.0 {
        return source;
    }
    if t >= 1.0 {
        return target;
    }
    if source.is_none() && target.is_none() {
        return None;
    }
    let full = || Arc::new(BoneMask::with_weight(num_bones, 1.0));
    let source = source.unwrap_or_else(full);
    let target = target.unwrap_or_else(full);
    Some(Arc::new(BoneMask::blend(&source, &target, t)))
}

/// Mask looked up by name on the skeleton when the node is wired.
#[derive(Debug, Default)]
pub struct NamedBoneMaskNode {
    mask_id: StringId,
    mask: Option<Arc<BoneMask>>,
}

impl NamedBoneMaskNode {
    pub(crate) fn wire(&mut self, settings: &BoneMaskSettings, ctx: &mut InstantiationContext<'_>) {
        self.mask_id = settings.mask_id.clone();
        let skeleton = Arc::clone(ctx.skeleton());
        self.mask = match skeleton.bone_mask_definition(&settings.mask_id) {
            Some(definition) => Some(Arc::new(BoneMask::from_definition(&skeleton, definition))),
            None => {
                ctx.log_warning(format!(
                    "bone mask '{}' is not defined on skeleton '{}'; using no mask",
                    settings.mask_id, skeleton.id
                ));
                None
            }
        };
    }

    pub fn mask_id(&self) -> &StringId {
        &self.mask_id
    }

    pub(crate) fn mask(&self) -> Option<Arc<BoneMask>> {
        self.mask.clone()
    }
}

#[derive(Debug, Default)]
pub struct FixedWeightBoneMaskNode {
    weight: f32,
    mask: Option<Arc<BoneMask>>,
}

impl FixedWeightBoneMaskNode {
    pub(crate) fn wire(
        &mut self,
        settings: &FixedWeightBoneMaskSettings,
        ctx: &mut InstantiationContext<'_>,
    ) {
        self.weight = settings.bone_weight;
        // BoneMask::with_weight clamps; the stored weight stays as authored.
        let num_bones = ctx.skeleton().num_bones();
        self.mask = Some(Arc::new(BoneMask::with_weight(num_bones, settings.bone_weight)));
    }

    pub fn weight(&self) -> f32 {
        self.weight
    }

    pub(crate) fn mask(&self) -> Option<Arc<BoneMask>> {
        self.mask.clone()
    }
}

#[derive(Debug, Default)]
pub struct BoneMaskBlendNode {
    weight: Option<NodeRef>,
    source: Option<NodeRef>,
    target: Option<NodeRef>,
    cache: UpdateCache<Option<Arc<BoneMask>>>,
}

impl BoneMaskBlendNode {
    pub(crate) fn wire(&mut self, settings: &BoneMaskBlendSettings, ctx: &mut InstantiationContext<'_>) {
        self.weight = Some(ctx.resolve_required(settings.blend_weight_value_node));
        self.source = Some(ctx.resolve_required(settings.source_mask_node));
        self.target = Some(ctx.resolve_required(settings.target_mask_node));
    }

    pub(crate) fn reset(&mut self) {
        self.cache.clear();
    }

    pub(crate) fn evaluate(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<Arc<BoneMask>>, GraphError> {
        if let Some(mask) = self.cache.get(ctx.update_id()) {
            return Ok(mask);
        }
        let weight = sanitize_weight(tree.float_value(wired(self.weight, this)?, ctx)?);
        let source = tree.bone_mask(wired(self.source, this)?, ctx)?;
        let target = tree.bone_mask(wired(self.target, this)?, ctx)?;
        let num_bones = ctx.require_skeleton()?.num_bones();
        let mask = blend_optional(source, target, weight, num_bones);
        Ok(self.cache.store(ctx.update_id(), mask))
    }
}

/// Wiring shared by both selector kinds.
#[derive(Debug, Default)]
struct SelectorLinks {
    parameter: Option<NodeRef>,
    default_mask: Option<NodeRef>,
    options: Vec<NodeRef>,
    keys: Vec<StringId>,
    blend_time: f32,
}

impl SelectorLinks {
    fn wire(&mut self, settings: &BoneMaskSelectorSettings, ctx: &mut InstantiationContext<'_>) {
        self.parameter = Some(ctx.resolve_required(settings.parameter_value_node));
        self.default_mask = Some(ctx.resolve_required(settings.default_mask_node));
        self.options = ctx.resolve_all(&settings.mask_nodes);
        self.keys = settings.parameter_values.clone();
        if self.keys.len() != self.options.len() {
            ctx.log_warning(format!(
                "selector has {} options but {} keys; extra entries are ignored",
                self.options.len(),
                self.keys.len()
            ));
            let len = self.keys.len().min(self.options.len());
            self.keys.truncate(len);
            self.options.truncate(len);
        }
        self.blend_time = settings.blend_time.max(0.0);
    }

    /// Position of the option whose key matches the parameter, `None` for the default.
    fn select(
        &self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<usize>, GraphError> {
        let value = tree.id_value(wired(self.parameter, this)?, ctx)?;
        Ok(self.keys.iter().position(|key| *key == value))
    }

    fn mask_for(&self, this: NodeIndex, selection: Option<usize>) -> Result<NodeRef, GraphError> {
        match selection.and_then(|i| self.options.get(i)) {
            Some(option) => Ok(*option),
            None => wired(self.default_mask, this),
        }
    }
}

#[derive(Debug)]
struct SelectorTransition {
    from: Option<Arc<BoneMask>>,
    elapsed: f32,
}

/// Selector that re-evaluates its parameter every update and blends to a new selection
/// over `blend_time` seconds.
#[derive(Debug, Default)]
pub struct BoneMaskSelectorNode {
    links: SelectorLinks,
    selection: Option<Option<usize>>,
    last_output: Option<Arc<BoneMask>>,
    transition: Option<SelectorTransition>,
    cache: UpdateCache<Option<Arc<BoneMask>>>,
}

impl BoneMaskSelectorNode {
    pub(crate) fn wire(
        &mut self,
        settings: &BoneMaskSelectorSettings,
        ctx: &mut InstantiationContext<'_>,
    ) {
        self.links.wire(settings, ctx);
    }

    pub(crate) fn reset(&mut self) {
        self.selection = None;
        self.last_output = None;
        self.transition = None;
        self.cache.clear();
    }

    pub fn is_transitioning(&self) -> bool {
        self.transition.is_some()
    }

    pub(crate) fn evaluate(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<Arc<BoneMask>>, GraphError> {
        if let Some(mask) = self.cache.get(ctx.update_id()) {
            return Ok(mask);
        }
        let selection = self.links.select(this, tree, ctx)?;
        let target = tree.bone_mask(self.links.mask_for(this, selection)?, ctx)?;

        if let Some(previous) = self.selection {
            if previous != selection {
                log::debug!("selector {this} switched from {previous:?} to {selection:?}");
                self.transition = Some(SelectorTransition {
                    from: self.last_output.clone(),
                    elapsed: 0.0,
                });
            }
        }
        self.selection = Some(selection);

        let num_bones = ctx.require_skeleton()?.num_bones();
        let blend_time = self.links.blend_time;
        let dt = ctx.delta_time();
        let blended = self.transition.as_mut().and_then(|transition| {
            transition.elapsed += dt;
            let t = if blend_time <= 0.0 {
                1.0
            } else {
                transition.elapsed / blend_time
            };
            (t < 1.0).then(|| blend_optional(transition.from.clone(), target.clone(), t, num_bones))
        });
        if blended.is_none() {
            self.transition = None;
        }
        let output = blended.unwrap_or(target);

        self.last_output = output.clone();
        Ok(self.cache.store(ctx.update_id(), output))
    }
}

/// Selector that picks its option on the first update after a reset and keeps it.
#[derive(Debug, Default)]
pub struct FixedBoneMaskSelectorNode {
    links: SelectorLinks,
    resolved: Option<NodeRef>,
    cache: UpdateCache<Option<Arc<BoneMask>>>,
}

impl FixedBoneMaskSelectorNode {
    pub(crate) fn wire(
        &mut self,
        settings: &BoneMaskSelectorSettings,
        ctx: &mut InstantiationContext<'_>,
    ) {
        self.links.wire(settings, ctx);
    }

    pub(crate) fn reset(&mut self) {
        self.resolved = None;
        self.cache.clear();
    }

    pub(crate) fn evaluate(
        &mut self,
        this: NodeIndex,
        tree: &mut NodeTree,
        ctx: &mut EvaluationContext,
    ) -> Result<Option<Arc<BoneMask>>, GraphError> {
        if let Some(mask) = self.cache.get(ctx.update_id()) {
            return Ok(mask);
        }
        let chosen = match self.resolved {
            Some(chosen) => chosen,
            None => {
                let selection = self.links.select(this, tree, ctx)?;
                let chosen = self.links.mask_for(this, selection)?;
                self.resolved = Some(chosen);
                chosen
            }
        };
        let mask = tree.bone_mask(chosen, ctx)?;
        Ok(self.cache.store(ctx.update_id(), mask))
    }
}
