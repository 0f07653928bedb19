//! Per-bone weight masks.

use crate::skeleton::{BoneMaskDefinition, Skeleton};

/// One weight in `[0, 1]` per skeleton bone.
#[derive(Clone, Debug, PartialEq)]
pub struct BoneMask {
    weights: Vec<f32>,
}

impl BoneMask {
    /// Mask with the same weight on every bone. The weight is clamped to `[0, 1]`.
    pub fn with_weight(num_bones: usize, weight: f32) -> Self {
        let weight = if weight.is_nan() { 0.0 } else { weight.clamp(0.0, 1.0) };
        BoneMask {
            weights: vec![weight; num_bones],
        }
    }

    pub fn from_definition(skeleton: &Skeleton, definition: &BoneMaskDefinition) -> Self {
        let mut weights = vec![0.0; skeleton.num_bones()];
        for entry in &definition.weights {
            match skeleton.bone_index(&entry.bone) {
                Some(index) => weights[index] = entry.weight.clamp(0.0, 1.0),
                None => log::warn!(
                    "bone mask '{}' names unknown bone '{}'",
                    definition.id,
                    entry.bone
                ),
            }
        }
        BoneMask { weights }
    }

    /// Per-bone lerp from `source` to `target`. Masks of different sizes blend over the
    /// shorter length.
    pub fn blend(source: &BoneMask, target: &BoneMask, t: f32) -> BoneMask {
        let t = t.clamp(0.0, 1.0);
        let weights = source
            .weights
            .iter()
            .zip(&target.weights)
            .map(|(a, b)| a + (b - a) * t)
            .collect();
        BoneMask { weights }
    }

    pub fn weight(&self, bone: usize) -> f32 {
        self.weights.get(bone).copied().unwrap_or(0.0)
    }

    pub fn weights(&self) -> &[f32] {
        &self.weights
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::{Bone, BoneWeight};
    use crate::Transform;

    fn skeleton() -> Skeleton {
        let bone = |id: &str, parent| Bone {
            id: id.into(),
            parent,
            reference: Transform::IDENTITY,
        };
        Skeleton {
            id: "test".into(),
            bones: vec![bone("root", None), bone("arm", Some(0))],
            bone_masks: vec![],
        }
    }

    #[test]
    fn fixed_weight_is_clamped() {
        assert_eq!(BoneMask::with_weight(2, 1.7).weights(), &[1.0, 1.0]);
        assert_eq!(BoneMask::with_weight(1, -3.0).weights(), &[0.0]);
        assert_eq!(BoneMask::with_weight(1, f32::NAN).weights(), &[0.0]);
    }

    #[test]
    fn definition_weights_unlisted_bones_as_zero() {
        let skeleton = skeleton();
        let definition = BoneMaskDefinition {
            id: "Arms".into(),
            weights: vec![
                BoneWeight { bone: "arm".into(), weight: 0.5 },
                BoneWeight { bone: "tail".into(), weight: 1.0 },
            ],
        };
        let mask = BoneMask::from_definition(&skeleton, &definition);
        assert_eq!(mask.weights(), &[0.0, 0.5]);
    }

    #[test]
    fn blend_lerps_per_bone() {
        let a = BoneMask::with_weight(2, 0.0);
        let b = BoneMask::with_weight(2, 1.0);
        assert_eq!(BoneMask::blend(&a, &b, 0.25).weights(), &[0.25, 0.25]);
        assert_eq!(BoneMask::blend(&a, &b, 4.0).weights(), &[1.0, 1.0]);
    }
}
