//! Bone hierarchy, bind pose and named bone-mask definitions.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::ids::StringId;
use crate::math::Transform;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bone {
    pub id: StringId,
    /// Parent bone index; parents always precede their children.
    #[serde(default)]
    pub parent: Option<usize>,
    /// Local-space reference (bind) transform.
    #[serde(default)]
    pub reference: Transform,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneWeight {
    pub bone: StringId,
    pub weight: f32,
}

/// Authored mask: per-bone weights keyed by bone id. Unlisted bones weigh 0.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoneMaskDefinition {
    pub id: StringId,
    pub weights: Vec<BoneWeight>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Skeleton {
    pub id: StringId,
    pub bones: Vec<Bone>,
    #[serde(default)]
    pub bone_masks: Vec<BoneMaskDefinition>,
}

impl Skeleton {
    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn bone_index(&self, id: &StringId) -> Option<usize> {
        self.bones.iter().position(|bone| &bone.id == id)
    }

    pub fn reference_pose(&self) -> Vec<Transform> {
        self.bones.iter().map(|bone| bone.reference).collect()
    }

    pub fn bone_mask_definition(&self, id: &StringId) -> Option<&BoneMaskDefinition> {
        self.bone_masks.iter().find(|mask| &mask.id == id)
    }

    /// Check the hierarchy is ordered parent-first.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (index, bone) in self.bones.iter().enumerate() {
            if let Some(parent) = bone.parent {
                if parent >= index {
                    return Err(GraphError::Serialization(format!(
                        "bone '{}' at {index} has parent {parent}, which does not precede it",
                        bone.id
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn from_json(json: &str) -> Result<Self, GraphError> {
        let skeleton: Skeleton = serde_json::from_str(json)?;
        skeleton.validate()?;
        Ok(skeleton)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BIPED: &str = r#"{
        "id": "biped",
        "bones": [
            { "id": "root" },
            { "id": "spine", "parent": 0 },
            { "id": "arm", "parent": 1 }
        ],
        "bone_masks": [
            { "id": "Upper Body", "weights": [ { "bone": "arm", "weight": 1.0 } ] }
        ]
    }"#;

    #[test]
    fn parse_skeleton_with_masks() {
        let skeleton = Skeleton::from_json(BIPED).unwrap();
        assert_eq!(skeleton.num_bones(), 3);
        assert_eq!(skeleton.bone_index(&"arm".into()), Some(2));
        assert!(skeleton.bone_mask_definition(&"Upper Body".into()).is_some());
        assert_eq!(skeleton.reference_pose()[1], Transform::IDENTITY);
    }

    #[test]
    fn rejects_child_before_parent() {
        let json = r#"{ "id": "bad", "bones": [ { "id": "a", "parent": 1 }, { "id": "b" } ] }"#;
        assert!(Skeleton::from_json(json).is_err());
    }
}
