//! Deferred pose tasks.
//!
//! Pose nodes register tasks while the tree is walked; nothing is computed until
//! [`TaskSystem::execute`] runs the list once, in registration order. A task may only
//! depend on tasks registered before it, so registration order is already a valid
//! execution order.

use std::fmt;
use std::sync::Arc;

use crate::bone_mask::BoneMask;
use crate::config::GraphConfig;
use crate::error::GraphError;
use crate::index::NodeIndex;
use crate::math::Transform;
use crate::skeleton::Skeleton;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskIndex(u16);

impl TaskIndex {
    pub fn get(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for TaskIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.0)
    }
}

/// Local-space transforms, one per skeleton bone.
#[derive(Clone, Debug, PartialEq)]
pub struct Pose {
    transforms: Vec<Transform>,
}

impl Pose {
    pub fn reference(skeleton: &Skeleton) -> Self {
        Pose {
            transforms: skeleton.reference_pose(),
        }
    }

    pub fn from_transforms(transforms: Vec<Transform>) -> Self {
        Pose { transforms }
    }

    /// Per-bone blend. With a mask, each bone's weight is scaled by its mask weight.
    pub fn blend(source: &Pose, target: &Pose, weight: f32, mask: Option<&BoneMask>) -> Pose {
        let weight = weight.clamp(0.0, 1.0);
        let transforms = source
            .transforms
            .iter()
            .zip(&target.transforms)
            .enumerate()
            .map(|(bone, (a, b))| {
                let w = mask.map_or(weight, |m| weight * m.weight(bone));
                Transform::blend(a, b, w)
            })
            .collect();
        Pose { transforms }
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PoseTask {
    ReferencePose,
    Blend {
        source: TaskIndex,
        target: TaskIndex,
        weight: f32,
        bone_mask: Option<Arc<BoneMask>>,
    },
}

impl PoseTask {
    pub fn dependencies(&self) -> Vec<TaskIndex> {
        match self {
            PoseTask::ReferencePose => Vec::new(),
            PoseTask::Blend { source, target, .. } => vec![*source, *target],
        }
    }
}

#[derive(Clone, Debug)]
struct RegisteredTask {
    source_node: NodeIndex,
    task: PoseTask,
}

#[derive(Debug)]
pub struct TaskSystem {
    tasks: Vec<RegisteredTask>,
    max_tasks: usize,
    result: Option<Pose>,
    executed: bool,
}

impl TaskSystem {
    pub fn new(config: &GraphConfig) -> Self {
        TaskSystem {
            tasks: Vec::with_capacity(config.task_capacity),
            max_tasks: config.max_tasks.min(u16::MAX as usize),
            result: None,
            executed: false,
        }
    }

    /// Drop all tasks and the previous result.
    pub fn reset(&mut self) {
        self.tasks.clear();
        self.result = None;
        self.executed = false;
    }

    pub fn num_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn task(&self, index: TaskIndex) -> Option<&PoseTask> {
        self.tasks.get(index.get()).map(|t| &t.task)
    }

    /// Registered tasks in execution order, with the node that registered each.
    pub fn iter(&self) -> impl Iterator<Item = (TaskIndex, NodeIndex, &PoseTask)> + '_ {
        self.tasks
            .iter()
            .enumerate()
            .map(|(i, t)| (TaskIndex(i as u16), t.source_node, &t.task))
    }

    /// Node that registered `index`.
    pub fn source_node(&self, index: TaskIndex) -> Option<NodeIndex> {
        self.tasks.get(index.get()).map(|t| t.source_node)
    }

    pub fn register_task(
        &mut self,
        source_node: NodeIndex,
        task: PoseTask,
    ) -> Result<TaskIndex, GraphError> {
        if self.executed {
            return Err(GraphError::TasksAlreadyExecuted);
        }
        if self.tasks.len() >= self.max_tasks {
            return Err(GraphError::TaskLimitExceeded {
                limit: self.max_tasks,
            });
        }
        for dependency in task.dependencies() {
            if dependency.get() >= self.tasks.len() {
                return Err(GraphError::InvalidTaskDependency {
                    dependency: dependency.0,
                    registered: self.tasks.len(),
                });
            }
        }
        // max_tasks <= u16::MAX, so the new index always fits
        let index = TaskIndex(self.tasks.len() as u16);
        self.tasks.push(RegisteredTask { source_node, task });
        Ok(index)
    }

    /// Run every registered task once and keep the pose produced by `final_task`.
    /// Without a final task the result is the skeleton's reference pose.
    pub fn execute(
        &mut self,
        skeleton: &Skeleton,
        final_task: Option<TaskIndex>,
    ) -> Result<&Pose, GraphError> {
        if self.executed {
            return Err(GraphError::TasksAlreadyExecuted);
        }
        if let Some(task) = final_task {
            if task.get() >= self.tasks.len() {
                return Err(GraphError::InvalidTaskDependency {
                    dependency: task.0,
                    registered: self.tasks.len(),
                });
            }
        }

        let mut poses: Vec<Pose> = Vec::with_capacity(self.tasks.len());
        for registered in &self.tasks {
            let pose = match &registered.task {
                PoseTask::ReferencePose => Pose::reference(skeleton),
                PoseTask::Blend {
                    source,
                    target,
                    weight,
                    bone_mask,
                } => Pose::blend(
                    &poses[source.get()],
                    &poses[target.get()],
                    *weight,
                    bone_mask.as_deref(),
                ),
            };
            poses.push(pose);
        }

        self.executed = true;
        let result = match final_task {
            Some(task) => poses.swap_remove(task.get()),
            None => Pose::reference(skeleton),
        };
        Ok(self.result.insert(result))
    }

    pub fn is_executed(&self) -> bool {
        self.executed
    }

    pub fn result_pose(&self) -> Option<&Pose> {
        self.result.as_ref()
    }

    pub fn take_result(&mut self) -> Option<Pose> {
        self.result.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skeleton::Bone;

    fn skeleton() -> Skeleton {
        Skeleton {
            id: "pair".into(),
            bones: vec![
                Bone {
                    id: "root".into(),
                    parent: None,
                    reference: Transform::from_translation([0.0, 0.0, 0.0]),
                },
                Bone {
                    id: "tip".into(),
                    parent: Some(0),
                    reference: Transform::from_translation([0.0, 2.0, 0.0]),
                },
            ],
            bone_masks: vec![],
        }
    }

    fn node(raw: i16) -> NodeIndex {
        NodeIndex::new(raw).unwrap()
    }

    #[test]
    fn dependencies_must_be_registered_first() {
        let mut tasks = TaskSystem::new(&GraphConfig::default());
        let err = tasks
            .register_task(
                node(0),
                PoseTask::Blend {
                    source: TaskIndex(0),
                    target: TaskIndex(1),
                    weight: 0.5,
                    bone_mask: None,
                },
            )
            .unwrap_err();
        assert!(matches!(err, GraphError::InvalidTaskDependency { dependency: 0, .. }));
    }

    #[test]
    fn executes_once_per_reset() {
        let skeleton = skeleton();
        let mut tasks = TaskSystem::new(&GraphConfig::default());
        let a = tasks.register_task(node(0), PoseTask::ReferencePose).unwrap();
        let b = tasks.register_task(node(1), PoseTask::ReferencePose).unwrap();
        let blend = tasks
            .register_task(
                node(2),
                PoseTask::Blend {
                    source: a,
                    target: b,
                    weight: 0.5,
                    bone_mask: None,
                },
            )
            .unwrap();
        assert_eq!(tasks.source_node(blend), Some(node(2)));

        let pose = tasks.execute(&skeleton, Some(blend)).unwrap();
        assert_eq!(pose.transforms()[1].translation, [0.0, 2.0, 0.0]);
        assert_eq!(tasks.execute(&skeleton, Some(blend)), Err(GraphError::TasksAlreadyExecuted));
        assert!(tasks.register_task(node(3), PoseTask::ReferencePose).is_err());

        tasks.reset();
        assert!(tasks.result_pose().is_none());
        assert_eq!(tasks.num_tasks(), 0);
    }

    #[test]
    fn task_cap_is_enforced() {
        let config = GraphConfig {
            max_tasks: 2,
            ..GraphConfig::default()
        };
        let mut tasks = TaskSystem::new(&config);
        tasks.register_task(node(0), PoseTask::ReferencePose).unwrap();
        tasks.register_task(node(0), PoseTask::ReferencePose).unwrap();
        assert_eq!(
            tasks.register_task(node(0), PoseTask::ReferencePose),
            Err(GraphError::TaskLimitExceeded { limit: 2 })
        );
    }

    #[test]
    fn masked_blend_only_moves_weighted_bones() {
        let skeleton = skeleton();
        let source = Pose::reference(&skeleton);
        let target = Pose::from_transforms(vec![
            Transform::from_translation([1.0, 0.0, 0.0]),
            Transform::from_translation([1.0, 2.0, 0.0]),
        ]);
        let half = BoneMask::with_weight(2, 0.5);
        let blended = Pose::blend(&source, &target, 1.0, Some(&half));
        assert_eq!(blended.transforms()[0].translation, [0.5, 0.0, 0.0]);

        let unmasked = Pose::blend(&source, &target, 1.0, None);
        assert_eq!(unmasked.transforms()[1].translation, [1.0, 2.0, 0.0]);
    }
}
