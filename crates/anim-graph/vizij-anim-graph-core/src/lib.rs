//! Runtime side of the Vizij animation graph.
//!
//! A compiled graph is a flat [`SettingsTable`]: one immutable settings block per node,
//! addressed by [`NodeIndex`]. A [`GraphInstance`] instantiates the table into a runtime
//! node tree (resolving indices through an [`InstantiationContext`]), and every frame an
//! [`EvaluationContext`] carries the ambient state (time step, world transform, branch
//! state, sampled events, layering) down the tree. Pose nodes never compute poses while
//! the tree is walked; they register deferred tasks with the [`TaskSystem`], which runs
//! once per frame to produce the final [`Pose`].
//!
//! Typical call sequence for one owner:
//!
//! 1. `EvaluationContext::new(owner_id, Some(skeleton))`
//! 2. `context.initialize(TaskSystem::new(&config))`
//! 3. every frame: `instance.run_frame(&mut context, dt, world_transform, physics)`
//! 4. `context.shutdown()`

pub mod bone_mask;
pub mod config;
pub mod context;
pub mod data_set;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod ids;
pub mod index;
pub mod instance;
pub mod instantiation;
pub mod math;
pub mod nodes;
pub mod settings;
pub mod skeleton;
pub mod task;
mod tree;
pub mod value;

pub use bone_mask::BoneMask;
pub use config::GraphConfig;
pub use context::{BranchState, EvaluationContext, GraphLayerContext, PhysicsWorldHandle};
pub use data_set::{AssetResolver, DataSetDescriptor, GraphDataSet, GraphResource, GraphVariation};
pub use diagnostics::{
    ActiveNode, DiagnosticsSink, GraphLogEntry, NullDiagnostics, RecordingDiagnostics, RootMotionAction,
    RootMotionRecord, Severity,
};
pub use error::GraphError;
pub use events::{SampledEvent, SampledEventRange, SampledEventsBuffer};
pub use ids::{ResourceId, StringId};
pub use index::NodeIndex;
pub use instance::GraphInstance;
pub use instantiation::{InstantiationContext, InstantiationOptions, NodeRef};
pub use math::Transform;
pub use nodes::{DefaultNodeFactory, NodeFactory, NodeValue, PoseNodeResult, RuntimeNode};
pub use settings::{NodeKind, NodeSettings, SettingsTable, SETTINGS_TABLE_VERSION};
pub use skeleton::{Bone, BoneMaskDefinition, BoneWeight, Skeleton};
pub use task::{Pose, PoseTask, TaskIndex, TaskSystem};
pub use value::GraphValueType;
