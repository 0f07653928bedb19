//! Shared, read-only asset bundles referenced by graph instances.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::ids::{ResourceId, StringId};
use crate::settings::SettingsTable;
use crate::skeleton::Skeleton;

/// Extension of animation graph resources.
pub const GRAPH_RESOURCE_EXTENSION: &str = "ag";

/// Serialized form of a data set: ids only, resolved at load time.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSetDescriptor {
    pub variation_id: StringId,
    pub skeleton: Option<ResourceId>,
    /// Resources addressed by slot from node settings (e.g. child graphs).
    #[serde(default)]
    pub resources: Vec<ResourceId>,
}

/// Identifier-resolution service for named assets.
pub trait AssetResolver {
    fn resolve_skeleton(&self, id: &ResourceId) -> Option<Arc<Skeleton>>;

    fn resolve_graph(&self, _id: &ResourceId) -> Option<Arc<GraphVariation>> {
        None
    }
}

#[derive(Clone, Debug)]
pub enum GraphResource {
    ChildGraph(Arc<GraphVariation>),
    /// Resolved elsewhere; kept so slot numbers stay aligned with the descriptor.
    Reference(ResourceId),
}

#[derive(Clone, Debug)]
pub struct GraphDataSet {
    pub variation_id: StringId,
    pub skeleton: Arc<Skeleton>,
    pub resources: Vec<GraphResource>,
}

impl GraphDataSet {
    pub fn new(variation_id: impl Into<StringId>, skeleton: Arc<Skeleton>) -> Self {
        GraphDataSet {
            variation_id: variation_id.into(),
            skeleton,
            resources: Vec::new(),
        }
    }

    pub fn with_resources(mut self, resources: Vec<GraphResource>) -> Self {
        self.resources = resources;
        self
    }

    pub fn from_descriptor(
        descriptor: &DataSetDescriptor,
        resolver: &dyn AssetResolver,
    ) -> Result<Self, GraphError> {
        let skeleton_id = descriptor
            .skeleton
            .as_ref()
            .ok_or(GraphError::MissingSkeleton)?;
        let skeleton = resolver
            .resolve_skeleton(skeleton_id)
            .ok_or_else(|| GraphError::UnresolvedResource(skeleton_id.to_string()))?;

        let resources = descriptor
            .resources
            .iter()
            .map(|id| {
                if id.extension() == GRAPH_RESOURCE_EXTENSION {
                    resolver
                        .resolve_graph(id)
                        .map(GraphResource::ChildGraph)
                        .ok_or_else(|| GraphError::UnresolvedResource(id.to_string()))
                } else {
                    Ok(GraphResource::Reference(id.clone()))
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(GraphDataSet {
            variation_id: descriptor.variation_id.clone(),
            skeleton,
            resources,
        })
    }

    pub fn resource(&self, slot: usize) -> Option<&GraphResource> {
        self.resources.get(slot)
    }

    pub fn child_graph(&self, slot: usize) -> Option<&Arc<GraphVariation>> {
        match self.resources.get(slot) {
            Some(GraphResource::ChildGraph(variation)) => Some(variation),
            _ => None,
        }
    }
}

/// A compiled graph together with the data set it runs against.
#[derive(Clone, Debug)]
pub struct GraphVariation {
    pub definition: Arc<SettingsTable>,
    pub data_set: Arc<GraphDataSet>,
}

impl GraphVariation {
    pub fn new(definition: Arc<SettingsTable>, data_set: Arc<GraphDataSet>) -> Self {
        GraphVariation {
            definition,
            data_set,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashbrown::HashMap;

    struct MapResolver {
        skeletons: HashMap<String, Arc<Skeleton>>,
    }

    impl AssetResolver for MapResolver {
        fn resolve_skeleton(&self, id: &ResourceId) -> Option<Arc<Skeleton>> {
            self.skeletons.get(id.as_str()).cloned()
        }
    }

    fn resolver() -> MapResolver {
        let skeleton = Arc::new(Skeleton {
            id: "biped".into(),
            bones: vec![],
            bone_masks: vec![],
        });
        MapResolver {
            skeletons: [("data://biped.skel".to_string(), skeleton)].into_iter().collect(),
        }
    }

    #[test]
    fn resolves_skeleton_and_keeps_slots() {
        let descriptor = DataSetDescriptor {
            variation_id: "default".into(),
            skeleton: Some("data://biped.skel".parse().unwrap()),
            resources: vec!["data://fx/sparks.vfx".parse().unwrap()],
        };
        let data_set = GraphDataSet::from_descriptor(&descriptor, &resolver()).unwrap();
        assert_eq!(data_set.skeleton.id.as_str(), "biped");
        assert!(matches!(data_set.resource(0), Some(GraphResource::Reference(_))));
        assert!(data_set.child_graph(0).is_none());
    }

    #[test]
    fn unresolved_resources_fail() {
        let mut descriptor = DataSetDescriptor::default();
        assert_eq!(
            GraphDataSet::from_descriptor(&descriptor, &resolver()).unwrap_err(),
            GraphError::MissingSkeleton
        );

        descriptor.skeleton = Some("data://biped.skel".parse().unwrap());
        descriptor.resources = vec!["data://locomotion.ag".parse().unwrap()];
        assert_eq!(
            GraphDataSet::from_descriptor(&descriptor, &resolver()).unwrap_err(),
            GraphError::UnresolvedResource("data://locomotion.ag".into())
        );
    }
}
