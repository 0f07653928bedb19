use std::sync::Arc;

use hashbrown::HashMap;
use vizij_anim_graph::{
    AssetResolver, EvaluationContext, GraphConfig, GraphInstance, GraphVariation, NodeIndex,
    ResourceId, SettingsTable, Skeleton, TaskSystem, Transform,
};
use vizij_anim_graph_tools::{compile_graph, CompileOptions, CompiledGraph, NodeId, ToolsGraph};

const SKELETON: &str = "data://characters/biped.skel";
const CHILD_GRAPH: &str = "data://graphs/upper-body-blend.ag";

fn load_graph(name: &str) -> ToolsGraph {
    let json = vizij_test_fixtures::anim_graphs::graph_json(name).expect("graph fixture");
    ToolsGraph::from_json_str(&json).expect("parse graph")
}

fn compile(name: &str) -> CompiledGraph {
    compile_graph(&load_graph(name), CompileOptions::default()).expect("compile fixture")
}

#[derive(Default)]
struct FixtureResolver {
    skeletons: HashMap<String, Arc<Skeleton>>,
    graphs: HashMap<String, Arc<GraphVariation>>,
}

impl FixtureResolver {
    fn new() -> Self {
        let skeleton: Skeleton =
            vizij_test_fixtures::skeletons::load("biped").expect("biped skeleton");
        let mut resolver = FixtureResolver::default();
        resolver
            .skeletons
            .insert(SKELETON.to_string(), Arc::new(skeleton));
        resolver
    }

    fn skeleton(&self) -> Arc<Skeleton> {
        self.skeletons[SKELETON].clone()
    }
}

impl AssetResolver for FixtureResolver {
    fn resolve_skeleton(&self, id: &ResourceId) -> Option<Arc<Skeleton>> {
        self.skeletons.get(id.as_str()).cloned()
    }

    fn resolve_graph(&self, id: &ResourceId) -> Option<Arc<GraphVariation>> {
        self.graphs.get(id.as_str()).cloned()
    }
}

fn context(skeleton: Arc<Skeleton>) -> EvaluationContext {
    let mut ctx = EvaluationContext::new(3, Some(skeleton));
    ctx.initialize(TaskSystem::new(&GraphConfig::default()));
    ctx
}

#[test]
fn fixture_compiles_to_expected_table() {
    let compiled = compile("upper-body-blend");
    let expected: SettingsTable = vizij_test_fixtures::anim_graphs::compiled("upper-body-blend")
        .expect("read compiled fixture")
        .expect("fixture has a compiled table");
    assert_eq!(compiled.settings, expected);
    assert_eq!(compiled.warnings().count(), 0);
    assert_eq!(compiled.data_set.skeleton.as_ref().map(ResourceId::as_str), Some(SKELETON));
    assert!(compiled.data_set.resources.is_empty());

    let blend: NodeId = serde_json::from_str("\"0b6f6a52-1f0e-4c51-9a43-2f1d7c0e9a10\"").unwrap();
    assert_eq!(compiled.runtime_index(blend), NodeIndex::new(8));
    assert_eq!(compiled.node_index_map.len(), 9);
}

#[test]
fn compilation_is_deterministic() {
    let graph = load_graph("upper-body-blend");
    let first = compile_graph(&graph, CompileOptions::default()).unwrap();
    let second = compile_graph(&graph, CompileOptions::default()).unwrap();
    assert_eq!(first.settings, second.settings);
    assert_eq!(first.node_index_map, second.node_index_map);
}

#[test]
fn compiled_fixture_runs_through_a_resolver() {
    let resolver = FixtureResolver::new();
    let variation = compile("upper-body-blend").variation(&resolver).expect("resolve");
    let mut instance = GraphInstance::new(&variation, 3).expect("instantiate");
    let mut ctx = context(resolver.skeleton());

    instance.set_parameter_float("Blend", 1.0).unwrap();
    let pose = instance
        .run_frame(&mut ctx, 1.0 / 60.0, Transform::IDENTITY, None)
        .unwrap();
    assert_eq!(pose.len(), 3);

    let events = ctx.sampled_events.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id.as_str(), "aim_start");
    assert_eq!(events[0].weight, 1.0);
}

#[test]
fn child_graph_resources_resolve_and_run() {
    let mut resolver = FixtureResolver::new();
    let child = compile("upper-body-blend").variation(&resolver).expect("child");
    resolver
        .graphs
        .insert(CHILD_GRAPH.to_string(), Arc::new(child));

    let wrapper = compile("child-graph-wrapper");
    assert_eq!(wrapper.data_set.resources.len(), 1);
    assert_eq!(wrapper.data_set.resources[0].as_str(), CHILD_GRAPH);

    let variation = wrapper.variation(&resolver).expect("resolve wrapper");
    let mut instance = GraphInstance::new(&variation, 3).expect("instantiate");
    assert_eq!(instance.child_graphs().len(), 1);

    let mut ctx = context(resolver.skeleton());
    instance
        .run_frame(&mut ctx, 1.0 / 60.0, Transform::IDENTITY, None)
        .unwrap();
    let ids: Vec<_> = ctx
        .sampled_events
        .all()
        .iter()
        .map(|event| event.event_id.as_str().to_string())
        .collect();
    assert_eq!(ids, ["aim_start", "wrapper_tick"]);
    assert_eq!(ctx.task_system().unwrap().num_tasks(), 3);
}

#[test]
fn unresolved_child_graph_fails_to_load() {
    let resolver = FixtureResolver::new();
    let err = compile("child-graph-wrapper")
        .variation(&resolver)
        .unwrap_err();
    assert_eq!(
        err,
        vizij_anim_graph::GraphError::UnresolvedResource(CHILD_GRAPH.to_string())
    );
}
