use std::hint::black_box;
use std::sync::Arc;

use criterion::{criterion_group, criterion_main, Criterion};
use vizij_anim_graph::{
    EvaluationContext, GraphConfig, GraphDataSet, GraphInstance, GraphVariation, Skeleton,
    TaskSystem, Transform,
};
use vizij_anim_graph_tools::{compile_graph, CompileOptions, ToolsGraph};

fn fixture_graph() -> ToolsGraph {
    let json = vizij_test_fixtures::anim_graphs::graph_json("upper-body-blend")
        .expect("graph fixture");
    ToolsGraph::from_json_str(&json).expect("parse graph")
}

fn fixture_skeleton() -> Arc<Skeleton> {
    Arc::new(vizij_test_fixtures::skeletons::load("biped").expect("biped skeleton"))
}

fn bench_compile(c: &mut Criterion) {
    let graph = fixture_graph();
    c.bench_function("compile_upper_body_blend", |b| {
        b.iter(|| compile_graph(black_box(&graph), CompileOptions::default()).expect("compile"))
    });
}

fn bench_update(c: &mut Criterion) {
    let skeleton = fixture_skeleton();
    let compiled = compile_graph(&fixture_graph(), CompileOptions::default()).expect("compile");
    let variation = GraphVariation::new(
        Arc::new(compiled.settings),
        Arc::new(GraphDataSet::new("upper-body-blend", skeleton.clone())),
    );
    let mut instance = GraphInstance::new(&variation, 1).expect("instantiate");
    let mut ctx = EvaluationContext::new(1, Some(skeleton));
    ctx.initialize(TaskSystem::new(&GraphConfig::default()));

    let choices = ["upper", "none"];
    let mut frame = 0usize;
    c.bench_function("update_upper_body_blend", |b| {
        b.iter(|| {
            frame += 1;
            // Flip the selector now and then so transitions are part of the measurement.
            if frame % 30 == 0 {
                instance
                    .set_parameter_id("Mask Choice", choices[(frame / 30) % 2])
                    .expect("parameter");
            }
            let pose = instance
                .run_frame(&mut ctx, 1.0 / 60.0, Transform::IDENTITY, None)
                .expect("frame");
            black_box(pose);
        })
    });
}

criterion_group!(benches, bench_compile, bench_update);
criterion_main!(benches);
