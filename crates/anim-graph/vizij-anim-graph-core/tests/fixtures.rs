use std::sync::Arc;

use vizij_anim_graph::{
    EvaluationContext, GraphConfig, GraphDataSet, GraphInstance, GraphVariation, NodeIndex,
    NodeValue, PoseTask, SettingsTable, Skeleton, TaskSystem, Transform,
};

fn load_variation() -> (GraphVariation, Arc<Skeleton>) {
    let skeleton: Skeleton =
        vizij_test_fixtures::skeletons::load("biped").expect("load biped skeleton");
    skeleton.validate().expect("valid skeleton");
    let skeleton = Arc::new(skeleton);

    let json = vizij_test_fixtures::anim_graphs::compiled_json("upper-body-blend")
        .expect("read compiled table")
        .expect("fixture has a compiled table");
    let table = SettingsTable::from_json(&json).expect("valid settings table");
    let data_set = GraphDataSet::new("upper-body-blend", skeleton.clone());
    (
        GraphVariation::new(Arc::new(table), Arc::new(data_set)),
        skeleton,
    )
}

fn context(skeleton: Arc<Skeleton>) -> EvaluationContext {
    let mut ctx = EvaluationContext::new(7, Some(skeleton));
    ctx.initialize(TaskSystem::new(&GraphConfig::default()));
    ctx
}

#[test]
fn compiled_fixture_round_trips_through_json() {
    let (variation, _) = load_variation();
    let json = variation.definition.to_json().expect("serialize");
    let back = SettingsTable::from_json(&json).expect("deserialize");
    assert_eq!(&back, variation.definition.as_ref());
    assert!(json.contains("\"bone_mask_node\": 7"));
}

#[test]
fn compiled_fixture_runs_a_frame() {
    let (variation, skeleton) = load_variation();
    let mut instance = GraphInstance::new(&variation, 7).expect("instantiate");
    let mut ctx = context(skeleton.clone());

    let pose = instance
        .run_frame(&mut ctx, 1.0 / 30.0, Transform::IDENTITY, None)
        .expect("frame");
    assert_eq!(pose.transforms(), skeleton.reference_pose().as_slice());

    let tasks = ctx.task_system().expect("task system");
    let sources: Vec<i16> = tasks.iter().map(|(_, node, _)| node.raw()).collect();
    assert_eq!(sources, [2, 3, 8]);
    match tasks.iter().last().map(|(_, _, task)| task.clone()) {
        Some(PoseTask::Blend {
            weight, bone_mask, ..
        }) => {
            assert_eq!(weight, 0.5);
            let mask = bone_mask.expect("selector output");
            assert_eq!(mask.weights(), &[0.0, 1.0, 1.0]);
        }
        other => panic!("expected a blend task, got {other:?}"),
    }

    let events = ctx.sampled_events.all();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_id.as_str(), "aim_start");
    assert_eq!(events[0].weight, 0.5);
}

#[test]
fn mask_parameter_switches_to_default_mask() {
    let (variation, skeleton) = load_variation();
    let mut instance = GraphInstance::new(&variation, 7).expect("instantiate");
    let mut ctx = context(skeleton);

    instance
        .set_parameter_id("Mask Choice", "unknown")
        .expect("id parameter");
    // Long enough to finish the 0.25s transition in one step.
    instance
        .run_frame(&mut ctx, 0.5, Transform::IDENTITY, None)
        .expect("frame");
    let selector = NodeIndex::new(7).expect("index");
    match instance.sample_value(selector, &mut ctx).expect("sample") {
        NodeValue::BoneMask(Some(mask)) => assert_eq!(mask.weights(), &[1.0, 1.0, 1.0]),
        other => panic!("expected a bone mask, got {other:?}"),
    }
}
