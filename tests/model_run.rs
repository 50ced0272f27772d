// tests/model_run.rs

mod common;

use std::sync::Arc;

use dagplan::config::{PlannerConfig, RawPlannerConfig};
use dagplan::{compile, run_iterations, LocalGroup, Model, PlanError};
use dagplan_test_utils::builders::GraphBuilder;
use dagplan_test_utils::fake_scope::{FakeScope, RecordingUnit};

use common::{init_tracing, shape};

#[test]
fn iterations_get_numbered_ids() {
    init_tracing();
    let graph = GraphBuilder::new().chain(&["a", "b"]).build();
    let mut scope = FakeScope::with_units(&["a", "b"]);
    let plan = compile(&graph, &scope).unwrap();

    let done = run_iterations(&plan, &mut scope, 2, "run").unwrap();
    assert_eq!(done, 2);

    let ids: Vec<String> = scope.runs().into_iter().map(|(_, it)| it).collect();
    assert_eq!(ids, vec!["run.1-0", "run.1-1", "run.2-0", "run.2-1"]);
}

#[test]
fn stop_request_ends_run_between_iterations() {
    let graph = GraphBuilder::new().chain(&["a", "b"]).build();
    let mut scope = FakeScope::with_units(&["a", "b"]).stop_after_runs(3);
    let plan = compile(&graph, &scope).unwrap();

    let err = run_iterations(&plan, &mut scope, 5, "1").unwrap_err();
    assert!(matches!(
        err,
        PlanError::RunStopped {
            completed: 2,
            requested: 5
        }
    ));
    // The second iteration finished even though the stop arrived during it.
    assert_eq!(scope.runs().len(), 4);
}

#[test]
fn structural_edits_recompile_the_plan() {
    let mut model = Model::new();
    let scope = FakeScope::with_units(&["a", "b", "c"]);

    model.connect("a.x", "b.x").unwrap();
    assert_eq!(shape(model.plan(&scope).unwrap()), "S[a, b]");

    model.connect("a.y", "c.y").unwrap();
    assert_eq!(shape(model.plan(&scope).unwrap()), "S[a, P[b, c]]");

    model.disconnect("a.x", "b.x").unwrap();
    model.remove_unit("b");
    assert_eq!(shape(model.plan(&scope).unwrap()), "S[a, c]");
}

#[test]
fn rejected_edit_keeps_graph_and_plan() {
    let mut model = Model::new();
    let scope = FakeScope::with_units(&["a", "b"]);
    model.connect("a.x", "b.x").unwrap();
    model.plan(&scope).unwrap();

    assert!(model.connect("b.y", "a.y").is_err());
    assert_eq!(model.graph().list_connections(true).len(), 1);
    assert_eq!(shape(model.plan(&scope).unwrap()), "S[a, b]");
}

#[test]
fn process_group_change_redoes_allocation() {
    let mut model = Model::with_graph(
        GraphBuilder::new().edge("a", "b").edge("a", "c").build(),
    );
    let scope = FakeScope::with_units(&["a", "b", "c"]);

    model.set_process_group(Arc::new(LocalGroup::new(2, 0)));
    let plan = model.plan(&scope).unwrap();
    assert_eq!(plan.children()[1].local_children().len(), 1);

    model.set_process_group(Arc::new(LocalGroup::single()));
    let err = model.plan(&scope).unwrap_err();
    assert!(matches!(err, PlanError::Allocation { .. }));

    model.set_process_group(Arc::new(LocalGroup::new(2, 1)));
    let plan = model.plan(&scope).unwrap();
    assert_eq!(plan.children()[1].local_children()[0].name(), "c");
}

#[test]
fn configured_run_uses_plan_section() {
    let raw: RawPlannerConfig =
        toml::from_str("[plan]\niteration_base = \"it\"\nmax_iterations = 3\n").unwrap();
    let config = PlannerConfig::try_from(raw).unwrap();

    let mut model = Model::with_graph(GraphBuilder::new().unit("solo").build());
    let mut scope = FakeScope::with_units(&["solo"]);

    let done = model.run_configured(&mut scope, &config).unwrap();
    assert_eq!(done, 3);
    assert_eq!(scope.runs().last().unwrap().1, "it.3-0");
}

#[test]
fn model_run_reports_unit_failures() {
    let mut model = Model::with_graph(GraphBuilder::new().chain(&["a", "b"]).build());
    let mut scope = FakeScope::new()
        .with(RecordingUnit::new("a").failing())
        .with(RecordingUnit::new("b"));

    let err = model.run(&mut scope, "1").unwrap_err();
    assert!(matches!(err, PlanError::UnitRun { ref unit, .. } if unit == "a"));
    assert_eq!(scope.ran_units(), vec!["a"]);
}
