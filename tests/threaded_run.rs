// tests/threaded_run.rs

mod common;

use std::time::Duration;

use dagplan::{compile, run_iterations, DependencyGraph, PlanError, ThreadedWorld};
use dagplan_test_utils::builders::GraphBuilder;
use dagplan_test_utils::fake_scope::{FakeScope, RecordingUnit};

use common::init_tracing;

const TIMEOUT: Duration = Duration::from_secs(10);

fn scope() -> FakeScope {
    FakeScope::new()
        .with(RecordingUnit::new("a"))
        .with(RecordingUnit::new("b").workers(2))
        .with(RecordingUnit::new("c"))
        .with(RecordingUnit::new("d"))
}

/// a -> {b, c} -> d
fn diamond() -> DependencyGraph {
    GraphBuilder::new()
        .edge("a", "b")
        .edge("a", "c")
        .edge("b", "d")
        .edge("c", "d")
        .build()
}

#[test]
fn ranks_split_parallel_arms_between_them() {
    init_tracing();
    let graph = diamond();
    let world = ThreadedWorld::new(3, TIMEOUT).unwrap();

    let results = world.run(|group| -> dagplan::Result<Vec<String>> {
        let mut scope = scope();
        let mut plan = compile(&graph, &scope)?;
        plan.setup(group, &scope)?;
        run_iterations(&plan, &mut scope, 2, "1")?;
        Ok(scope.ran_units())
    });

    let ran: Vec<Vec<String>> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(ran[0], vec!["a", "b", "d", "a", "b", "d"]);
    assert_eq!(ran[1], vec!["a", "b", "d", "a", "b", "d"]);
    assert_eq!(ran[2], vec!["a", "c", "d", "a", "c", "d"]);
}

#[test]
fn spare_ranks_still_take_part_in_collectives() {
    let graph = diamond();
    let world = ThreadedWorld::new(5, TIMEOUT).unwrap();

    let results = world.run(|group| -> dagplan::Result<usize> {
        let mut scope = scope();
        let mut plan = compile(&graph, &scope)?;
        plan.setup(group, &scope)?;
        plan.run(&mut scope, "1")?;
        Ok(scope.runs().iter().filter(|(u, _)| u == "b" || u == "c").count())
    });

    let arm_runs: Vec<usize> = results.into_iter().map(Result::unwrap).collect();
    assert_eq!(arm_runs, vec![1, 1, 1, 0, 0]);
}

#[test]
fn ranks_with_different_plans_desync() {
    let parallel = diamond();
    let serial = GraphBuilder::new().chain(&["a", "b", "c", "d"]).build();
    let world = ThreadedWorld::new(3, Duration::from_millis(200)).unwrap();

    let results = world.run(|group| -> dagplan::Result<()> {
        let graph = if group.rank() == 0 { &serial } else { &parallel };
        let mut scope = scope();
        let mut plan = compile(graph, &scope)?;
        plan.setup(group, &scope)?;
        plan.run(&mut scope, "1")
    });

    assert!(results[0].is_ok(), "serial rank never enters a collective");
    assert!(
        results[1..]
            .iter()
            .all(|r| matches!(r, Err(PlanError::Desync(_)))),
        "{results:?}"
    );
}

#[test]
fn world_from_config_uses_group_size() {
    let raw: dagplan::config::RawPlannerConfig =
        toml::from_str("[process]\ngroup_size = 4\ncollective_timeout_ms = 500\n").unwrap();
    let config = dagplan::config::PlannerConfig::try_from(raw).unwrap();

    let world = ThreadedWorld::from_config(&config).unwrap();
    assert_eq!(world.size(), 4);
    assert_eq!(world.group(3).map(|g| g.rank()), Some(3));
    assert!(world.group(4).is_none());
}
