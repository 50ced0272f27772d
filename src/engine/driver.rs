// src/engine/driver.rs

use tracing::{debug, info};

use crate::errors::{PlanError, Result};
use crate::plan::ExecNode;
use crate::scope::Scope;

/// Run `plan` up to `iterations` times with ids `"{base}.1"`, `"{base}.2"`, ...
///
/// The scope's stop flag is polled before every iteration; a pending stop
/// ends the run with [`PlanError::RunStopped`]. In a multi-rank run every
/// rank must see the same stop decision, since each iteration enters
/// collectives.
pub fn run_iterations(
    plan: &ExecNode,
    scope: &mut dyn Scope,
    iterations: usize,
    base: &str,
) -> Result<usize> {
    for n in 1..=iterations {
        if scope.stop_requested() {
            info!(completed = n - 1, requested = iterations, "stop requested; ending run");
            return Err(PlanError::RunStopped {
                completed: n - 1,
                requested: iterations,
            });
        }

        let id = format!("{base}.{n}");
        debug!(iteration = %id, "starting iteration");
        plan.run(scope, &id)?;
    }

    info!(iterations, "run complete");
    Ok(iterations)
}
