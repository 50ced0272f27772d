// src/config/model.rs

use std::time::Duration;

use serde::Deserialize;

use crate::types::LogLevel;

/// Planner configuration as read from a TOML file.
///
/// ```toml
/// [plan]
/// iteration_base = "1"
/// max_iterations = 10
///
/// [process]
/// group_size = 4
/// collective_timeout_ms = 30000
///
/// [logging]
/// level = "debug"
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawPlannerConfig {
    #[serde(default)]
    pub plan: PlanSection,

    #[serde(default)]
    pub process: ProcessSection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// `[plan]` section: how the iteration driver runs a compiled plan.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanSection {
    /// Prefix of every iteration id; iteration `n` runs as `"{base}.{n}"`.
    #[serde(default = "default_iteration_base")]
    pub iteration_base: String,

    /// Number of iterations a configured run performs.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
}

fn default_iteration_base() -> String {
    "1".to_string()
}

fn default_max_iterations() -> usize {
    1
}

impl Default for PlanSection {
    fn default() -> Self {
        Self {
            iteration_base: default_iteration_base(),
            max_iterations: default_max_iterations(),
        }
    }
}

/// `[process]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessSection {
    /// Ranks in the top-level group of a threaded world.
    #[serde(default = "default_group_size")]
    pub group_size: usize,

    /// How long a rank waits in a collective for the others.
    #[serde(default = "default_collective_timeout_ms")]
    pub collective_timeout_ms: u64,
}

fn default_group_size() -> usize {
    1
}

fn default_collective_timeout_ms() -> u64 {
    30_000
}

impl Default for ProcessSection {
    fn default() -> Self {
        Self {
            group_size: default_group_size(),
            collective_timeout_ms: default_collective_timeout_ms(),
        }
    }
}

/// `[logging]` section. An absent level defers to `DAGPLAN_LOG`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingSection {
    #[serde(default)]
    pub level: Option<LogLevel>,
}

/// Validated planner configuration.
///
/// Only obtainable through `TryFrom<RawPlannerConfig>`, so its values are
/// known to be usable.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    plan: PlanSection,
    process: ProcessSection,
    logging: LoggingSection,
}

impl PlannerConfig {
    pub(crate) fn new_unchecked(
        plan: PlanSection,
        process: ProcessSection,
        logging: LoggingSection,
    ) -> Self {
        Self {
            plan,
            process,
            logging,
        }
    }

    pub fn iteration_base(&self) -> &str {
        &self.plan.iteration_base
    }

    pub fn max_iterations(&self) -> usize {
        self.plan.max_iterations
    }

    pub fn group_size(&self) -> usize {
        self.process.group_size
    }

    pub fn collective_timeout(&self) -> Duration {
        Duration::from_millis(self.process.collective_timeout_ms)
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        self.logging.level
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        let raw = RawPlannerConfig::default();
        Self::new_unchecked(raw.plan, raw.process, raw.logging)
    }
}
