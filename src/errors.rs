// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("{dest} is already connected to {existing}")]
    DuplicateConnection { dest: String, existing: String },

    #[error("{src} is not connected to {dest}")]
    NotConnected { src: String, dest: String },

    #[error(
        "circular dependency ({}) would be created by connecting {src} to {dest}",
        .cycle.join(", ")
    )]
    CyclicDependency {
        cycle: Vec<String>,
        src: String,
        dest: String,
    },

    #[error("parallel group {unit} requested {requested} processors but got 0")]
    Allocation { unit: String, requested: usize },

    #[error("process group desynchronised: {0}")]
    Desync(String),

    #[error("unit '{unit}' failed in iteration {iteration}: {source}")]
    UnitRun {
        unit: String,
        iteration: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Unit not found: {0}")]
    UnknownUnit(String),

    #[error("invalid variable path '{0}'")]
    InvalidPath(String),

    #[error("run stopped after {completed} of {requested} iterations")]
    RunStopped { completed: usize, requested: usize },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, PlanError>;
