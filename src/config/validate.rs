// src/config/validate.rs

use crate::config::model::{PlannerConfig, RawPlannerConfig};
use crate::errors::{PlanError, Result};

impl TryFrom<RawPlannerConfig> for PlannerConfig {
    type Error = PlanError;

    fn try_from(raw: RawPlannerConfig) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(PlannerConfig::new_unchecked(raw.plan, raw.process, raw.logging))
    }
}

fn validate_raw_config(cfg: &RawPlannerConfig) -> Result<()> {
    validate_plan(cfg)?;
    validate_process(cfg)?;
    Ok(())
}

fn validate_plan(cfg: &RawPlannerConfig) -> Result<()> {
    if cfg.plan.max_iterations == 0 {
        return Err(PlanError::ConfigError(
            "[plan].max_iterations must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.plan.iteration_base.trim().is_empty() {
        return Err(PlanError::ConfigError(
            "[plan].iteration_base must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_process(cfg: &RawPlannerConfig) -> Result<()> {
    if cfg.process.group_size == 0 {
        return Err(PlanError::ConfigError(
            "[process].group_size must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.process.collective_timeout_ms == 0 {
        return Err(PlanError::ConfigError(
            "[process].collective_timeout_ms must be > 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> RawPlannerConfig {
        toml::from_str(src).expect("valid toml")
    }

    #[test]
    fn empty_file_uses_defaults() {
        let cfg = PlannerConfig::try_from(parse("")).unwrap();
        assert_eq!(cfg.iteration_base(), "1");
        assert_eq!(cfg.max_iterations(), 1);
        assert_eq!(cfg.group_size(), 1);
        assert_eq!(cfg.collective_timeout().as_millis(), 30_000);
        assert_eq!(cfg.log_level(), None);
    }

    #[test]
    fn zero_group_size_is_rejected() {
        let err = PlannerConfig::try_from(parse("[process]\ngroup_size = 0\n")).unwrap_err();
        assert!(err.to_string().contains("group_size"));
    }

    #[test]
    fn zero_iterations_is_rejected() {
        let err = PlannerConfig::try_from(parse("[plan]\nmax_iterations = 0\n")).unwrap_err();
        assert!(matches!(err, PlanError::ConfigError(_)));
    }

    #[test]
    fn unknown_log_level_fails_to_parse() {
        let res: std::result::Result<RawPlannerConfig, _> =
            toml::from_str("[logging]\nlevel = \"loud\"\n");
        assert!(res.is_err());
    }
}
