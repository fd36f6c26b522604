//! Pipeline configuration.
//!
//! Loaded from TOML; every field is optional and falls back to its default.

use crate::{
    direction::Direction,
    error::{ErrorClass, ErrorOrigin, QueryError},
    pipeline::ExecutionEnvironment,
};
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Default number of groups drained per page, and the page size hint
/// passed to the data source.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid pipeline config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("page_size must be greater than zero")]
    ZeroPageSize,

    #[error("max_groups must be greater than zero when set")]
    ZeroMaxGroups,
}

impl From<ConfigError> for QueryError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::InvariantViolation, ErrorOrigin::Config, err.to_string())
    }
}

///
/// PipelineConfig
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub environment: ExecutionEnvironment,
    pub direction: Direction,
    pub page_size: u32,

    /// Upper bound on distinct groups held by a group-by stage.
    pub max_groups: Option<u64>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            environment: ExecutionEnvironment::default(),
            direction: Direction::default(),
            page_size: DEFAULT_PAGE_SIZE,
            max_groups: None,
        }
    }
}

impl PipelineConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if matches!(self.max_groups, Some(0)) {
            return Err(ConfigError::ZeroMaxGroups);
        }

        Ok(())
    }

    pub(crate) fn page_size_usize(&self) -> usize {
        usize::try_from(self.page_size).unwrap_or(usize::MAX)
    }

    pub(crate) fn max_groups_usize(&self) -> Option<usize> {
        self.max_groups
            .map(|max| usize::try_from(max).unwrap_or(usize::MAX))
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = PipelineConfig::from_toml_str("").expect("empty config parses");

        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.environment, ExecutionEnvironment::Compute);
        assert_eq!(config.direction, Direction::Forward);
        assert_eq!(config.page_size, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn every_field_can_be_set() {
        let config = PipelineConfig::from_toml_str(
            r#"
            environment = "client"
            direction = "reverse"
            page_size = 25
            max_groups = 1000
            "#,
        )
        .expect("config parses");

        assert_eq!(config.environment, ExecutionEnvironment::Client);
        assert_eq!(config.direction, Direction::Reverse);
        assert_eq!(config.page_size, 25);
        assert_eq!(config.max_groups_usize(), Some(1000));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = PipelineConfig::from_toml_str("page_sise = 10").expect_err("typo must fail");

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_limits_fail_validation() {
        assert!(matches!(
            PipelineConfig::from_toml_str("page_size = 0"),
            Err(ConfigError::ZeroPageSize)
        ));
        assert!(matches!(
            PipelineConfig::from_toml_str("max_groups = 0"),
            Err(ConfigError::ZeroMaxGroups)
        ));
    }

    #[test]
    fn config_errors_map_to_config_origin() {
        let err = QueryError::from(ConfigError::ZeroPageSize);

        assert_eq!(err.origin, ErrorOrigin::Config);
        assert_eq!(err.class, ErrorClass::InvariantViolation);
    }
}
