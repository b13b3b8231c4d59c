//! Mapper configuration.

use relmap_core::{ConfigError, Error, Result};
use relmap_query::{DEFAULT_CACHE_CAPACITY, PlaceholderStyle};
use serde::{Deserialize, Serialize};

/// Settings for a [`Mapper`](crate::Mapper).
///
/// ```
/// use relmap::{MapperConfig, PlaceholderStyle};
///
/// let config = MapperConfig::from_json(r#"{"placeholder": "dollar"}"#).unwrap();
/// assert_eq!(config.sql_cache_capacity, 500);
/// assert_eq!(config.placeholder, PlaceholderStyle::Dollar);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapperConfig {
    /// Entries held by each SQL text cache
    pub sql_cache_capacity: usize,
    /// Parameter marker written into generated SQL
    pub placeholder: PlaceholderStyle,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            sql_cache_capacity: DEFAULT_CACHE_CAPACITY,
            placeholder: PlaceholderStyle::Question,
        }
    }
}

impl MapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-cache entry limit.
    pub fn sql_cache_capacity(mut self, capacity: usize) -> Self {
        self.sql_cache_capacity = capacity;
        self
    }

    /// Set the placeholder style.
    pub fn placeholder(mut self, style: PlaceholderStyle) -> Self {
        self.placeholder = style;
        self
    }

    /// Parse a JSON document; missing fields take their defaults.
    #[allow(clippy::result_large_err)]
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if self.sql_cache_capacity == 0 {
            return Err(Error::Config(ConfigError::new(
                "sql_cache_capacity must be at least 1",
            )));
        }
        Ok(())
    }
}
