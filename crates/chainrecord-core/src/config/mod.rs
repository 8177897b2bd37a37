//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::graph::MAX_TRAVERSAL_DEPTH;
use crate::domain::scoring::{RuleRegistry, RuleSet, ScoreBounds};

/// Chainrecord configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSection,
    pub graph: GraphConfig,
    pub scoring: ScoringConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// SQLite file; unset means `<config_dir>/chainrecord.db`
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub default_depth: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub score_floor: i64,
    pub score_ceiling: i64,
    /// When false the raw sum of weights is graded as-is
    pub clamp: bool,
    pub rule_set: RuleSet,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self { default_depth: 2 }
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            score_floor: 0,
            score_ceiling: 100,
            clamp: true,
            rule_set: RuleSet::Standard,
        }
    }
}

impl ScoringConfig {
    /// Clamp bounds, or `None` when clamping is off
    pub fn bounds(&self) -> anyhow::Result<Option<ScoreBounds>> {
        if !self.clamp {
            return Ok(None);
        }
        let bounds = ScoreBounds::new(self.score_floor, self.score_ceiling)?;
        Ok(Some(bounds))
    }

    /// Build the process-wide rule registry described by this section
    pub fn build_registry(&self) -> anyhow::Result<RuleRegistry> {
        Ok(RuleRegistry::from_rule_set(self.rule_set)?.with_bounds(self.bounds()?))
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var("CHAINRECORD_CONFIG_DIR") {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("chainrecord")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or defaults if it doesn't exist
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to(&Self::config_path()?)
    }

    /// Save configuration to an explicit file
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        self.validate()?;

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.graph.default_depth > MAX_TRAVERSAL_DEPTH {
            return Err(anyhow!(
                "graph.default_depth must be between 0 and {}",
                MAX_TRAVERSAL_DEPTH
            ));
        }
        if self.scoring.score_floor > self.scoring.score_ceiling {
            return Err(anyhow!(
                "scoring.score_floor ({}) must not exceed scoring.score_ceiling ({})",
                self.scoring.score_floor,
                self.scoring.score_ceiling
            ));
        }
        Ok(())
    }

    /// Database file to open
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .unwrap_or_else(crate::storage::default_database_path)
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "database.path" => Ok(self.database_path().display().to_string()),
            "graph.default_depth" => Ok(self.graph.default_depth.to_string()),
            "scoring.score_floor" => Ok(self.scoring.score_floor.to_string()),
            "scoring.score_ceiling" => Ok(self.scoring.score_ceiling.to_string()),
            "scoring.clamp" => Ok(self.scoring.clamp.to_string()),
            "scoring.rule_set" => Ok(self.scoring.rule_set.to_string()),
            _ => Err(unknown_key(key)),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "database.path" => {
                self.database.path = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            "graph.default_depth" => {
                let depth: u32 = value
                    .parse()
                    .with_context(|| format!("Invalid default_depth value: {}", value))?;
                if depth > MAX_TRAVERSAL_DEPTH {
                    return Err(anyhow!(
                        "Default depth must be between 0 and {}",
                        MAX_TRAVERSAL_DEPTH
                    ));
                }
                self.graph.default_depth = depth;
            }
            "scoring.score_floor" => {
                let floor: i64 = value
                    .parse()
                    .with_context(|| format!("Invalid score_floor value: {}", value))?;
                if floor > self.scoring.score_ceiling {
                    return Err(anyhow!("Score floor must not exceed the ceiling"));
                }
                self.scoring.score_floor = floor;
            }
            "scoring.score_ceiling" => {
                let ceiling: i64 = value
                    .parse()
                    .with_context(|| format!("Invalid score_ceiling value: {}", value))?;
                if ceiling < self.scoring.score_floor {
                    return Err(anyhow!("Score ceiling must not be below the floor"));
                }
                self.scoring.score_ceiling = ceiling;
            }
            "scoring.clamp" => {
                self.scoring.clamp = value.parse().with_context(|| {
                    format!("Invalid clamp value: {} (expected true or false)", value)
                })?;
            }
            "scoring.rule_set" => {
                self.scoring.rule_set = RuleSet::parse(value).ok_or_else(|| {
                    anyhow!("Invalid rule set: {}. Valid options: standard, extended", value)
                })?;
            }
            _ => {
                return Err(unknown_key(key));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "database.path",
            "graph.default_depth",
            "scoring.score_floor",
            "scoring.score_ceiling",
            "scoring.clamp",
            "scoring.rule_set",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}

fn unknown_key(key: &str) -> anyhow::Error {
    anyhow!(
        "Unknown configuration key: {}. Use `chainrecord config list` to see available keys.",
        key
    )
}
