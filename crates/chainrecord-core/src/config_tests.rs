//! Config module tests

use crate::config::{Config, GraphConfig, ScoringConfig};
use crate::domain::scoring::{RuleSet, ScoringContext};

#[test]
fn test_config_default() {
    let config = Config::default();

    assert!(config.database.path.is_none());
    assert_eq!(config.graph.default_depth, 2);
    assert_eq!(config.scoring.score_floor, 0);
    assert_eq!(config.scoring.score_ceiling, 100);
    assert!(config.scoring.clamp);
    assert_eq!(config.scoring.rule_set, RuleSet::Standard);
    assert!(config.validate().is_ok());
}

#[test]
fn test_config_toml_roundtrip_via_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let mut config = Config::default();
    config.set("graph.default_depth", "3").unwrap();
    config.set("scoring.rule_set", "extended").unwrap();
    config.set("database.path", "/var/lib/chainrecord/records.db").unwrap();
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    assert_eq!(loaded.get("scoring.rule_set").unwrap(), "extended");
}

#[test]
fn test_missing_file_loads_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let loaded = Config::load_from(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, Config::default());
}

#[test]
fn test_partial_file_fills_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[scoring]\nclamp = false\n").unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert!(!loaded.scoring.clamp);
    assert_eq!(loaded.scoring.score_ceiling, 100);
    assert_eq!(loaded.graph, GraphConfig::default());
}

#[test]
fn test_invalid_file_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[graph]\ndefault_depth = 9\n").unwrap();

    assert!(Config::load_from(&path).is_err());
}

#[test]
fn test_set_validates_values() {
    let mut config = Config::default();

    assert!(config.set("graph.default_depth", "6").is_err());
    assert!(config.set("graph.default_depth", "deep").is_err());
    assert!(config.set("scoring.score_floor", "101").is_err());
    assert!(config.set("scoring.score_ceiling", "-1").is_err());
    assert!(config.set("scoring.clamp", "maybe").is_err());
    assert!(config.set("scoring.rule_set", "custom").is_err());
    assert!(config.set("llm.default_model", "x").is_err());

    assert_eq!(config, Config::default());
}

#[test]
fn test_list_covers_every_key() {
    let config = Config::default();
    let keys: Vec<String> = config.list().unwrap().into_iter().map(|(k, _)| k).collect();

    assert_eq!(keys.len(), 6);
    for key in &keys {
        assert!(config.get(key).is_ok(), "{} should be readable", key);
    }
}

#[test]
fn test_scoring_config_builds_registry() {
    let unclamped = ScoringConfig {
        clamp: false,
        ..ScoringConfig::default()
    };
    let registry = unclamped.build_registry().unwrap();
    assert!(registry.bounds().is_none());
    assert_eq!(registry.len(), 5);

    let extended = ScoringConfig {
        rule_set: RuleSet::Extended,
        score_ceiling: 50,
        ..ScoringConfig::default()
    };
    let registry = extended.build_registry().unwrap();
    assert_eq!(registry.len(), 12);
    let eval = registry
        .evaluate(&ScoringContext::new(1).with_property_count(30).with_age_days(10))
        .unwrap();
    assert!(eval.score <= 50);
}
