//! Rule registry and evaluator
//!
//! The registry is built once at startup, then shared read-only by every
//! evaluation. The first call to [`RuleRegistry::evaluate`] seals it; any
//! later registration fails with [`Error::RegistrySealed`].

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{Error, Result};

use super::context::ScoringContext;
use super::grade::Grade;
use super::rule::{RuleDescriptor, RuleSet, ScoringRule};

/// Inclusive clamp applied to the summed weights before grading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBounds {
    pub floor: i64,
    pub ceiling: i64,
}

impl ScoreBounds {
    pub fn new(floor: i64, ceiling: i64) -> Result<Self> {
        if floor > ceiling {
            return Err(Error::InvalidArgument(format!(
                "score floor {} is above ceiling {}",
                floor, ceiling
            )));
        }
        Ok(Self { floor, ceiling })
    }

    pub fn clamp(&self, score: i64) -> i64 {
        score.clamp(self.floor, self.ceiling)
    }
}

impl Default for ScoreBounds {
    fn default() -> Self {
        Self {
            floor: 0,
            ceiling: 100,
        }
    }
}

/// Result of evaluating every registered rule against one context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Final score after clamping
    pub score: i64,
    /// Sum of triggered weights before clamping
    pub raw_score: i64,
    pub grade: Grade,
    /// Triggered rule names, in registration order
    pub flags: Vec<String>,
    pub rule_details: Vec<RuleDescriptor>,
}

impl Evaluation {
    pub fn triggered(&self, rule: &str) -> bool {
        self.flags.iter().any(|f| f == rule)
    }
}

/// Ordered collection of scoring rules
#[derive(Debug)]
pub struct RuleRegistry {
    rules: Vec<ScoringRule>,
    names: HashSet<String>,
    sealed: AtomicBool,
    bounds: Option<ScoreBounds>,
}

impl RuleRegistry {
    /// Empty registry clamping to [0, 100]
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            names: HashSet::new(),
            sealed: AtomicBool::new(false),
            bounds: Some(ScoreBounds::default()),
        }
    }

    /// Registry seeded with the standard starter rules
    pub fn standard() -> Result<Self> {
        Self::from_rule_set(RuleSet::Standard)
    }

    /// Registry seeded with a built-in rule set
    pub fn from_rule_set(rule_set: RuleSet) -> Result<Self> {
        let mut registry = Self::new();
        for rule in rule_set.rules() {
            registry.register(rule)?;
        }
        info!(rule_set = %rule_set, rules = registry.len(), "Rule registry initialized");
        Ok(registry)
    }

    /// Replace the clamp bounds; `None` keeps the raw sum
    pub fn with_bounds(mut self, bounds: Option<ScoreBounds>) -> Self {
        self.bounds = bounds;
        self
    }

    pub fn bounds(&self) -> Option<ScoreBounds> {
        self.bounds
    }

    /// Add a rule at the end of the evaluation order
    pub fn register(&mut self, rule: ScoringRule) -> Result<()> {
        if self.is_sealed() {
            return Err(Error::RegistrySealed(rule.name().to_string()));
        }
        rule.validate()?;
        if self.names.contains(rule.name()) {
            return Err(Error::DuplicateRuleName(rule.name().to_string()));
        }

        info!(
            rule = rule.name(),
            weight = rule.weight(),
            category = rule.category(),
            "Scoring rule registered"
        );
        self.names.insert(rule.name().to_string());
        self.rules.push(rule);
        Ok(())
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::Acquire)
    }

    /// Seal without evaluating
    pub fn seal(&self) {
        if !self.sealed.swap(true, Ordering::AcqRel) {
            info!(rules = self.rules.len(), "Rule registry sealed");
        }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ScoringRule> {
        self.rules.iter().find(|r| r.name() == name)
    }

    /// Rules in registration order, optionally limited to one category
    pub fn rules(&self, category: Option<&str>) -> Vec<&ScoringRule> {
        self.rules
            .iter()
            .filter(|r| category.is_none_or(|c| r.category().eq_ignore_ascii_case(c)))
            .collect()
    }

    /// Distinct categories in first-seen order
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for rule in &self.rules {
            if !seen.contains(&rule.category()) {
                seen.push(rule.category());
            }
        }
        seen
    }

    /// Evaluate every rule against `ctx`
    ///
    /// A panicking predicate aborts this evaluation with
    /// [`Error::RuleFailed`]; it is never skipped silently.
    pub fn evaluate(&self, ctx: &ScoringContext) -> Result<Evaluation> {
        self.seal();

        let mut raw_score: i64 = 0;
        let mut flags = Vec::new();
        let mut rule_details = Vec::new();

        for rule in &self.rules {
            let fired = catch_unwind(AssertUnwindSafe(|| rule.applies(ctx))).map_err(|payload| {
                let message = panic_message(payload.as_ref());
                error!(
                    rule = rule.name(),
                    entity_id = ctx.entity_id,
                    error = %message,
                    "Scoring rule panicked"
                );
                Error::RuleFailed {
                    rule: rule.name().to_string(),
                    message,
                }
            })?;

            if fired {
                debug!(
                    rule = rule.name(),
                    weight = rule.weight(),
                    entity_id = ctx.entity_id,
                    "Rule triggered"
                );
                raw_score += i64::from(rule.weight());
                flags.push(rule.name().to_string());
                rule_details.push(rule.descriptor());
            }
        }

        let score = match self.bounds {
            Some(bounds) => bounds.clamp(raw_score),
            None => raw_score,
        };

        Ok(Evaluation {
            score,
            raw_score,
            grade: Grade::from_score(score),
            flags,
            rule_details,
        })
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "predicate panicked".to_string()
    }
}
