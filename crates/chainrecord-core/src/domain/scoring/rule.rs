//! Scoring rules
//!
//! A rule is a named, weighted, categorized predicate over a
//! [`ScoringContext`]. Predicates are plain function pointers: they cannot
//! capture state, which keeps evaluation pure.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::context::ScoringContext;

/// Predicate deciding whether a rule fires for a context
pub type RulePredicate = fn(&ScoringContext) -> bool;

pub const NEW_ENTITY_LT_90_DAYS: &str = "NEW_ENTITY_LT_90_DAYS";
pub const OWNS_GT_10_PROPERTIES: &str = "OWNS_GT_10_PROPERTIES";
pub const ADDRESS_SHARED_GE_3_ENTITIES: &str = "ADDRESS_SHARED_GE_3_ENTITIES";
pub const AGENT_SHARED_GE_4_ENTITIES: &str = "AGENT_SHARED_GE_4_ENTITIES";
pub const INACTIVE_STATUS: &str = "INACTIVE_STATUS";

pub const NEW_ENTITY_LT_30_DAYS: &str = "NEW_ENTITY_LT_30_DAYS";
pub const NO_PRIMARY_ADDRESS: &str = "NO_PRIMARY_ADDRESS";
pub const OWNS_GT_25_PROPERTIES: &str = "OWNS_GT_25_PROPERTIES";
pub const DORMANT_SHELL: &str = "DORMANT_SHELL";
pub const AGENT_REPRESENTS_GT_50_ENTITIES: &str = "AGENT_REPRESENTS_GT_50_ENTITIES";
pub const ADDRESS_GT_20_ENTITIES: &str = "ADDRESS_GT_20_ENTITIES";
pub const NEW_ENTITY_CROWDED_ADDRESS: &str = "NEW_ENTITY_CROWDED_ADDRESS";

/// A single scoring rule
#[derive(Clone)]
pub struct ScoringRule {
    name: String,
    weight: i32,
    category: String,
    description: String,
    predicate: RulePredicate,
}

impl ScoringRule {
    /// Create a rule; negative weights lower the score when the rule fires
    pub fn new(
        name: impl Into<String>,
        weight: i32,
        category: impl Into<String>,
        description: impl Into<String>,
        predicate: RulePredicate,
    ) -> Self {
        Self {
            name: name.into(),
            weight,
            category: category.into(),
            description: description.into(),
            predicate,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn weight(&self) -> i32 {
        self.weight
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Run the predicate
    pub fn applies(&self, ctx: &ScoringContext) -> bool {
        (self.predicate)(ctx)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidArgument("Rule name must not be empty".into()));
        }
        if self.category.trim().is_empty() {
            return Err(Error::InvalidArgument(format!(
                "Rule '{}' needs a category",
                self.name
            )));
        }
        Ok(())
    }

    /// Serializable description of the rule
    pub fn descriptor(&self) -> RuleDescriptor {
        RuleDescriptor {
            name: self.name.clone(),
            weight: self.weight,
            category: self.category.clone(),
            description: self.description.clone(),
        }
    }
}

impl std::fmt::Debug for ScoringRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringRule")
            .field("name", &self.name)
            .field("weight", &self.weight)
            .field("category", &self.category)
            .finish_non_exhaustive()
    }
}

/// Rule metadata as recorded in score details
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDescriptor {
    pub name: String,
    pub weight: i32,
    pub category: String,
    pub description: String,
}

/// Which built-in rules to seed the registry with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleSet {
    /// The five core signals
    #[default]
    Standard,
    /// Core signals plus the finer-grained thresholds
    Extended,
}

impl RuleSet {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Extended => "extended",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "standard" => Some(Self::Standard),
            "extended" => Some(Self::Extended),
            _ => None,
        }
    }

    /// The rules in registration order
    pub fn rules(&self) -> Vec<ScoringRule> {
        match self {
            Self::Standard => standard_rules(),
            Self::Extended => {
                let mut rules = standard_rules();
                rules.extend(extended_rules());
                rules
            }
        }
    }
}

impl std::fmt::Display for RuleSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The starter rule set
pub fn standard_rules() -> Vec<ScoringRule> {
    vec![
        ScoringRule::new(
            NEW_ENTITY_LT_90_DAYS,
            10,
            "entity",
            "Entity formed within the last 90 days",
            |ctx| ctx.younger_than(90),
        ),
        ScoringRule::new(
            OWNS_GT_10_PROPERTIES,
            15,
            "property",
            "Entity owns more than 10 properties",
            |ctx| ctx.property_count > 10,
        ),
        ScoringRule::new(
            ADDRESS_SHARED_GE_3_ENTITIES,
            10,
            "relationship",
            "Primary address shared with 3 or more other entities",
            |ctx| ctx.address_entity_count >= 3,
        ),
        ScoringRule::new(
            AGENT_SHARED_GE_4_ENTITIES,
            10,
            "relationship",
            "Registered agent shared with 4 or more other entities",
            |ctx| ctx.agent_entity_count >= 4,
        ),
        ScoringRule::new(
            INACTIVE_STATUS,
            5,
            "entity",
            "Entity status is inactive or dissolved",
            |ctx| ctx.status_is_any(&["DISSOLVED", "INACTIVE"]),
        ),
    ]
}

/// Additional thresholds layered on top of the standard set
pub fn extended_rules() -> Vec<ScoringRule> {
    vec![
        ScoringRule::new(
            NEW_ENTITY_LT_30_DAYS,
            15,
            "entity",
            "Entity formed within the last 30 days",
            |ctx| ctx.younger_than(30),
        ),
        ScoringRule::new(
            NO_PRIMARY_ADDRESS,
            5,
            "entity",
            "Entity has no primary address on file",
            |ctx| !ctx.has_primary_address,
        ),
        ScoringRule::new(
            OWNS_GT_25_PROPERTIES,
            20,
            "property",
            "Entity owns more than 25 properties",
            |ctx| ctx.property_count > 25,
        ),
        ScoringRule::new(
            DORMANT_SHELL,
            5,
            "property",
            "Entity older than a year that owns no properties",
            |ctx| ctx.property_count == 0 && ctx.older_than(365),
        ),
        ScoringRule::new(
            AGENT_REPRESENTS_GT_50_ENTITIES,
            15,
            "relationship",
            "Registered agent represents more than 50 other entities",
            |ctx| ctx.agent_entity_count > 50,
        ),
        ScoringRule::new(
            ADDRESS_GT_20_ENTITIES,
            12,
            "relationship",
            "More than 20 other entities at the same address",
            |ctx| ctx.address_entity_count > 20,
        ),
        ScoringRule::new(
            NEW_ENTITY_CROWDED_ADDRESS,
            8,
            "relationship",
            "More than 5 other entities at the same address and entity is under 180 days old",
            |ctx| ctx.address_entity_count > 5 && ctx.younger_than(180),
        ),
    ]
}
