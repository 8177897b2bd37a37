//! Entity lookups needed by scoring
//!
//! Full entity records belong to the surrounding system; scoring only needs
//! the handful of attributes below.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The attributes of a legal entity that scoring reads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityProfile {
    pub id: i64,
    pub legal_name: String,
    /// 'llc', 'corp', 'trust', 'nonprofit', ...
    pub entity_type: Option<String>,
    /// 'ACTIVE', 'INACTIVE', 'DISSOLVED', ...
    pub status: Option<String>,
    pub formation_date: Option<NaiveDate>,
}

impl EntityProfile {
    pub fn new(id: i64, legal_name: impl Into<String>) -> Self {
        Self {
            id,
            legal_name: legal_name.into(),
            entity_type: None,
            status: None,
            formation_date: None,
        }
    }

    pub fn with_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_formation_date(mut self, date: NaiveDate) -> Self {
        self.formation_date = Some(date);
        self
    }
}

/// Lookup of entity profiles by id
#[async_trait]
pub trait EntityDirectory: Send + Sync {
    /// Get an entity by id; `None` when it does not exist
    async fn get_entity(&self, id: i64) -> Result<Option<EntityProfile>>;
}
