//! Rate limit entity - Persistent fixed-window counters keyed by caller.
//! Shared by every process pointed at the same database.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Rate limit counter database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rate_limits")]
pub struct Model {
    /// Unique identifier
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Counter key (e.g. `"warranty:203.0.113.7"`)
    #[sea_orm(unique)]
    pub key: String,
    /// Attempts seen in the current window
    pub hits: i32,
    /// Start of the current window
    #[sea_orm(indexed)]
    pub window_start: DateTimeUtc,
}

/// `RateLimit` has no relationships with other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
