//! Unit entity - Represents one physical inventory item tracked by serial code.
//!
//! The buyer record and the warranty sub-record are embedded as nullable column
//! groups (`buyer_*`, `warranty_*`). `warranty_registered` mirrors the presence of
//! a warranty so it can be filtered without inspecting the group.

use super::sea_orm_active_enums::{RegistrationChannel, WarrantyStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Unit database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "units")]
pub struct Model {
    /// Unique identifier for the unit
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Globally unique serial code
    #[sea_orm(unique)]
    pub serial_number: String,
    /// Display name
    pub name: String,
    /// Product type / category (e.g. "Disk")
    pub product_type: String,
    /// Capacity label from the configured set
    #[sea_orm(indexed)]
    pub capacity: String,
    /// Sales channel, lowercase, from the configured set
    #[sea_orm(indexed)]
    pub platform: Option<String>,
    /// Acquisition source (supplier)
    #[sea_orm(indexed)]
    pub source: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// When the unit was acquired
    pub acquired_at: DateTimeUtc,
    /// Buyer name
    pub buyer_name: Option<String>,
    /// Buyer phone
    pub buyer_phone: Option<String>,
    /// Buyer email
    pub buyer_email: Option<String>,
    /// Buyer postal address
    pub buyer_address: Option<String>,
    /// Buyer payment method
    pub buyer_payment_method: Option<String>,
    /// Sale date; a unit is sold iff this is set
    #[sea_orm(indexed)]
    pub sold_at: Option<DateTimeUtc>,
    /// Whether a warranty is attached
    #[sea_orm(indexed)]
    pub warranty_registered: bool,
    /// Warranty status
    pub warranty_status: Option<WarrantyStatus>,
    /// Warranty registration date
    pub warranty_registered_at: Option<DateTimeUtc>,
    /// Warranty expiry date, always registration date + duration
    pub warranty_expires_at: Option<DateTimeUtc>,
    /// Warranty duration in months
    pub warranty_duration_months: Option<i32>,
    /// Bill artifact metadata id
    pub warranty_bill_id: Option<i64>,
    /// Customer email or admin identity that registered the warranty
    pub warranty_registered_by: Option<String>,
    /// Channel the warranty was registered through
    pub warranty_channel: Option<RegistrationChannel>,
    /// Append-only note log, one entry per line
    pub warranty_notes: Option<String>,
    /// Identity of the last actor to modify the warranty
    pub warranty_modified_by: Option<String>,
    /// When the warranty was last modified
    pub warranty_modified_at: Option<DateTimeUtc>,
    /// When the unit was created
    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
    /// When the unit was last modified
    pub updated_at: DateTimeUtc,
}

/// Bill files reference units by id only, so no relation is declared
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
