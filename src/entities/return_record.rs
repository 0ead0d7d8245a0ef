//! Return record entity - Archival copy of a unit that left active inventory.
//!
//! Carries every unit column verbatim (including the embedded buyer and warranty
//! groups) plus the return metadata and a back-reference to the original unit.
//! Rows are never updated except for appending to `return_notes`.

use super::sea_orm_active_enums::{RegistrationChannel, WarrantyStatus};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Return record database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "returns")]
pub struct Model {
    /// Unique identifier for the return record
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Serial code copied from the unit (not unique here)
    #[sea_orm(indexed)]
    pub serial_number: String,
    /// Display name
    pub name: String,
    /// Product type / category
    pub product_type: String,
    /// Capacity label
    pub capacity: String,
    /// Sales channel
    pub platform: Option<String>,
    /// Acquisition source
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
    /// Sale date
    pub sold_at: Option<DateTimeUtc>,
    /// Whether a warranty was attached
    pub warranty_registered: bool,
    /// Warranty status at the time of return
    pub warranty_status: Option<WarrantyStatus>,
    /// Warranty registration date
    pub warranty_registered_at: Option<DateTimeUtc>,
    /// Warranty expiry date
    pub warranty_expires_at: Option<DateTimeUtc>,
    /// Warranty duration in months
    pub warranty_duration_months: Option<i32>,
    /// Bill artifact metadata id
    pub warranty_bill_id: Option<i64>,
    /// Registering party
    pub warranty_registered_by: Option<String>,
    /// Registration channel
    pub warranty_channel: Option<RegistrationChannel>,
    /// Warranty note log
    pub warranty_notes: Option<String>,
    /// Last warranty modifier
    pub warranty_modified_by: Option<String>,
    /// Last warranty modification time
    pub warranty_modified_at: Option<DateTimeUtc>,
    /// When the return was recorded
    #[sea_orm(indexed)]
    pub return_date: DateTimeUtc,
    /// Why the unit came back
    pub return_reason: String,
    /// Free-text notes, append-only
    pub return_notes: Option<String>,
    /// Actor who recorded the return
    #[sea_orm(indexed)]
    pub returned_by: String,
    /// Identity of the unit this record was migrated from
    #[sea_orm(unique)]
    pub original_unit_id: i64,
    /// Creation time of the original unit
    pub original_created_at: DateTimeUtc,
    /// Last update time of the original unit
    pub original_updated_at: DateTimeUtc,
}

/// Return records have no relationships; the original unit no longer exists
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
