//! Inquiry entity - Customer-submitted contact and support messages.
//!
//! `serial_number` is a soft cross-reference: the unit may not exist, or may
//! since have been archived as a return.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Inquiry database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "inquiries")]
pub struct Model {
    /// Unique identifier for the inquiry
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Contact name
    pub name: String,
    /// Contact email, lowercase
    pub email: String,
    /// Subject line as submitted
    pub subject: String,
    /// Message body
    pub description: String,
    /// Optional serial the inquiry refers to
    #[sea_orm(indexed)]
    pub serial_number: Option<String>,
    /// Category derived from the subject (e.g. `"warranty-claim"`)
    pub inquiry_type: String,
    /// Where the inquiry came from (e.g. `"contact-form"`)
    pub source: String,
    /// Whether an admin marked it resolved
    pub is_resolved: bool,
    /// Admin who resolved it
    pub resolved_by: Option<String>,
    /// When it was resolved
    pub resolved_at: Option<DateTimeUtc>,
    /// Internal admin notes
    pub admin_notes: Option<String>,
    /// When the inquiry was submitted
    #[sea_orm(indexed)]
    pub created_at: DateTimeUtc,
    /// When the inquiry was last modified
    pub updated_at: DateTimeUtc,
}

/// Inquiries have no hard relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
