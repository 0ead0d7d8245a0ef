//! Bill file entity - Metadata for uploaded proof-of-purchase artifacts.
//!
//! The bytes live in the external bill store; only the identifier, content type,
//! size and storage locator are kept here.

use super::sea_orm_active_enums::RegistrationChannel;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Bill file database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bill_files")]
pub struct Model {
    /// Unique identifier for the metadata row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Name the store assigned to the artifact
    pub stored_name: String,
    /// Name the uploader gave the file
    pub original_name: String,
    /// MIME type
    pub content_type: String,
    /// Size in bytes
    pub size_bytes: i64,
    /// Storage locator inside the bill store (never shown publicly)
    pub locator: String,
    /// Artifact kind, `"warranty_bill"` for registrations
    pub kind: String,
    /// Customer email or admin identity
    pub uploaded_by: String,
    /// Unit the bill belongs to
    #[sea_orm(indexed)]
    pub unit_id: i64,
    /// Channel the upload came through
    pub channel: RegistrationChannel,
    /// Caller address, when known
    pub client_addr: Option<String>,
    /// Caller user agent, when known
    pub user_agent: Option<String>,
    /// Upload time
    pub uploaded_at: DateTimeUtc,
}

/// No foreign key to units: bill history outlives units archived as returns
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
