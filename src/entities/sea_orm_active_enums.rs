//! Enumerated column types shared by units and archived returns.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a unit's warranty.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum WarrantyStatus {
    /// Submitted by a customer, awaiting admin approval
    #[sea_orm(string_value = "pending")]
    Pending,
    /// Coverage in effect until the expiry date
    #[sea_orm(string_value = "active")]
    Active,
    /// Coverage window has passed
    #[sea_orm(string_value = "expired")]
    Expired,
    /// Cancelled by an admin
    #[sea_orm(string_value = "void")]
    Void,
}

impl WarrantyStatus {
    /// Lowercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Expired => "expired",
            Self::Void => "void",
        }
    }

    /// Parses a wire name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "expired" => Some(Self::Expired),
            "void" => Some(Self::Void),
            _ => None,
        }
    }
}

impl fmt::Display for WarrantyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel through which a warranty or bill entered the system.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum RegistrationChannel {
    /// Public registration endpoint
    #[sea_orm(string_value = "public-api")]
    #[serde(rename = "public-api")]
    PublicApi,
    /// Authenticated admin action
    #[sea_orm(string_value = "admin")]
    #[serde(rename = "admin")]
    Admin,
}

impl RegistrationChannel {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PublicApi => "public-api",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for RegistrationChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
