//! Public warranty registration and status check.
//!
//! Registration stores the bill blob first, then writes the unit, the bill
//! metadata and the pending warranty in one database transaction. If the
//! transaction fails the blob is discarded again.

use crate::{
    config::AppConfig,
    core::{
        bills::{self, BillStore, BillUpload, StoredBill, UploadContext},
        unit::{find_unit_by_serial, serial_conflict},
        warranty::{self, WarrantyClaim, check_duration},
    },
    entities::{RegistrationChannel, WarrantyStatus, unit},
    errors::{Error, Result},
    models::Buyer,
};
use chrono::{DateTime, SecondsFormat, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, DatabaseTransaction, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Fields of a public registration form.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RegistrationRequest {
    /// Serial code printed on the unit
    pub serial_number: String,
    /// Where the unit was bought
    pub platform: String,
    /// Buyer name
    pub buyer_name: String,
    /// Buyer phone
    pub buyer_phone: String,
    /// Buyer email
    pub buyer_email: String,
    /// Buyer postal address
    pub buyer_address: Option<String>,
    /// Buyer payment method
    pub buyer_payment_method: Option<String>,
    /// Requested coverage; the configured default when omitted
    pub duration_months: Option<i64>,
}

/// Caller details recorded with the bill.
#[derive(Debug, Clone, Default)]
pub struct RequestOrigin {
    /// Client address
    pub client_addr: Option<String>,
    /// Client user agent
    pub user_agent: Option<String>,
}

/// What a successful registration reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationReceipt {
    /// Registration date
    pub registration_date: DateTime<Utc>,
    /// Expiry date
    pub expiry_date: DateTime<Utc>,
    /// Coverage in months
    pub duration_months: u32,
    /// Always `pending` for a new claim
    pub status: WarrantyStatus,
}

struct ValidRegistration {
    serial: String,
    platform: String,
    buyer: Buyer,
    duration_months: u32,
}

fn required(value: &str, field: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}

fn validate_request(config: &AppConfig, request: RegistrationRequest) -> Result<ValidRegistration> {
    let serial = required(&request.serial_number, "Serial number")?;
    let raw_platform = required(&request.platform, "Platform")?;
    let platform = config
        .inventory
        .normalize_platform(&raw_platform)
        .ok_or_else(|| {
            Error::validation(format!(
                "Invalid platform. Must be one of: {}",
                config.inventory.platforms.join(", ")
            ))
        })?;

    let buyer = Buyer {
        name: Some(required(&request.buyer_name, "Buyer name")?),
        phone: Some(required(&request.buyer_phone, "Buyer phone")?),
        email: Some(required(&request.buyer_email, "Buyer email")?),
        address: request.buyer_address,
        payment_method: request.buyer_payment_method,
    }
    .normalized();

    let duration_months = check_duration(
        request
            .duration_months
            .unwrap_or_else(|| i64::from(config.warranty.default_duration_months)),
        &config.warranty,
    )?;

    Ok(ValidRegistration {
        serial,
        platform,
        buyer,
        duration_months,
    })
}

/// Files a pending warranty claim for `request.serial_number`.
///
/// Unknown serials get a placeholder unit (`Product {serial}`, placeholder
/// capacity) for an admin to correct later.
///
/// # Errors
/// - `Validation` for missing fields, an unknown platform or a bad bill
/// - `InvalidDuration` for a duration outside the policy bounds
/// - `AlreadyRegistered` if the unit already carries a warranty
/// - `Conflict` if a concurrent registration created the same serial first
#[instrument(skip_all, fields(serial = %request.serial_number))]
pub async fn register_warranty(
    db: &DatabaseConnection,
    store: &dyn BillStore,
    config: &AppConfig,
    request: RegistrationRequest,
    bill: Option<BillUpload>,
    origin: RequestOrigin,
    now: DateTime<Utc>,
) -> Result<RegistrationReceipt> {
    let valid = validate_request(config, request)?;
    let bill = bill.ok_or_else(|| Error::validation("Bill file is required"))?;
    bill.validate(config.bills.max_bytes)?;

    if let Some(existing) = find_unit_by_serial(db, &valid.serial).await? {
        if existing.warranty_registered {
            return Err(Error::AlreadyRegistered {
                serial: existing.serial_number,
            });
        }
    }

    let stored = store.put(&bill).await?;
    let context = UploadContext {
        uploaded_by: valid.buyer.email.clone().unwrap_or_default(),
        channel: RegistrationChannel::PublicApi,
        client_addr: origin.client_addr,
        user_agent: origin.user_agent,
    };

    let txn = db.begin().await?;
    match file_claim(&txn, config, &valid, &stored, &context, now).await {
        Ok(unit) => {
            txn.commit().await?;
            let warranty = unit
                .warranty()
                .ok_or_else(|| Error::not_found("warranty", &unit.serial_number))?;
            info!(unit_id = unit.id, platform = %valid.platform, "Warranty registration submitted");
            Ok(RegistrationReceipt {
                registration_date: warranty.registered_at,
                expiry_date: warranty.expires_at,
                duration_months: warranty.duration_months,
                status: warranty.status,
            })
        }
        Err(e) => {
            drop(txn);
            bills::discard(store, &stored).await;
            Err(e)
        }
    }
}

async fn file_claim(
    txn: &DatabaseTransaction,
    config: &AppConfig,
    valid: &ValidRegistration,
    stored: &StoredBill,
    context: &UploadContext,
    now: DateTime<Utc>,
) -> Result<unit::Model> {
    let unit = match find_unit_by_serial(txn, &valid.serial).await? {
        Some(existing) => {
            let mut active: unit::ActiveModel = existing.into();
            valid.buyer.apply_to(&mut active);
            active.platform = Set(Some(valid.platform.clone()));
            active.sold_at = Set(Some(now));
            active.updated_at = Set(now);
            active.update(txn).await?
        }
        None => {
            let mut active = unit::ActiveModel {
                serial_number: Set(valid.serial.clone()),
                name: Set(format!("Product {}", valid.serial)),
                product_type: Set(config.inventory.product_type.clone()),
                capacity: Set(config.inventory.placeholder_capacity.clone()),
                platform: Set(Some(valid.platform.clone())),
                acquired_at: Set(now),
                sold_at: Set(Some(now)),
                warranty_registered: Set(false),
                created_at: Set(now),
                updated_at: Set(now),
                ..Default::default()
            };
            valid.buyer.apply_to(&mut active);
            active.insert(txn).await.map_err(serial_conflict(&valid.serial))?
        }
    };

    let bill = bills::record_bill(txn, unit.id, stored, context, now).await?;

    let claim = WarrantyClaim {
        registered_by: context.uploaded_by.clone(),
        channel: RegistrationChannel::PublicApi,
        duration_months: valid.duration_months,
        bill_id: Some(bill.id),
        note: Some(format!(
            "Warranty request submitted via public API on {} for platform: {}",
            now.to_rfc3339_opts(SecondsFormat::Millis, true),
            valid.platform
        )),
    };
    warranty::submit(txn, &unit, claim, now).await
}

/// Warranty block of a status check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyView {
    /// Current status, after expiry reconciliation
    pub status: WarrantyStatus,
    /// Registration date
    pub registration_date: DateTime<Utc>,
    /// Expiry date
    pub expiry_date: DateTime<Utc>,
    /// Coverage in months
    pub duration_months: u32,
    /// Whether the expiry date has passed
    pub is_expired: bool,
    /// Whole days left, rounded up; 0 once expired
    pub days_remaining: i64,
}

/// Product fields a public caller may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductView {
    /// Display name
    pub name: String,
    /// Product type
    pub product_type: String,
    /// Capacity label
    pub type_capacity: String,
    /// Serial code
    pub serial_number: String,
    /// Sales channel
    pub platform: Option<String>,
}

/// Buyer fields a public caller may see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuyerView {
    /// Buyer name
    pub name: Option<String>,
    /// Buyer email
    pub email: Option<String>,
}

/// Result of a public status check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarrantyCheck {
    /// The unit exists but has no warranty
    NotRegistered {
        /// Serial code that was checked
        serial_number: String,
    },
    /// The unit carries a warranty
    Registered {
        /// Warranty details
        warranty: WarrantyView,
        /// Product details
        product: ProductView,
        /// Buyer details
        buyer: BuyerView,
    },
}

fn days_remaining(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let seconds = (expires_at - now).num_seconds();
    if seconds <= 0 {
        0
    } else {
        (seconds + 86_399) / 86_400
    }
}

/// Reports the warranty of the unit with `serial`, persisting an overdue expiry first.
///
/// # Errors
/// Returns `NotFound` if no unit has the serial.
#[instrument(skip(db))]
pub async fn check_status(db: &DatabaseConnection, serial: &str, now: DateTime<Utc>) -> Result<WarrantyCheck> {
    let serial = serial.trim();
    let unit = find_unit_by_serial(db, serial)
        .await?
        .ok_or_else(|| Error::not_found("unit", serial))?;

    let Some(mut warranty) = unit.warranty() else {
        return Ok(WarrantyCheck::NotRegistered {
            serial_number: unit.serial_number,
        });
    };

    if warranty::reconcile_expiry(db, unit.id, now).await? {
        warranty.status = WarrantyStatus::Expired;
    }

    let is_expired = warranty.is_past_expiry(now);
    Ok(WarrantyCheck::Registered {
        warranty: WarrantyView {
            status: warranty.status,
            registration_date: warranty.registered_at,
            expiry_date: warranty.expires_at,
            duration_months: warranty.duration_months,
            is_expired,
            days_remaining: if is_expired {
                0
            } else {
                days_remaining(warranty.expires_at, now)
            },
        },
        product: ProductView {
            name: unit.name,
            product_type: unit.product_type,
            type_capacity: unit.capacity,
            serial_number: unit.serial_number,
            platform: unit.platform,
        },
        buyer: BuyerView {
            name: unit.buyer_name,
            email: unit.buyer_email,
        },
    })
}
