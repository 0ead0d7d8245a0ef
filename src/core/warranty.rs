//! Warranty state machine.
//!
//! Transitions:
//! - `pending -> active | void`
//! - `active -> expired | void`
//! - `expired -> active | void`
//!
//! A customer [`submit`] creates the warranty in `pending`; admins move it with
//! [`approve_or_set`] or write it directly with [`register_or_update`]. The only
//! transition not driven by an explicit action is the expiry flip performed by
//! [`reconcile_expiry`].

use crate::{
    config::{AppConfig, settings::WarrantyConfig},
    core::{
        bills::{self, BillStore, BillUpload, StoredBill, UploadContext},
        unit::get_unit,
    },
    entities::{BillFile, RegistrationChannel, Unit, WarrantyStatus, bill_file, unit},
    errors::{Error, Result},
    models::{Warranty, add_months},
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, QueryFilter,
    Set, TransactionTrait, sea_query::Expr,
};
use serde::Deserialize;
use tracing::{debug, info, instrument};

/// Actor recorded when no identity is supplied.
pub const SYSTEM_ACTOR: &str = "system";

/// Checks a requested duration against `(0, max]`.
///
/// # Errors
/// Returns `InvalidDuration` when out of bounds.
pub fn check_duration(months: i64, policy: &WarrantyConfig) -> Result<u32> {
    if months <= 0 || months > i64::from(policy.max_duration_months) {
        return Err(Error::InvalidDuration {
            months,
            max: policy.max_duration_months,
        });
    }
    Ok(u32::try_from(months)?)
}

fn new_warranty(
    registered_at: DateTime<Utc>,
    duration_months: u32,
    status: WarrantyStatus,
    registered_by: String,
    channel: RegistrationChannel,
) -> Result<Warranty> {
    let expires_at = add_months(registered_at, duration_months)
        .ok_or_else(|| Error::validation("Warranty expiry date is out of range"))?;
    Ok(Warranty {
        registered_at,
        expires_at,
        duration_months,
        status,
        bill_id: None,
        registered_by,
        channel,
        notes: None,
        last_modified_by: None,
        last_modified_at: None,
    })
}

fn recompute(warranty: &mut Warranty, months: u32) -> Result<()> {
    warranty
        .set_duration(months)
        .ok_or_else(|| Error::validation("Warranty expiry date is out of range"))
}

async fn save<C>(db: &C, unit: unit::Model, warranty: &Warranty, now: DateTime<Utc>) -> Result<unit::Model>
where
    C: ConnectionTrait,
{
    let mut active: unit::ActiveModel = unit.into();
    warranty.apply_to(&mut active);
    active.updated_at = Set(now);
    active.update(db).await.map_err(Into::into)
}

/// A customer's warranty claim.
#[derive(Debug, Clone)]
pub struct WarrantyClaim {
    /// Customer contact recorded as the registering party
    pub registered_by: String,
    /// Channel of the claim
    pub channel: RegistrationChannel,
    /// Already bounds-checked duration
    pub duration_months: u32,
    /// Metadata id of the proof of purchase
    pub bill_id: Option<i64>,
    /// System note describing the submission
    pub note: Option<String>,
}

/// Attaches a `pending` warranty to a unit that has none.
///
/// The write only succeeds while `warranty_registered` is still false, so two
/// concurrent submissions for the same unit cannot both win.
///
/// # Errors
/// Returns `AlreadyRegistered` if the unit carries a warranty, or gained one
/// between the read and the write.
#[instrument(skip(db, unit, claim), fields(serial = %unit.serial_number))]
pub async fn submit<C>(
    db: &C,
    unit: &unit::Model,
    claim: WarrantyClaim,
    now: DateTime<Utc>,
) -> Result<unit::Model>
where
    C: ConnectionTrait,
{
    let already = || Error::AlreadyRegistered {
        serial: unit.serial_number.clone(),
    };
    if unit.warranty_registered || unit.warranty_status.is_some() {
        return Err(already());
    }

    let mut warranty = new_warranty(
        now,
        claim.duration_months,
        WarrantyStatus::Pending,
        claim.registered_by,
        claim.channel,
    )?;
    warranty.bill_id = claim.bill_id;
    if let Some(note) = claim.note {
        warranty.append_note(&note);
    }

    let mut active = <unit::ActiveModel as Default>::default();
    warranty.apply_to(&mut active);
    active.updated_at = Set(now);

    let result = Unit::update_many()
        .set(active)
        .filter(unit::Column::Id.eq(unit.id))
        .filter(unit::Column::WarrantyRegistered.eq(false))
        .exec(db)
        .await?;
    if result.rows_affected == 0 {
        return Err(already());
    }

    info!("Warranty submitted, pending approval");
    get_unit(db, unit.id).await
}

/// Admin status change request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    /// Target status; only `active`, `expired` and `void` are accepted
    pub status: String,
    /// Corrected duration, applied when moving to `active`
    pub duration_months: Option<i64>,
    /// Note appended to the log
    pub notes: Option<String>,
}

/// Moves a unit's warranty to `active`, `expired` or `void`.
///
/// A duration supplied with `active` recomputes the expiry from the original
/// registration date. Notes are appended and the audit pair is always stamped.
///
/// # Errors
/// - `InvalidStatus` for any other status
/// - `InvalidDuration` for a duration outside `(0, max]`
/// - `NotFound` if the unit or its warranty does not exist
#[instrument(skip(db, policy, change))]
pub async fn approve_or_set(
    db: &DatabaseConnection,
    policy: &WarrantyConfig,
    unit_id: i64,
    change: StatusChange,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<unit::Model> {
    let status = WarrantyStatus::parse(&change.status)
        .filter(|s| *s != WarrantyStatus::Pending)
        .ok_or_else(|| Error::InvalidStatus {
            status: change.status.clone(),
        })?;
    let duration = change
        .duration_months
        .map(|months| check_duration(months, policy))
        .transpose()?;

    let unit = get_unit(db, unit_id).await?;
    let mut warranty = unit
        .warranty()
        .ok_or_else(|| Error::not_found("warranty", &unit.serial_number))?;

    let previous = warranty.status;
    warranty.status = status;
    if status == WarrantyStatus::Active {
        if let Some(months) = duration {
            recompute(&mut warranty, months)?;
        }
    } else if duration.is_some() {
        debug!("Duration ignored for status {}", status);
    }
    if let Some(notes) = change.notes.as_deref() {
        warranty.append_note(notes);
    }
    warranty.touch(actor, now);

    let saved = save(db, unit, &warranty, now).await?;
    info!(unit_id, %previous, %status, "Warranty status updated by {}", actor);
    Ok(saved)
}

/// Persists `active -> expired` for a unit whose warranty is past its expiry.
///
/// Returns whether a row changed; later calls are no-ops.
pub async fn reconcile_expiry<C>(db: &C, unit_id: i64, now: DateTime<Utc>) -> Result<bool>
where
    C: ConnectionTrait,
{
    let result = Unit::update_many()
        .col_expr(
            unit::Column::WarrantyStatus,
            Expr::value(WarrantyStatus::Expired),
        )
        .col_expr(unit::Column::UpdatedAt, Expr::value(now))
        .filter(unit::Column::Id.eq(unit_id))
        .filter(unit::Column::WarrantyStatus.eq(WarrantyStatus::Active))
        .filter(unit::Column::WarrantyExpiresAt.lt(now))
        .exec(db)
        .await?;

    let flipped = result.rows_affected > 0;
    if flipped {
        info!(unit_id, "Warranty expired");
    }
    Ok(flipped)
}

/// Admin warranty write.
#[derive(Debug, Clone, Default)]
pub struct AdminWarrantyInput {
    /// Duration; the configured default for new warranties, unchanged otherwise
    pub duration_months: Option<i64>,
    /// Status; `active` when omitted
    pub status: Option<WarrantyStatus>,
    /// Note appended to the log
    pub notes: Option<String>,
}

/// Creates or updates a unit's warranty on behalf of an admin, optionally with a new bill.
///
/// Updates keep the original registration date, registering party and channel.
/// The bill blob is stored before the database transaction and removed again if
/// the transaction fails.
///
/// # Errors
/// Returns `NotFound`, `InvalidDuration`, bill validation errors, or store faults.
#[instrument(skip(db, store, config, input, bill))]
pub async fn register_or_update(
    db: &DatabaseConnection,
    store: &dyn BillStore,
    config: &AppConfig,
    unit_id: i64,
    input: AdminWarrantyInput,
    bill: Option<(BillUpload, UploadContext)>,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<unit::Model> {
    let duration = input
        .duration_months
        .map(|months| check_duration(months, &config.warranty))
        .transpose()?;
    if let Some((upload, _)) = &bill {
        upload.validate(config.bills.max_bytes)?;
    }
    let unit = get_unit(db, unit_id).await?;

    let stored = match &bill {
        Some((upload, context)) => Some((store.put(upload).await?, context)),
        None => None,
    };

    let outcome = write_admin_warranty(
        db,
        &config.warranty,
        unit,
        &input,
        duration,
        stored.as_ref().map(|(s, c)| (s, *c)),
        actor,
        now,
    )
    .await;

    if outcome.is_err() {
        if let Some((stored, _)) = &stored {
            bills::discard(store, stored).await;
        }
    }
    outcome
}

#[allow(clippy::too_many_arguments)]
async fn write_admin_warranty(
    db: &DatabaseConnection,
    policy: &WarrantyConfig,
    unit: unit::Model,
    input: &AdminWarrantyInput,
    duration: Option<u32>,
    bill: Option<(&StoredBill, &UploadContext)>,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<unit::Model> {
    let status = input.status.unwrap_or(WarrantyStatus::Active);
    let txn = db.begin().await?;

    let bill_id = match bill {
        Some((stored, context)) => {
            let bill = bills::record_bill(&txn, unit.id, stored, context, now).await?;
            Some(bill.id)
        }
        None => None,
    };

    let mut warranty = match unit.warranty() {
        Some(mut existing) => {
            existing.status = status;
            let months = duration.unwrap_or(existing.duration_months);
            recompute(&mut existing, months)?;
            existing
        }
        None => new_warranty(
            now,
            duration.unwrap_or(policy.default_duration_months),
            status,
            actor.to_string(),
            RegistrationChannel::Admin,
        )?,
    };
    if bill_id.is_some() {
        warranty.bill_id = bill_id;
    }
    if let Some(notes) = input.notes.as_deref() {
        warranty.append_note(notes);
    }
    warranty.touch(actor, now);

    let unit_id = unit.id;
    let saved = save(&txn, unit, &warranty, now).await?;
    txn.commit().await?;

    info!(unit_id, %status, "Warranty registered by admin {}", actor);
    Ok(saved)
}

/// Metadata of the bill attached to a unit's warranty.
///
/// # Errors
/// Returns `NotFound` if the unit, its warranty or the bill is missing.
pub async fn bill_for_unit(db: &DatabaseConnection, unit_id: i64) -> Result<bill_file::Model> {
    let unit = get_unit(db, unit_id).await?;
    let bill_id = unit
        .warranty()
        .and_then(|w| w.bill_id)
        .ok_or_else(|| Error::not_found("bill", &unit.serial_number))?;

    BillFile::find_by_id(bill_id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("bill", bill_id))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::bills::MemoryBillStore;
    use crate::test_utils::*;
    use chrono::{Duration, TimeZone};

    fn claim() -> WarrantyClaim {
        WarrantyClaim {
            registered_by: "jane@example.com".into(),
            channel: RegistrationChannel::PublicApi,
            duration_months: 12,
            bill_id: None,
            note: Some("submitted".into()),
        }
    }

    fn change(status: &str, duration: Option<i64>) -> StatusChange {
        StatusChange {
            status: status.into(),
            duration_months: duration,
            notes: None,
        }
    }

    #[test]
    fn test_check_duration_bounds() {
        let policy = WarrantyConfig::default();
        assert!(matches!(
            check_duration(0, &policy),
            Err(Error::InvalidDuration { months: 0, .. })
        ));
        assert!(matches!(
            check_duration(-3, &policy),
            Err(Error::InvalidDuration { .. })
        ));
        assert!(matches!(
            check_duration(61, &policy),
            Err(Error::InvalidDuration { months: 61, max: 60 })
        ));
        assert_eq!(check_duration(1, &policy).unwrap(), 1);
        assert_eq!(check_duration(60, &policy).unwrap(), 60);
    }

    #[tokio::test]
    async fn test_submit_creates_pending_warranty() -> Result<()> {
        let db = setup_test_db().await?;
        let unit = create_test_unit(&db, "SN-100").await?;
        let now = fixed_now();

        let updated = submit(&db, &unit, claim(), now).await?;
        let warranty = updated.warranty().unwrap();

        assert!(updated.warranty_registered);
        assert_eq!(warranty.status, WarrantyStatus::Pending);
        assert_eq!(warranty.duration_months, 12);
        assert_eq!(warranty.registered_at, now);
        assert_eq!(warranty.expires_at, add_months(now, 12).unwrap());
        assert_eq!(warranty.notes.as_deref(), Some("submitted"));
        Ok(())
    }

    #[tokio::test]
    async fn test_submit_twice_is_rejected() -> Result<()> {
        let db = setup_test_db().await?;
        let unit = create_test_unit(&db, "SN-100").await?;

        let first = submit(&db, &unit, claim(), fixed_now()).await?;
        let again = submit(&db, &first, claim(), fixed_now()).await;
        assert!(matches!(again, Err(Error::AlreadyRegistered { .. })));

        // A stale snapshot still loses the compare-and-set.
        let stale = submit(&db, &unit, claim(), fixed_now()).await;
        assert!(matches!(stale, Err(Error::AlreadyRegistered { .. })));

        let reloaded = get_unit(&db, unit.id).await?;
        assert_eq!(reloaded.warranty(), first.warranty());
        Ok(())
    }

    #[tokio::test]
    async fn test_approve_or_set_rejects_invalid_input() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = WarrantyConfig::default();
        let unit = create_unit_with_pending_warranty(&db, "SN-INV").await?;

        for status in ["pending", "revoked", ""] {
            let result =
                approve_or_set(&db, &policy, unit.id, change(status, None), "admin", fixed_now()).await;
            assert!(matches!(result, Err(Error::InvalidStatus { .. })));
        }
        for months in [0, 61] {
            let result =
                approve_or_set(&db, &policy, unit.id, change("active", Some(months)), "admin", fixed_now()).await;
            assert!(matches!(result, Err(Error::InvalidDuration { .. })));
        }

        let reloaded = get_unit(&db, unit.id).await?;
        assert_eq!(reloaded.warranty(), unit.warranty());
        Ok(())
    }

    #[tokio::test]
    async fn test_approve_recomputes_from_original_registration() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = WarrantyConfig::default();
        let unit = create_test_unit(&db, "SN-100").await?;
        let unit = submit(&db, &unit, claim(), fixed_now()).await?;
        let registered_at = unit.warranty().unwrap().registered_at;

        let later = registered_at + Duration::days(40);
        let approved = approve_or_set(
            &db,
            &policy,
            unit.id,
            StatusChange {
                status: "Active".into(),
                duration_months: Some(24),
                notes: Some("bill verified".into()),
            },
            "admin@example.com",
            later,
        )
        .await?;

        let warranty = approved.warranty().unwrap();
        assert_eq!(warranty.status, WarrantyStatus::Active);
        assert_eq!(warranty.registered_at, registered_at);
        assert_eq!(warranty.duration_months, 24);
        assert_eq!(warranty.expires_at, add_months(registered_at, 24).unwrap());
        assert_eq!(warranty.last_modified_by.as_deref(), Some("admin@example.com"));
        assert_eq!(warranty.last_modified_at, Some(later));
        assert_eq!(warranty.notes.as_deref(), Some("submitted\nbill verified"));
        Ok(())
    }

    #[tokio::test]
    async fn test_void_ignores_duration() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = WarrantyConfig::default();
        let unit = create_unit_with_pending_warranty(&db, "SN-V").await?;

        let voided = approve_or_set(&db, &policy, unit.id, change("void", Some(6)), "admin", fixed_now()).await?;
        let warranty = voided.warranty().unwrap();
        assert_eq!(warranty.status, WarrantyStatus::Void);
        assert_eq!(warranty.duration_months, 12);
        Ok(())
    }

    #[tokio::test]
    async fn test_approve_without_warranty_is_not_found() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = WarrantyConfig::default();
        let unit = create_test_unit(&db, "SN-NONE").await?;

        let result = approve_or_set(&db, &policy, unit.id, change("active", None), "admin", fixed_now()).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "warranty", .. })));

        let result = approve_or_set(&db, &policy, 424_242, change("active", None), "admin", fixed_now()).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "unit", .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_reconcile_expiry_converges() -> Result<()> {
        let db = setup_test_db().await?;
        let policy = WarrantyConfig::default();
        let unit = create_unit_with_pending_warranty(&db, "SN-EXP").await?;
        approve_or_set(&db, &policy, unit.id, change("active", None), "admin", fixed_now()).await?;

        let before_expiry = fixed_now() + Duration::days(30);
        assert!(!reconcile_expiry(&db, unit.id, before_expiry).await?);

        let after_expiry = fixed_now() + Duration::days(400);
        assert!(reconcile_expiry(&db, unit.id, after_expiry).await?);
        assert!(!reconcile_expiry(&db, unit.id, after_expiry).await?);

        let reloaded = get_unit(&db, unit.id).await?;
        assert_eq!(reloaded.warranty_status, Some(WarrantyStatus::Expired));
        Ok(())
    }

    #[tokio::test]
    async fn test_reconcile_leaves_pending_alone() -> Result<()> {
        let db = setup_test_db().await?;
        let unit = create_unit_with_pending_warranty(&db, "SN-PEND").await?;
        let far_future = Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap();

        assert!(!reconcile_expiry(&db, unit.id, far_future).await?);
        let reloaded = get_unit(&db, unit.id).await?;
        assert_eq!(reloaded.warranty_status, Some(WarrantyStatus::Pending));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_register_creates_active_warranty_with_bill() -> Result<()> {
        let db = setup_test_db().await?;
        let config = test_config();
        let store = MemoryBillStore::new();
        let unit = create_test_unit(&db, "SN-ADM").await?;

        let saved = register_or_update(
            &db,
            &store,
            &config,
            unit.id,
            AdminWarrantyInput {
                duration_months: Some(18),
                status: None,
                notes: Some("walk-in".into()),
            },
            Some((test_bill(), admin_upload_context("admin@example.com"))),
            "admin@example.com",
            fixed_now(),
        )
        .await?;

        let warranty = saved.warranty().unwrap();
        assert_eq!(warranty.status, WarrantyStatus::Active);
        assert_eq!(warranty.channel, RegistrationChannel::Admin);
        assert_eq!(warranty.registered_by, "admin@example.com");
        assert_eq!(warranty.duration_months, 18);
        assert_eq!(warranty.expires_at, add_months(fixed_now(), 18).unwrap());

        let bill = bill_for_unit(&db, unit.id).await?;
        assert_eq!(Some(bill.id), warranty.bill_id);
        assert_eq!(bill.channel, RegistrationChannel::Admin);
        assert_eq!(store.len().await, 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_update_keeps_origin_and_bill() -> Result<()> {
        let db = setup_test_db().await?;
        let config = test_config();
        let store = MemoryBillStore::new();
        let unit = create_unit_with_pending_warranty(&db, "SN-UPD").await?;
        let original = unit.warranty().unwrap();

        let later = fixed_now() + Duration::days(3);
        let saved = register_or_update(
            &db,
            &store,
            &config,
            unit.id,
            AdminWarrantyInput {
                duration_months: Some(36),
                status: Some(WarrantyStatus::Active),
                notes: None,
            },
            None,
            "admin@example.com",
            later,
        )
        .await?;

        let warranty = saved.warranty().unwrap();
        assert_eq!(warranty.registered_at, original.registered_at);
        assert_eq!(warranty.registered_by, original.registered_by);
        assert_eq!(warranty.channel, original.channel);
        assert_eq!(warranty.bill_id, original.bill_id);
        assert_eq!(warranty.expires_at, add_months(original.registered_at, 36).unwrap());
        assert_eq!(warranty.last_modified_at, Some(later));
        Ok(())
    }

    #[tokio::test]
    async fn test_admin_register_rejects_before_storing() -> Result<()> {
        let db = setup_test_db().await?;
        let config = test_config();
        let store = MemoryBillStore::new();
        let unit = create_test_unit(&db, "SN-BAD").await?;

        let result = register_or_update(
            &db,
            &store,
            &config,
            unit.id,
            AdminWarrantyInput {
                duration_months: Some(99),
                ..Default::default()
            },
            Some((test_bill(), admin_upload_context("admin"))),
            "admin",
            fixed_now(),
        )
        .await;
        assert!(matches!(result, Err(Error::InvalidDuration { .. })));

        let result = register_or_update(
            &db,
            &store,
            &config,
            9999,
            AdminWarrantyInput::default(),
            Some((test_bill(), admin_upload_context("admin"))),
            "admin",
            fixed_now(),
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert!(store.is_empty().await);
        Ok(())
    }

    #[tokio::test]
    async fn test_bill_for_unit_without_bill() -> Result<()> {
        let db = setup_test_db().await?;
        let unit = create_test_unit(&db, "SN-NB").await?;
        let result = bill_for_unit(&db, unit.id).await;
        assert!(matches!(result, Err(Error::NotFound { entity: "bill", .. })));
        Ok(())
    }
}
