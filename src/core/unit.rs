//! Unit record store operations.
//!
//! Admin-side create, update, lookup and listing of inventory units. Warranty
//! columns are never written here; see [`crate::core::warranty`].

use crate::{
    config::settings::InventoryConfig,
    core::query::{Page, PageRequest, filter_value},
    entities::{Unit, WarrantyStatus, unit},
    errors::{Error, Result},
    models::Buyer,
};
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

/// Default page size for unit listings.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Admin input for creating or replacing a unit's descriptive fields.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct UnitInput {
    /// Serial code, required
    pub serial_number: String,
    /// Display name, required
    pub name: String,
    /// Category; the configured product type when omitted
    pub product_type: Option<String>,
    /// Capacity label, must be one of the configured values
    pub capacity: String,
    /// Sales channel, required once `sold_at` is set or a warranty exists
    pub platform: Option<String>,
    /// Acquisition source
    pub source: Option<String>,
    /// Free-text description
    pub description: Option<String>,
    /// Acquisition date; now when omitted
    pub acquired_at: Option<DateTime<Utc>>,
    /// Buyer details
    pub buyer: Buyer,
    /// Sale date
    pub sold_at: Option<DateTime<Utc>>,
}

struct ValidUnit {
    serial_number: String,
    name: String,
    product_type: String,
    capacity: String,
    platform: Option<String>,
    source: Option<String>,
    description: Option<String>,
    acquired_at: Option<DateTime<Utc>>,
    buyer: Buyer,
    sold_at: Option<DateTime<Utc>>,
}

fn trimmed(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn validate_unit(
    inventory: &InventoryConfig,
    input: UnitInput,
    warranty_registered: bool,
) -> Result<ValidUnit> {
    let serial_number = input.serial_number.trim().to_string();
    if serial_number.is_empty() {
        return Err(Error::validation("Serial number is required"));
    }
    let name = input.name.trim().to_string();
    if name.is_empty() {
        return Err(Error::validation("Name is required"));
    }

    let capacity = input.capacity.trim().to_string();
    if !inventory.is_known_capacity(&capacity) {
        return Err(Error::validation(format!(
            "Invalid capacity '{capacity}'. Must be one of: {}",
            inventory.capacities.join(", ")
        )));
    }

    let platform = match trimmed(input.platform) {
        Some(raw) => Some(inventory.normalize_platform(&raw).ok_or_else(|| {
            Error::validation(format!(
                "Invalid platform '{raw}'. Must be one of: {}",
                inventory.platforms.join(", ")
            ))
        })?),
        None => None,
    };
    if (input.sold_at.is_some() || warranty_registered) && platform.is_none() {
        return Err(Error::validation(
            "Platform is required for sold or warranty-registered units",
        ));
    }

    Ok(ValidUnit {
        serial_number,
        name,
        product_type: trimmed(input.product_type)
            .unwrap_or_else(|| inventory.product_type.clone()),
        capacity,
        platform,
        source: trimmed(input.source),
        description: trimmed(input.description),
        acquired_at: input.acquired_at,
        buyer: input.buyer.normalized(),
        sold_at: input.sold_at,
    })
}

impl ValidUnit {
    fn apply_to(self, active: &mut unit::ActiveModel) {
        self.buyer.apply_to(active);
        active.serial_number = Set(self.serial_number);
        active.name = Set(self.name);
        active.product_type = Set(self.product_type);
        active.capacity = Set(self.capacity);
        active.platform = Set(self.platform);
        active.source = Set(self.source);
        active.description = Set(self.description);
        active.sold_at = Set(self.sold_at);
        if let Some(acquired_at) = self.acquired_at {
            active.acquired_at = Set(acquired_at);
        }
    }
}

/// Rewrites a unique violation as a conflict on `serial`.
pub(crate) fn serial_conflict(serial: &str) -> impl FnOnce(DbErr) -> Error + '_ {
    move |err| match Error::from(err) {
        Error::Conflict { .. } => Error::Conflict {
            serial: serial.to_string(),
        },
        other => other,
    }
}

/// Creates a new unit.
///
/// # Errors
/// Returns `Validation` for missing fields or unknown capacity/platform values,
/// and `Conflict` if the serial already exists.
#[instrument(skip(db, inventory, input), fields(serial = %input.serial_number))]
pub async fn create_unit(
    db: &DatabaseConnection,
    inventory: &InventoryConfig,
    input: UnitInput,
    now: DateTime<Utc>,
) -> Result<unit::Model> {
    let valid = validate_unit(inventory, input, false)?;
    let serial = valid.serial_number.clone();

    let mut active = unit::ActiveModel {
        acquired_at: Set(now),
        warranty_registered: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    };
    valid.apply_to(&mut active);

    let model = active.insert(db).await.map_err(serial_conflict(&serial))?;
    info!(unit_id = model.id, "Created unit {}", model.serial_number);
    Ok(model)
}

/// Replaces a unit's descriptive, buyer and sale fields. Warranty data is kept.
///
/// # Errors
/// Returns `NotFound` for an unknown id plus the errors of [`create_unit`].
#[instrument(skip(db, inventory, input))]
pub async fn update_unit(
    db: &DatabaseConnection,
    inventory: &InventoryConfig,
    id: i64,
    input: UnitInput,
    now: DateTime<Utc>,
) -> Result<unit::Model> {
    let existing = get_unit(db, id).await?;
    let valid = validate_unit(inventory, input, existing.warranty_registered)?;
    let serial = valid.serial_number.clone();

    let mut active: unit::ActiveModel = existing.into();
    valid.apply_to(&mut active);
    active.updated_at = Set(now);

    let model = active.update(db).await.map_err(serial_conflict(&serial))?;
    info!(unit_id = model.id, "Updated unit {}", model.serial_number);
    Ok(model)
}

/// Retrieves a unit by id.
pub async fn get_unit<C>(db: &C, id: i64) -> Result<unit::Model>
where
    C: ConnectionTrait,
{
    Unit::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("unit", id))
}

/// Looks up a unit by exact serial code.
pub async fn find_unit_by_serial<C>(db: &C, serial: &str) -> Result<Option<unit::Model>>
where
    C: ConnectionTrait,
{
    Unit::find()
        .filter(unit::Column::SerialNumber.eq(serial.trim()))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Filters for [`list_units`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitQuery {
    /// Substring over serial, name, description, buyer name and buyer email
    pub search: Option<String>,
    /// Exact capacity label
    pub capacity: Option<String>,
    /// Sales channel, case-insensitive
    pub platform: Option<String>,
    /// Substring over buyer name, email and phone
    pub buyer: Option<String>,
    /// 1-based page
    pub page: Option<u64>,
    /// Page size
    pub limit: Option<u64>,
}

/// Lists units newest first with search, filters and pagination.
#[instrument(skip(db))]
pub async fn list_units(db: &DatabaseConnection, query: &UnitQuery) -> Result<Page<unit::Model>> {
    let request = PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE);
    let mut select = Unit::find();

    if let Some(term) = filter_value(query.search.as_deref()) {
        select = select.filter(
            Condition::any()
                .add(unit::Column::SerialNumber.contains(term.as_str()))
                .add(unit::Column::Name.contains(term.as_str()))
                .add(unit::Column::Description.contains(term.as_str()))
                .add(unit::Column::BuyerName.contains(term.as_str()))
                .add(unit::Column::BuyerEmail.contains(term.as_str())),
        );
    }
    if let Some(capacity) = filter_value(query.capacity.as_deref()) {
        select = select.filter(unit::Column::Capacity.eq(capacity));
    }
    if let Some(platform) = filter_value(query.platform.as_deref()) {
        select = select.filter(unit::Column::Platform.eq(platform.to_lowercase()));
    }
    if let Some(buyer) = filter_value(query.buyer.as_deref()) {
        select = select.filter(
            Condition::any()
                .add(unit::Column::BuyerName.contains(buyer.as_str()))
                .add(unit::Column::BuyerEmail.contains(buyer.as_str()))
                .add(unit::Column::BuyerPhone.contains(buyer.as_str())),
        );
    }

    let paginator = select
        .order_by_desc(unit::Column::CreatedAt)
        .order_by_desc(unit::Column::Id)
        .paginate(db, request.limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(request.index()).await?;
    debug!(total, page = request.page, "Listed units");

    Ok(Page::new(items, request.page, request.limit, total))
}

/// Units carrying a warranty, for the admin review queue.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyRequests {
    /// Matching units, newest registration first
    pub units: Vec<unit::Model>,
    /// Pending warranties across all units, regardless of the filter
    pub pending_count: u64,
}

/// Lists units with a registered warranty, optionally restricted to one status.
pub async fn warranty_requests(
    db: &DatabaseConnection,
    status: Option<WarrantyStatus>,
) -> Result<WarrantyRequests> {
    let mut select = Unit::find().filter(unit::Column::WarrantyRegistered.eq(true));
    if let Some(status) = status {
        select = select.filter(unit::Column::WarrantyStatus.eq(status));
    }
    let units = select
        .order_by_desc(unit::Column::WarrantyRegisteredAt)
        .all(db)
        .await?;

    let pending_count = Unit::find()
        .filter(unit::Column::WarrantyStatus.eq(WarrantyStatus::Pending))
        .count(db)
        .await?;

    Ok(WarrantyRequests {
        units,
        pending_count,
    })
}

/// Distinct non-empty acquisition sources, sorted.
pub async fn distinct_sources(db: &DatabaseConnection) -> Result<Vec<String>> {
    Unit::find()
        .select_only()
        .column(unit::Column::Source)
        .distinct()
        .filter(unit::Column::Source.is_not_null())
        .filter(unit::Column::Source.ne(""))
        .order_by_asc(unit::Column::Source)
        .into_tuple::<String>()
        .all(db)
        .await
        .map_err(Into::into)
}
