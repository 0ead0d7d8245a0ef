//! Return archive: moving units out of active inventory and browsing the archive.

use crate::{
    core::{
        query::{DateRange, Page, PageRequest, filter_value},
        unit::get_unit,
        warranty::SYSTEM_ACTOR,
    },
    entities::{ReturnRecord, Unit, return_record, unit},
    errors::{Error, Result},
};
use chrono::{DateTime, Datelike, NaiveTime, SecondsFormat, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

/// Default page size for return listings.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Admin request to mark a unit as returned.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReturnRequest {
    /// Why the unit came back, required
    pub return_reason: String,
    /// Free-text notes
    pub return_notes: Option<String>,
}

fn archive_copy(unit: unit::Model, reason: String, notes: Option<String>, actor: &str, now: DateTime<Utc>) -> return_record::ActiveModel {
    return_record::ActiveModel {
        serial_number: Set(unit.serial_number),
        name: Set(unit.name),
        product_type: Set(unit.product_type),
        capacity: Set(unit.capacity),
        platform: Set(unit.platform),
        source: Set(unit.source),
        description: Set(unit.description),
        acquired_at: Set(unit.acquired_at),
        buyer_name: Set(unit.buyer_name),
        buyer_phone: Set(unit.buyer_phone),
        buyer_email: Set(unit.buyer_email),
        buyer_address: Set(unit.buyer_address),
        buyer_payment_method: Set(unit.buyer_payment_method),
        sold_at: Set(unit.sold_at),
        warranty_registered: Set(unit.warranty_registered),
        warranty_status: Set(unit.warranty_status),
        warranty_registered_at: Set(unit.warranty_registered_at),
        warranty_expires_at: Set(unit.warranty_expires_at),
        warranty_duration_months: Set(unit.warranty_duration_months),
        warranty_bill_id: Set(unit.warranty_bill_id),
        warranty_registered_by: Set(unit.warranty_registered_by),
        warranty_channel: Set(unit.warranty_channel),
        warranty_notes: Set(unit.warranty_notes),
        warranty_modified_by: Set(unit.warranty_modified_by),
        warranty_modified_at: Set(unit.warranty_modified_at),
        return_date: Set(now),
        return_reason: Set(reason),
        return_notes: Set(notes),
        returned_by: Set(actor.to_string()),
        original_unit_id: Set(unit.id),
        original_created_at: Set(unit.created_at),
        original_updated_at: Set(unit.updated_at),
        ..Default::default()
    }
}

/// Moves a unit into the return archive.
///
/// The archive insert and the unit delete run in one transaction, so either both
/// happen or neither does. `original_unit_id` is unique in the archive, so a
/// replay can never produce a second record; after a successful move the unit is
/// gone and a replay reports `NotFound`.
///
/// # Errors
/// Returns `Validation` without a reason, `NotFound` for an unknown unit, or a
/// store fault if either write fails.
#[instrument(skip(db, request))]
pub async fn mark_as_return(
    db: &DatabaseConnection,
    unit_id: i64,
    request: ReturnRequest,
    actor: Option<&str>,
    now: DateTime<Utc>,
) -> Result<return_record::Model> {
    let reason = request.return_reason.trim().to_string();
    if reason.is_empty() {
        return Err(Error::validation("Return reason is required"));
    }
    let notes = request
        .return_notes
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty());
    let actor = actor.map(str::trim).filter(|a| !a.is_empty()).unwrap_or(SYSTEM_ACTOR);

    let txn = db.begin().await?;
    let unit = get_unit(&txn, unit_id).await?;
    let serial = unit.serial_number.clone();

    let record = archive_copy(unit, reason, notes, actor, now).insert(&txn).await?;
    let deleted = Unit::delete_by_id(unit_id).exec(&txn).await?;
    if deleted.rows_affected != 1 {
        return Err(Error::not_found("unit", unit_id));
    }
    txn.commit().await?;

    info!(return_id = record.id, unit_id, "Unit {} moved to returns by {}", serial, actor);
    Ok(record)
}

/// Retrieves an archived return by id.
pub async fn get_return(db: &DatabaseConnection, id: i64) -> Result<return_record::Model> {
    ReturnRecord::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("return", id))
}

/// Appends a timestamped line to a return's notes.
///
/// # Errors
/// Returns `Validation` for an empty note and `NotFound` for an unknown id.
pub async fn append_return_note(
    db: &DatabaseConnection,
    id: i64,
    note: &str,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<return_record::Model> {
    let note = note.trim();
    if note.is_empty() {
        return Err(Error::validation("Note is required"));
    }
    let record = get_return(db, id).await?;
    let line = format!(
        "[{} {}] {}",
        now.to_rfc3339_opts(SecondsFormat::Secs, true),
        actor,
        note
    );
    let notes = match record.return_notes.as_deref() {
        Some(existing) if !existing.is_empty() => format!("{existing}\n{line}"),
        _ => line,
    };

    let mut active: return_record::ActiveModel = record.into();
    active.return_notes = Set(Some(notes));
    active.update(db).await.map_err(Into::into)
}

/// Filters for [`list_returns`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnQuery {
    /// Substring over serial, name, description, buyer name and email
    pub search: Option<String>,
    /// Exact capacity label
    pub capacity: Option<String>,
    /// Sales channel
    pub platform: Option<String>,
    /// Exact acquisition source
    pub source: Option<String>,
    /// Substring of the return reason
    pub reason: Option<String>,
    /// Window on the return date
    pub date_range: Option<String>,
    /// 1-based page
    pub page: Option<u64>,
    /// Page size
    pub limit: Option<u64>,
}

/// A page of returns plus the figures shown alongside it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReturnListing {
    /// Matching returns, newest first
    pub returns: Page<return_record::Model>,
    /// Returns recorded since the first of the current month
    pub returns_this_month: u64,
    /// Distinct sources across the archive
    pub sources: Vec<String>,
    /// Distinct reasons across the archive
    pub reasons: Vec<String>,
}

/// Lists archived returns with filters and pagination.
#[instrument(skip(db))]
pub async fn list_returns(db: &DatabaseConnection, query: &ReturnQuery, now: DateTime<Utc>) -> Result<ReturnListing> {
    let request = PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE);
    let mut select = ReturnRecord::find();

    if let Some(term) = filter_value(query.search.as_deref()) {
        select = select.filter(
            Condition::any()
                .add(return_record::Column::SerialNumber.contains(term.as_str()))
                .add(return_record::Column::Name.contains(term.as_str()))
                .add(return_record::Column::Description.contains(term.as_str()))
                .add(return_record::Column::BuyerName.contains(term.as_str()))
                .add(return_record::Column::BuyerEmail.contains(term.as_str())),
        );
    }
    if let Some(capacity) = filter_value(query.capacity.as_deref()) {
        select = select.filter(return_record::Column::Capacity.eq(capacity));
    }
    if let Some(platform) = filter_value(query.platform.as_deref()) {
        select = select.filter(return_record::Column::Platform.eq(platform.to_lowercase()));
    }
    if let Some(source) = filter_value(query.source.as_deref()) {
        select = select.filter(return_record::Column::Source.eq(source));
    }
    if let Some(reason) = filter_value(query.reason.as_deref()) {
        select = select.filter(return_record::Column::ReturnReason.contains(reason.as_str()));
    }
    let range = query.date_range.as_deref().map_or(DateRange::All, DateRange::parse);
    if let Some(since) = range.since(now) {
        select = select.filter(return_record::Column::ReturnDate.gte(since));
    }

    let paginator = select
        .order_by_desc(return_record::Column::ReturnDate)
        .order_by_desc(return_record::Column::Id)
        .paginate(db, request.limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(request.index()).await?;

    let month_start = now
        .date_naive()
        .with_day(1)
        .unwrap_or_else(|| now.date_naive())
        .and_time(NaiveTime::MIN)
        .and_utc();
    let returns_this_month = ReturnRecord::find()
        .filter(return_record::Column::ReturnDate.gte(month_start))
        .count(db)
        .await?;

    Ok(ReturnListing {
        returns: Page::new(items, request.page, request.limit, total),
        returns_this_month,
        sources: distinct(db, return_record::Column::Source).await?,
        reasons: distinct(db, return_record::Column::ReturnReason).await?,
    })
}

async fn distinct(db: &DatabaseConnection, column: return_record::Column) -> Result<Vec<String>> {
    ReturnRecord::find()
        .select_only()
        .column(column)
        .distinct()
        .filter(column.is_not_null())
        .filter(column.ne(""))
        .order_by_asc(column)
        .into_tuple::<String>()
        .all(db)
        .await
        .map_err(Into::into)
}
