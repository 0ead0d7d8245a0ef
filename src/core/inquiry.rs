//! Inquiry store: customer contact messages and their admin handling.

use crate::{
    core::query::{Page, PageRequest, filter_value},
    entities::{Inquiry, Unit, WarrantyStatus, inquiry, unit},
    errors::{Error, Result},
};
use chrono::{DateTime, Utc};
use regex::Regex;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set,
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, sync::LazyLock};
use tracing::{info, instrument};

/// Default page size for inquiry listings.
pub const DEFAULT_PAGE_SIZE: u64 = 20;

/// Source recorded for inquiries from the public form.
pub const CONTACT_FORM_SOURCE: &str = "contact-form";

const INQUIRY_TYPES: [&str; 5] = [
    "technical-support",
    "warranty-claim",
    "bulk-order",
    "general-inquiry",
    "partnership",
];

/// Public contact form submission.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewInquiry {
    /// Contact name
    pub name: String,
    /// Contact email
    pub email: String,
    /// Subject, one of the inquiry types
    pub subject: String,
    /// Message body
    pub description: String,
    /// Serial the message is about
    #[serde(alias = "productSerialNumber")]
    pub serial_number: Option<String>,
}

static EMAIL_SHAPE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").ok());

/// Loose `local@domain.tld` shape check.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_SHAPE.as_ref().is_some_and(|re| re.is_match(email))
}

/// Maps a subject to its inquiry type, `general-inquiry` when unknown.
#[must_use]
pub fn inquiry_type_for(subject: &str) -> &'static str {
    let wanted = subject.trim().to_lowercase().replace([' ', '_'], "-");
    INQUIRY_TYPES
        .iter()
        .find(|t| **t == wanted)
        .copied()
        .unwrap_or("general-inquiry")
}

/// Stores a contact form submission.
///
/// # Errors
/// Returns `Validation` for a missing field or a malformed email.
#[instrument(skip_all)]
pub async fn create_inquiry(db: &DatabaseConnection, input: NewInquiry, now: DateTime<Utc>) -> Result<inquiry::Model> {
    let name = input.name.trim();
    let email = input.email.trim().to_lowercase();
    let subject = input.subject.trim();
    let description = input.description.trim();
    if name.is_empty() || email.is_empty() || subject.is_empty() || description.is_empty() {
        return Err(Error::validation("Please fill in all required fields"));
    }
    if !is_valid_email(&email) {
        return Err(Error::validation("Please provide a valid email address"));
    }
    let serial_number = input
        .serial_number
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let model = inquiry::ActiveModel {
        name: Set(name.to_string()),
        email: Set(email),
        subject: Set(subject.to_string()),
        description: Set(description.to_string()),
        serial_number: Set(serial_number),
        inquiry_type: Set(inquiry_type_for(subject).to_string()),
        source: Set(CONTACT_FORM_SOURCE.to_string()),
        is_resolved: Set(false),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(inquiry_id = model.id, kind = %model.inquiry_type, "Inquiry received");
    Ok(model)
}

/// Active unit summary shown next to an inquiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitSummary {
    /// Unit id
    pub id: i64,
    /// Serial code
    pub serial_number: String,
    /// Display name
    pub name: String,
    /// Capacity label
    pub capacity: String,
    /// Sales channel
    pub platform: Option<String>,
    /// Warranty status, if any
    pub warranty_status: Option<WarrantyStatus>,
}

impl From<unit::Model> for UnitSummary {
    fn from(unit: unit::Model) -> Self {
        Self {
            id: unit.id,
            serial_number: unit.serial_number,
            name: unit.name,
            capacity: unit.capacity,
            platform: unit.platform,
            warranty_status: unit.warranty_status,
        }
    }
}

/// Inquiry with the unit its serial resolves to.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryEntry {
    /// The inquiry
    #[serde(flatten)]
    pub inquiry: inquiry::Model,
    /// Matching active unit
    pub unit: Option<UnitSummary>,
}

/// Filters for [`list_inquiries`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryQuery {
    /// Substring over name, description and serial
    pub search: Option<String>,
    /// 1-based page
    pub page: Option<u64>,
    /// Page size
    pub limit: Option<u64>,
}

/// Lists inquiries newest first, annotated with their active units.
pub async fn list_inquiries(db: &DatabaseConnection, query: &InquiryQuery) -> Result<Page<InquiryEntry>> {
    let request = PageRequest::new(query.page, query.limit, DEFAULT_PAGE_SIZE);
    let mut select = Inquiry::find();
    if let Some(term) = filter_value(query.search.as_deref()) {
        select = select.filter(
            Condition::any()
                .add(inquiry::Column::Name.contains(term.as_str()))
                .add(inquiry::Column::Description.contains(term.as_str()))
                .add(inquiry::Column::SerialNumber.contains(term.as_str())),
        );
    }

    let paginator = select
        .order_by_desc(inquiry::Column::CreatedAt)
        .order_by_desc(inquiry::Column::Id)
        .paginate(db, request.limit);
    let total = paginator.num_items().await?;
    let items = paginator.fetch_page(request.index()).await?;

    let serials: Vec<String> = items.iter().filter_map(|i| i.serial_number.clone()).collect();
    let units: HashMap<String, UnitSummary> = if serials.is_empty() {
        HashMap::new()
    } else {
        Unit::find()
            .filter(unit::Column::SerialNumber.is_in(serials))
            .all(db)
            .await?
            .into_iter()
            .map(|u| (u.serial_number.clone(), UnitSummary::from(u)))
            .collect()
    };

    let entries = items
        .into_iter()
        .map(|inquiry| {
            let unit = inquiry
                .serial_number
                .as_ref()
                .and_then(|s| units.get(s).cloned());
            InquiryEntry { inquiry, unit }
        })
        .collect();

    Ok(Page::new(entries, request.page, request.limit, total))
}

/// Retrieves an inquiry by id.
pub async fn get_inquiry(db: &DatabaseConnection, id: i64) -> Result<inquiry::Model> {
    Inquiry::find_by_id(id)
        .one(db)
        .await?
        .ok_or_else(|| Error::not_found("inquiry", id))
}

/// Flips the resolved flag, recording or clearing the resolver.
pub async fn toggle_resolved(
    db: &DatabaseConnection,
    id: i64,
    admin: &str,
    now: DateTime<Utc>,
) -> Result<inquiry::Model> {
    let current = get_inquiry(db, id).await?;
    let resolved = !current.is_resolved;

    let mut active: inquiry::ActiveModel = current.into();
    active.is_resolved = Set(resolved);
    if resolved {
        active.resolved_by = Set(Some(admin.to_string()));
        active.resolved_at = Set(Some(now));
    } else {
        active.resolved_by = Set(None);
        active.resolved_at = Set(None);
    }
    active.updated_at = Set(now);

    let model = active.update(db).await?;
    info!(inquiry_id = id, resolved, "Inquiry status toggled by {}", admin);
    Ok(model)
}

/// Replaces the internal admin notes.
pub async fn set_admin_notes(
    db: &DatabaseConnection,
    id: i64,
    notes: &str,
    now: DateTime<Utc>,
) -> Result<inquiry::Model> {
    let current = get_inquiry(db, id).await?;
    let notes = notes.trim();

    let mut active: inquiry::ActiveModel = current.into();
    active.admin_notes = Set((!notes.is_empty()).then(|| notes.to_string()));
    active.updated_at = Set(now);
    active.update(db).await.map_err(Into::into)
}

/// Deletes an inquiry.
pub async fn delete_inquiry(db: &DatabaseConnection, id: i64) -> Result<()> {
    let result = Inquiry::delete_by_id(id).exec(db).await?;
    if result.rows_affected == 0 {
        return Err(Error::not_found("inquiry", id));
    }
    info!(inquiry_id = id, "Inquiry deleted");
    Ok(())
}

/// The ten most recent inquiries referencing `serial`.
pub async fn related_inquiries(db: &DatabaseConnection, serial: &str) -> Result<Vec<inquiry::Model>> {
    Inquiry::find()
        .filter(inquiry::Column::SerialNumber.eq(serial.trim()))
        .order_by_desc(inquiry::Column::CreatedAt)
        .limit(10)
        .all(db)
        .await
        .map_err(Into::into)
}
