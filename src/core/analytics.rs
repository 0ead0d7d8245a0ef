//! Analytics aggregation over units, returns and inquiries.
//!
//! Read-only. The filtered unit population is scanned once (bounded by
//! `analytics.unit_scan_limit`); returns and inquiries are read as independent
//! capped windows that do not follow the unit filter. Monthly trends use count
//! queries instead of scans.

use crate::{
    config::settings::{AnalyticsConfig, InventoryConfig},
    core::{
        query::{DateRange, filter_value},
        unit::distinct_sources,
    },
    entities::{Inquiry, ReturnRecord, Unit, WarrantyStatus, inquiry, return_record, unit},
    errors::Result,
};
use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use sea_orm::{
    ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    QuerySelect, Select,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// Months covered by the trend series, current month included.
pub const TREND_MONTHS: u32 = 6;

/// Shown when only the fallback counts could be computed.
pub const DEGRADED_NOTICE: &str = "Some dashboard features may be temporarily unavailable";

/// Raw dashboard filter as it arrives in the query string.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilter {
    /// `all`, `week`, `month`, `quarter` or `year`, on unit creation time
    pub date_range: Option<String>,
    /// Sales channel
    pub platform: Option<String>,
    /// Capacity label
    pub capacity: Option<String>,
    /// Acquisition source
    pub source: Option<String>,
    /// `registered`, `not_registered` or a warranty status
    pub warranty_status: Option<String>,
}

/// Warranty constraint of a dashboard filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarrantyFilter {
    /// Units with a warranty
    Registered,
    /// Units without a warranty
    NotRegistered,
    /// Units whose stored warranty status matches
    Status(WarrantyStatus),
}

impl WarrantyFilter {
    /// Parses a filter value; unknown values mean no constraint.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "registered" => Some(Self::Registered),
            "not_registered" => Some(Self::NotRegistered),
            other => WarrantyStatus::parse(other).map(Self::Status),
        }
    }
}

impl DashboardFilter {
    fn apply(&self, mut select: Select<Unit>, now: DateTime<Utc>) -> Select<Unit> {
        let range = self.date_range.as_deref().map_or(DateRange::All, DateRange::parse);
        if let Some(since) = range.since(now) {
            select = select.filter(unit::Column::CreatedAt.gte(since));
        }
        if let Some(platform) = filter_value(self.platform.as_deref()) {
            select = select.filter(unit::Column::Platform.eq(platform.to_lowercase()));
        }
        if let Some(capacity) = filter_value(self.capacity.as_deref()) {
            select = select.filter(unit::Column::Capacity.eq(capacity));
        }
        if let Some(source) = filter_value(self.source.as_deref()) {
            select = select.filter(unit::Column::Source.eq(source));
        }
        match self.warranty_status.as_deref().and_then(WarrantyFilter::parse) {
            Some(WarrantyFilter::Registered) => {
                select = select.filter(unit::Column::WarrantyRegistered.eq(true));
            }
            Some(WarrantyFilter::NotRegistered) => {
                select = select.filter(unit::Column::WarrantyRegistered.eq(false));
            }
            Some(WarrantyFilter::Status(status)) => {
                select = select.filter(unit::Column::WarrantyStatus.eq(status));
            }
            None => {}
        }
        select
    }
}

/// Per-category counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryStats {
    /// Category value (platform, capacity or source)
    pub name: String,
    /// Filtered units in the category
    pub total: u64,
    /// Of which sold
    pub sold: u64,
    /// Of which carry a warranty
    pub warranty: u64,
    /// Returns in the archive window with this category
    pub returns: u64,
    /// Share of the filtered total, rounded to a whole percent
    pub percentage: u64,
}

/// Warranty status counts, with overdue `active` reported as `expired`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantyBreakdown {
    /// Units carrying any warranty
    pub registered: u64,
    /// Active and within the coverage window
    pub active: u64,
    /// Expired, stored or derived
    pub expired: u64,
    /// Awaiting approval
    pub pending: u64,
    /// Voided
    pub void: u64,
}

impl WarrantyBreakdown {
    fn record(&mut self, status: WarrantyStatus) {
        self.registered += 1;
        match status {
            WarrantyStatus::Active => self.active += 1,
            WarrantyStatus::Expired => self.expired += 1,
            WarrantyStatus::Pending => self.pending += 1,
            WarrantyStatus::Void => self.void += 1,
        }
    }
}

/// Everything derived from one pass over the filtered units.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Aggregates {
    /// Filtered units
    pub total: u64,
    /// Filtered units with a sale date
    pub sold: u64,
    /// Filtered units without a sale date
    pub unsold: u64,
    /// Warranty status counts
    pub warranty: WarrantyBreakdown,
    /// Per platform, configured platforms first
    pub platforms: Vec<CategoryStats>,
    /// Per capacity, configured capacities first
    pub capacities: Vec<CategoryStats>,
    /// Per source, in order of first appearance
    pub sources: Vec<CategoryStats>,
}

struct Tally(Vec<CategoryStats>);

impl Tally {
    fn seeded(names: &[String]) -> Self {
        Self(
            names
                .iter()
                .map(|name| CategoryStats {
                    name: name.clone(),
                    ..Default::default()
                })
                .collect(),
        )
    }

    fn entry(&mut self, name: &str) -> &mut CategoryStats {
        let index = match self.0.iter().position(|s| s.name == name) {
            Some(index) => index,
            None => {
                self.0.push(CategoryStats {
                    name: name.to_string(),
                    ..Default::default()
                });
                self.0.len() - 1
            }
        };
        &mut self.0[index]
    }

    fn count_unit(&mut self, name: Option<&str>, sold: bool, warranty: bool) {
        let Some(name) = name.filter(|n| !n.is_empty()) else {
            return;
        };
        let stats = self.entry(name);
        stats.total += 1;
        stats.sold += u64::from(sold);
        stats.warranty += u64::from(warranty);
    }

    fn count_return(&mut self, name: Option<&str>) {
        if let Some(name) = name.filter(|n| !n.is_empty()) {
            self.entry(name).returns += 1;
        }
    }

    fn finish(mut self, filtered_total: u64) -> Vec<CategoryStats> {
        for stats in &mut self.0 {
            stats.percentage = percentage(stats.total, filtered_total);
        }
        self.0
    }
}

/// `part / whole` as a whole percent, rounded half up; 0 for an empty whole.
#[must_use]
pub const fn percentage(part: u64, whole: u64) -> u64 {
    if whole == 0 {
        0
    } else {
        (part * 200 + whole) / (whole * 2)
    }
}

/// Counts the filtered units and the archive window in one pass each.
#[must_use]
pub fn aggregate(
    units: &[unit::Model],
    returns: &[return_record::Model],
    inventory: &InventoryConfig,
    now: DateTime<Utc>,
) -> Aggregates {
    let mut platforms = Tally::seeded(&inventory.platforms);
    let mut capacities = Tally::seeded(&inventory.capacities);
    let mut sources = Tally(Vec::new());
    let mut warranty = WarrantyBreakdown::default();
    let mut sold = 0;

    for unit in units {
        let is_sold = unit.is_sold();
        sold += u64::from(is_sold);
        let has_warranty = match unit.warranty() {
            Some(w) => {
                warranty.record(w.effective_status(now));
                true
            }
            None => false,
        };
        platforms.count_unit(unit.platform.as_deref(), is_sold, has_warranty);
        capacities.count_unit(Some(&unit.capacity), is_sold, has_warranty);
        sources.count_unit(unit.source.as_deref(), is_sold, has_warranty);
    }

    for record in returns {
        platforms.count_return(record.platform.as_deref());
        capacities.count_return(Some(&record.capacity));
        sources.count_return(record.source.as_deref());
    }

    let total = units.len() as u64;
    Aggregates {
        total,
        sold,
        unsold: total - sold,
        warranty,
        platforms: platforms.finish(total),
        capacities: capacities.finish(total),
        sources: sources.finish(total),
    }
}

/// The `n` largest categories by total, ties in original order, empties dropped.
#[must_use]
pub fn top(stats: &[CategoryStats], n: usize) -> Vec<CategoryStats> {
    let mut ranked: Vec<CategoryStats> = stats.iter().filter(|s| s.total > 0).cloned().collect();
    ranked.sort_by(|a, b| b.total.cmp(&a.total));
    ranked.truncate(n);
    ranked
}

/// Counts for one calendar month.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    /// Month label, e.g. `Mar 2025`
    pub month: String,
    /// Units sold in the month
    pub sales: u64,
    /// Returns recorded in the month
    pub returns: u64,
    /// Warranties registered in the month
    pub warranties: u64,
}

fn month_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// `[start, end)` bounds of the trailing months, oldest first.
#[must_use]
pub fn trend_months(now: DateTime<Utc>, months: u32) -> Vec<(NaiveDate, DateTime<Utc>, DateTime<Utc>)> {
    let Some(current) = now.date_naive().with_day(1) else {
        return Vec::new();
    };
    (0..months)
        .rev()
        .filter_map(|back| {
            let first = current.checked_sub_months(Months::new(back))?;
            let next = first.checked_add_months(Months::new(1))?;
            Some((first, month_start(first), month_start(next)))
        })
        .collect()
}

async fn trend(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<Vec<TrendPoint>> {
    let mut points = Vec::new();
    for (first, start, end) in trend_months(now, TREND_MONTHS) {
        let sales = Unit::find()
            .filter(unit::Column::SoldAt.gte(start))
            .filter(unit::Column::SoldAt.lt(end))
            .count(db)
            .await?;
        let returns = ReturnRecord::find()
            .filter(return_record::Column::ReturnDate.gte(start))
            .filter(return_record::Column::ReturnDate.lt(end))
            .count(db)
            .await?;
        let warranties = Unit::find()
            .filter(unit::Column::WarrantyRegisteredAt.gte(start))
            .filter(unit::Column::WarrantyRegisteredAt.lt(end))
            .count(db)
            .await?;
        points.push(TrendPoint {
            month: first.format("%b %Y").to_string(),
            sales,
            returns,
            warranties,
        });
    }
    Ok(points)
}

/// Inquiry counts over the archive window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryStats {
    /// Inquiries in the window
    pub total: u64,
    /// Since the first of the current month
    pub this_month: u64,
    /// In the last 7 days
    pub this_week: u64,
}

fn inquiry_stats(window: &[inquiry::Model], now: DateTime<Utc>) -> InquiryStats {
    let month = now.date_naive().with_day(1).map_or(now, month_start);
    let week = now - Duration::days(7);
    InquiryStats {
        total: window.len() as u64,
        this_month: window.iter().filter(|i| i.created_at >= month).count() as u64,
        this_week: window.iter().filter(|i| i.created_at >= week).count() as u64,
    }
}

/// Full dashboard payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    /// Filter as received
    pub filter: DashboardFilter,
    /// Counts over the filtered units
    #[serde(flatten)]
    pub aggregates: Aggregates,
    /// Returns across the whole archive
    pub total_returns: u64,
    /// Largest platforms
    pub top_platforms: Vec<CategoryStats>,
    /// Largest capacities
    pub top_capacities: Vec<CategoryStats>,
    /// Largest sources
    pub top_sources: Vec<CategoryStats>,
    /// Trailing monthly series, oldest first
    pub trend: Vec<TrendPoint>,
    /// Ten newest filtered units
    pub recent_units: Vec<unit::Model>,
    /// Five newest returns
    pub recent_returns: Vec<return_record::Model>,
    /// Ten newest warranty registrations
    pub recent_warranties: Vec<unit::Model>,
    /// Inquiry counts
    pub inquiries: InquiryStats,
    /// Sources for the filter menu
    pub available_sources: Vec<String>,
}

/// Headline counts served when the full dashboard cannot be built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    /// Active units
    pub total_units: u64,
    /// Active units with a sale date
    pub sold_units: u64,
    /// Archived returns
    pub total_returns: u64,
    /// Stored inquiries
    pub total_inquiries: u64,
}

/// Dashboard result: complete, or reduced to headline counts.
#[derive(Debug, Clone)]
pub enum DashboardView {
    /// Every section was computed
    Full(Box<Dashboard>),
    /// Only headline counts are available
    Degraded {
        /// Fallback counts
        summary: DashboardSummary,
        /// Notice for the reader
        notice: &'static str,
    },
}

async fn build_dashboard(
    db: &DatabaseConnection,
    inventory: &InventoryConfig,
    limits: &AnalyticsConfig,
    filter: &DashboardFilter,
    now: DateTime<Utc>,
) -> Result<Dashboard> {
    let units = filter
        .apply(Unit::find(), now)
        .order_by_desc(unit::Column::CreatedAt)
        .order_by_desc(unit::Column::Id)
        .limit(limits.unit_scan_limit)
        .all(db)
        .await?;
    let returns = ReturnRecord::find()
        .order_by_desc(return_record::Column::ReturnDate)
        .order_by_desc(return_record::Column::Id)
        .limit(limits.archive_window)
        .all(db)
        .await?;
    let inquiries = Inquiry::find()
        .order_by_desc(inquiry::Column::CreatedAt)
        .limit(limits.archive_window)
        .all(db)
        .await?;
    debug!(units = units.len(), returns = returns.len(), "Dashboard scan complete");

    let aggregates = aggregate(&units, &returns, inventory, now);
    let recent_warranties = Unit::find()
        .filter(unit::Column::WarrantyRegistered.eq(true))
        .order_by_desc(unit::Column::WarrantyRegisteredAt)
        .limit(10)
        .all(db)
        .await?;

    Ok(Dashboard {
        filter: filter.clone(),
        total_returns: ReturnRecord::find().count(db).await?,
        top_platforms: top(&aggregates.platforms, 5),
        top_capacities: top(&aggregates.capacities, 5),
        top_sources: top(&aggregates.sources, 10),
        trend: trend(db, now).await?,
        recent_units: units.into_iter().take(10).collect(),
        recent_returns: returns.into_iter().take(5).collect(),
        recent_warranties,
        inquiries: inquiry_stats(&inquiries, now),
        available_sources: distinct_sources(db).await?,
        aggregates,
    })
}

/// Headline counts using id-only queries.
pub async fn summary_counts(db: &DatabaseConnection) -> Result<DashboardSummary> {
    Ok(DashboardSummary {
        total_units: Unit::find()
            .select_only()
            .column(unit::Column::Id)
            .count(db)
            .await?,
        sold_units: Unit::find()
            .select_only()
            .column(unit::Column::Id)
            .filter(unit::Column::SoldAt.is_not_null())
            .count(db)
            .await?,
        total_returns: ReturnRecord::find()
            .select_only()
            .column(return_record::Column::Id)
            .count(db)
            .await?,
        total_inquiries: Inquiry::find()
            .select_only()
            .column(inquiry::Column::Id)
            .count(db)
            .await?,
    })
}

/// Builds the dashboard, falling back to headline counts if any section fails.
///
/// # Errors
/// Only if the fallback counts fail as well.
#[instrument(skip(db, inventory, limits))]
pub async fn dashboard(
    db: &DatabaseConnection,
    inventory: &InventoryConfig,
    limits: &AnalyticsConfig,
    filter: &DashboardFilter,
    now: DateTime<Utc>,
) -> Result<DashboardView> {
    match build_dashboard(db, inventory, limits, filter, now).await {
        Ok(dashboard) => Ok(DashboardView::Full(Box::new(dashboard))),
        Err(e) => {
            warn!("Dashboard degraded: {}", e);
            Ok(DashboardView::Degraded {
                summary: summary_counts(db).await?,
                notice: DEGRADED_NOTICE,
            })
        }
    }
}

/// Warranty counts over every active unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WarrantySummary {
    /// Active units
    pub total_units: u64,
    /// With a sale date
    pub sold_units: u64,
    /// Without a sale date
    pub unsold_units: u64,
    /// Status counts, overdue `active` reported as `expired`
    pub warranty: WarrantyBreakdown,
}

/// Computes [`WarrantySummary`] with count queries.
pub async fn warranty_summary(db: &DatabaseConnection, now: DateTime<Utc>) -> Result<WarrantySummary> {
    let with_status = |status: WarrantyStatus| {
        Unit::find().filter(unit::Column::WarrantyStatus.eq(status))
    };

    let total_units = Unit::find().count(db).await?;
    let sold_units = Unit::find()
        .filter(unit::Column::SoldAt.is_not_null())
        .count(db)
        .await?;
    let overdue = with_status(WarrantyStatus::Active)
        .filter(unit::Column::WarrantyExpiresAt.lt(now))
        .count(db)
        .await?;
    let active = with_status(WarrantyStatus::Active).count(db).await? - overdue;
    let expired = with_status(WarrantyStatus::Expired).count(db).await? + overdue;
    let pending = with_status(WarrantyStatus::Pending).count(db).await?;
    let void = with_status(WarrantyStatus::Void).count(db).await?;

    Ok(WarrantySummary {
        total_units,
        sold_units,
        unsold_units: total_units - sold_units,
        warranty: WarrantyBreakdown {
            registered: active + expired + pending + void,
            active,
            expired,
            pending,
            void,
        },
    })
}
