//! Pagination and date-range helpers shared by the listing operations.

use chrono::{DateTime, Duration, Months, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Largest page size any listing accepts.
pub const MAX_PAGE_SIZE: u64 = 100;

/// One page of a listing plus the totals needed to render a pager.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    /// Records on this page
    pub items: Vec<T>,
    /// 1-based page number actually served
    pub page: u64,
    /// Page size actually used
    pub limit: u64,
    /// Matching records across all pages
    pub total: u64,
    /// Number of pages, never less than 1
    pub total_pages: u64,
}

impl<T> Page<T> {
    /// Builds a page, deriving `total_pages` from `total` and `limit`.
    #[must_use]
    pub fn new(items: Vec<T>, page: u64, limit: u64, total: u64) -> Self {
        Self {
            items,
            page,
            limit,
            total,
            total_pages: total.div_ceil(limit.max(1)).max(1),
        }
    }
}

/// Requested page and page size, normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based page number
    pub page: u64,
    /// Page size in `1..=MAX_PAGE_SIZE`
    pub limit: u64,
}

impl PageRequest {
    /// Clamps raw values: page to at least 1, limit to `1..=MAX_PAGE_SIZE`,
    /// falling back to `default_limit` when no limit is given.
    #[must_use]
    pub fn new(page: Option<u64>, limit: Option<u64>, default_limit: u64) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Zero-based page index for `Paginator::fetch_page`.
    #[must_use]
    pub const fn index(self) -> u64 {
        self.page - 1
    }
}

/// Relative date window applied to a timestamp column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateRange {
    /// No restriction
    #[default]
    All,
    /// Since midnight UTC today
    Today,
    /// Last 7 days
    Week,
    /// Last calendar month
    Month,
    /// Last three calendar months
    Quarter,
    /// Last calendar year
    Year,
}

impl DateRange {
    /// Parses a query-string value; unknown or empty values mean [`DateRange::All`].
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "today" => Self::Today,
            "week" => Self::Week,
            "month" => Self::Month,
            "quarter" => Self::Quarter,
            "year" => Self::Year,
            _ => Self::All,
        }
    }

    /// Lower bound of the window at `now`, or `None` for [`DateRange::All`].
    ///
    /// Month-based windows clamp to the end of shorter months, so Mar 31
    /// steps back to Feb 28.
    #[must_use]
    pub fn since(self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::All => None,
            Self::Today => Some(now.date_naive().and_time(NaiveTime::MIN).and_utc()),
            Self::Week => Some(now - Duration::days(7)),
            Self::Month => now.checked_sub_months(Months::new(1)),
            Self::Quarter => now.checked_sub_months(Months::new(3)),
            Self::Year => now.checked_sub_months(Months::new(12)),
        }
    }
}

/// Trims an optional filter value, treating blank and `"all"` as absent.
pub(crate) fn filter_value(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
        .map(ToString::to_string)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_page_request_clamps() {
        let req = PageRequest::new(Some(0), Some(500), 10);
        assert_eq!(req.page, 1);
        assert_eq!(req.limit, MAX_PAGE_SIZE);

        let req = PageRequest::new(None, None, 20);
        assert_eq!(req, PageRequest { page: 1, limit: 20 });
        assert_eq!(req.index(), 0);

        assert_eq!(PageRequest::new(Some(3), Some(0), 10).limit, 1);
    }

    #[test]
    fn test_total_pages_never_zero() {
        let empty: Page<i32> = Page::new(vec![], 1, 10, 0);
        assert_eq!(empty.total_pages, 1);

        let page = Page::new(vec![1, 2], 2, 10, 21);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn test_date_range_bounds() {
        let now = Utc.with_ymd_and_hms(2025, 6, 15, 13, 45, 0).unwrap();
        assert_eq!(DateRange::All.since(now), None);
        assert_eq!(
            DateRange::Today.since(now),
            Some(Utc.with_ymd_and_hms(2025, 6, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(
            DateRange::Week.since(now),
            Some(Utc.with_ymd_and_hms(2025, 6, 8, 13, 45, 0).unwrap())
        );
        assert_eq!(
            DateRange::Month.since(now),
            Some(Utc.with_ymd_and_hms(2025, 5, 15, 13, 45, 0).unwrap())
        );
        assert_eq!(
            DateRange::Year.since(now),
            Some(Utc.with_ymd_and_hms(2024, 6, 15, 13, 45, 0).unwrap())
        );
        assert_eq!(DateRange::parse(" Quarter "), DateRange::Quarter);
        assert_eq!(DateRange::parse("decade"), DateRange::All);
    }

    #[test]
    fn test_month_ranges_follow_the_calendar() {
        let end_of_march = Utc.with_ymd_and_hms(2025, 3, 31, 9, 0, 0).unwrap();
        assert_eq!(
            DateRange::Month.since(end_of_march),
            Some(Utc.with_ymd_and_hms(2025, 2, 28, 9, 0, 0).unwrap())
        );
        assert_eq!(
            DateRange::Quarter.since(end_of_march),
            Some(Utc.with_ymd_and_hms(2024, 12, 31, 9, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_filter_value_ignores_all() {
        assert_eq!(filter_value(Some(" amazon ")).as_deref(), Some("amazon"));
        assert_eq!(filter_value(Some("All")), None);
        assert_eq!(filter_value(Some("  ")), None);
        assert_eq!(filter_value(None), None);
    }
}
