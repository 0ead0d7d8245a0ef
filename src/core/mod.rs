/// Dashboard aggregation and warranty statistics
pub mod analytics;
/// Bill artifact storage and metadata
pub mod bills;
/// Customer inquiries
pub mod inquiry;
/// Pagination and date-range helpers shared by the listings
pub mod query;
/// Fixed-window rate limiting
pub mod rate_limit;
/// Public warranty registration and status check
pub mod registration;
/// Return archive and the mark-as-return migration
pub mod returns;
/// Active unit records
pub mod unit;
/// Warranty state machine
pub mod warranty;
