//! Shared test utilities.
//!
//! Helpers for setting up an in-memory database and creating units and
//! warranties with sensible defaults, all stamped at [`fixed_now`].

use crate::{
    config::settings::AppConfig,
    core::{
        bills::{BillUpload, UploadContext},
        unit::{UnitInput, create_unit},
        warranty::{self, WarrantyClaim},
    },
    entities::{RegistrationChannel, unit},
    errors::Result,
};
use chrono::{DateTime, TimeZone, Utc};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// Routes `tracing` output to the test harness. Safe to call more than once.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("debug")
        .with_test_writer()
        .try_init();
}

/// Default configuration, as used when no config.toml exists.
pub fn test_config() -> AppConfig {
    AppConfig::default()
}

/// The instant every helper stamps its records with.
pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 15, 10, 30, 0)
        .single()
        .unwrap_or_default()
}

/// Minimal valid unit input.
///
/// # Defaults
/// * `name`: "Test Disk"
/// * everything else unset
pub fn unit_input(serial: &str, capacity: &str) -> UnitInput {
    UnitInput {
        serial_number: serial.to_string(),
        name: "Test Disk".to_string(),
        capacity: capacity.to_string(),
        ..Default::default()
    }
}

/// Creates an unsold 512 unit with no warranty.
pub async fn create_test_unit(db: &DatabaseConnection, serial: &str) -> Result<unit::Model> {
    let config = test_config();
    create_unit(db, &config.inventory, unit_input(serial, "512"), fixed_now()).await
}

/// Creates a unit carrying a `pending` 12-month warranty filed through the public API.
pub async fn create_unit_with_pending_warranty(
    db: &DatabaseConnection,
    serial: &str,
) -> Result<unit::Model> {
    let unit = create_test_unit(db, serial).await?;
    let claim = WarrantyClaim {
        registered_by: "jane@example.com".to_string(),
        channel: RegistrationChannel::PublicApi,
        duration_months: 12,
        bill_id: None,
        note: None,
    };
    warranty::submit(db, &unit, claim, fixed_now()).await
}

/// A small PDF upload.
pub fn test_bill() -> BillUpload {
    BillUpload {
        original_name: "invoice.pdf".to_string(),
        content_type: "application/pdf".to_string(),
        bytes: b"%PDF-1.4\n".to_vec(),
    }
}

/// Upload context of an admin console call.
pub fn admin_upload_context(actor: &str) -> UploadContext {
    UploadContext {
        uploaded_by: actor.to_string(),
        channel: RegistrationChannel::Admin,
        client_addr: None,
        user_agent: None,
    }
}
