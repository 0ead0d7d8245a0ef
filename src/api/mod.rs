//! HTTP API over the core operations.
//!
//! Public routes are rate limited per caller address unless the request carries
//! an admin identity. Admin routes require that identity.

/// Admin console routes
pub mod admin;
/// Request extractors
pub mod extract;
/// Public customer-facing routes
pub mod public;
/// Response envelope and error mapping
pub mod responses;

use crate::{
    config::AppConfig,
    core::{bills::BillStore, rate_limit::RateLimiter},
    errors::Result,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
};
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use tracing::debug;

/// Headroom above the bill size limit for the other multipart fields.
const FORM_OVERHEAD_BYTES: usize = 64 * 1024;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Database pool
    pub db: DatabaseConnection,
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Limiter for the public routes
    pub limiter: Arc<dyn RateLimiter>,
    /// Bill blob storage
    pub bills: Arc<dyn BillStore>,
}

impl AppState {
    /// Counts an attempt against `scope` for `addr`, unless an admin is calling.
    ///
    /// # Errors
    /// `RateLimited` once the window's budget is spent.
    pub async fn throttle(
        &self,
        scope: &str,
        addr: &str,
        admin: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(admin) = admin {
            debug!(scope, "Rate limit skipped for admin {}", admin);
            return Ok(());
        }
        self.limiter
            .hit(&format!("{scope}:{addr}"), now)
            .await?
            .check(now)?;
        Ok(())
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    let body_limit = state.config.bills.max_bytes + FORM_OVERHEAD_BYTES;

    Router::new()
        .route("/warranty/register", post(public::register_warranty))
        .route("/warranty/check/{serial}", get(public::check_warranty))
        .route("/queries", post(public::submit_query))
        .route(
            "/admin/units",
            get(admin::list_units).post(admin::create_unit),
        )
        .route(
            "/admin/units/{id}",
            get(admin::get_unit).put(admin::update_unit),
        )
        .route("/admin/units/{id}/warranty", post(admin::register_warranty))
        .route(
            "/admin/units/{id}/warranty/status",
            patch(admin::set_warranty_status),
        )
        .route("/admin/units/{id}/warranty/bill", get(admin::warranty_bill))
        .route("/admin/units/{id}/return", post(admin::mark_as_return))
        .route("/admin/warranty-requests", get(admin::warranty_requests))
        .route("/admin/returns", get(admin::list_returns))
        .route("/admin/returns/{id}", get(admin::get_return))
        .route("/admin/returns/{id}/notes", post(admin::append_return_note))
        .route("/admin/queries", get(admin::list_queries))
        .route(
            "/admin/queries/{id}",
            get(admin::get_query).delete(admin::delete_query),
        )
        .route(
            "/admin/queries/{id}/toggle-status",
            post(admin::toggle_query_status),
        )
        .route("/admin/queries/{id}/notes", put(admin::set_query_notes))
        .route("/admin/dashboard", get(admin::dashboard))
        .route("/admin/stats/warranty", get(admin::warranty_stats))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::{
        bills::MemoryBillStore,
        rate_limit::{FixedWindow, MemoryRateLimiter},
    };
    use crate::test_utils::{setup_test_db, test_config};
    use axum::{
        body::Body,
        http::{Request, Response, header::CONTENT_TYPE},
    };
    use http_body_util::BodyExt;
    use serde_json::Value;

    pub const BOUNDARY: &str = "disk-ledger-test-boundary";

    pub async fn test_state(max_attempts: u32) -> AppState {
        let config = test_config();
        AppState {
            db: setup_test_db().await.unwrap(),
            limiter: Arc::new(MemoryRateLimiter::new(FixedWindow::new(
                config.rate_limit.window_secs,
                max_attempts,
            ))),
            bills: Arc::new(MemoryBillStore::new()),
            config: Arc::new(config),
        }
    }

    pub fn json_request(method: &str, uri: &str, admin: Option<&str>, body: &Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .header(CONTENT_TYPE, "application/json");
        if let Some(admin) = admin {
            builder = builder.header(extract::ADMIN_HEADER, admin);
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    pub fn empty_request(method: &str, uri: &str, admin: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(admin) = admin {
            builder = builder.header(extract::ADMIN_HEADER, admin);
        }
        builder.body(Body::empty()).unwrap()
    }

    pub fn multipart_request(
        uri: &str,
        admin: Option<&str>,
        fields: &[(&str, &str)],
        file: Option<(&str, &str, &[u8])>,
    ) -> Request<Body> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, content_type, bytes)) = file {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\nContent-Type: {content_type}\r\n\r\n",
                    extract::BILL_FIELD
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"));
        if let Some(admin) = admin {
            builder = builder.header(extract::ADMIN_HEADER, admin);
        }
        builder.body(Body::from(body)).unwrap()
    }

    pub async fn body_json(response: Response<Body>) -> Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }
}
