//! Admin console routes. Every handler requires [`AdminCaller`].

use crate::{
    api::{
        AppState,
        extract::{AdminCaller, ClientAddr, FormData, user_agent},
        responses::{ApiResult, created, success},
    },
    core::{
        analytics::{self, DashboardFilter, DashboardView},
        bills::UploadContext,
        inquiry::{self, InquiryQuery},
        returns::{self, ReturnQuery, ReturnRequest},
        unit::{self, UnitInput, UnitQuery},
        warranty::{self, AdminWarrantyInput, StatusChange},
    },
    entities::{RegistrationChannel, WarrantyStatus},
    errors::Error,
};
use axum::{
    Json,
    extract::{
        Multipart, Path, Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

/// `GET /admin/units`
pub async fn list_units(
    State(state): State<AppState>,
    _admin: AdminCaller,
    query: Result<Query<UnitQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let page = unit::list_units(&state.db, &query).await?;
    success("Units retrieved", json!({ "units": page }))
}

/// `POST /admin/units`
pub async fn create_unit(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    payload: Result<Json<UnitInput>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    let created_unit = unit::create_unit(&state.db, &state.config.inventory, input, Utc::now()).await?;
    info!(unit_id = created_unit.id, "Unit created by {}", admin);
    created("Product created successfully", json!({ "unit": created_unit }))
}

/// `GET /admin/units/{id}`
pub async fn get_unit(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> ApiResult {
    let found = unit::get_unit(&state.db, id).await?;
    let related = inquiry::related_inquiries(&state.db, &found.serial_number).await?;
    success(
        "Product retrieved",
        json!({ "unit": found, "relatedInquiries": related }),
    )
}

/// `PUT /admin/units/{id}`
pub async fn update_unit(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
    payload: Result<Json<UnitInput>, JsonRejection>,
) -> ApiResult {
    let Json(input) = payload?;
    let updated = unit::update_unit(&state.db, &state.config.inventory, id, input, Utc::now()).await?;
    success("Product updated successfully", json!({ "unit": updated }))
}

fn parse_status(value: &str) -> Result<WarrantyStatus, Error> {
    WarrantyStatus::parse(value).ok_or_else(|| Error::InvalidStatus {
        status: value.to_string(),
    })
}

/// `POST /admin/units/{id}/warranty` (multipart)
pub async fn register_warranty(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    ClientAddr(addr): ClientAddr,
    Path(id): Path<i64>,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult {
    let form = FormData::read(multipart).await?;
    let input = AdminWarrantyInput {
        duration_months: form.months("durationMonths")?,
        status: form.optional("status").as_deref().map(parse_status).transpose()?,
        notes: form.optional("notes"),
    };
    let bill = form.bill.map(|upload| {
        (
            upload,
            UploadContext {
                uploaded_by: admin.clone(),
                channel: RegistrationChannel::Admin,
                client_addr: Some(addr),
                user_agent: user_agent(&headers),
            },
        )
    });

    let updated = warranty::register_or_update(
        &state.db,
        state.bills.as_ref(),
        &state.config,
        id,
        input,
        bill,
        &admin,
        Utc::now(),
    )
    .await?;
    success("Warranty saved successfully", json!({ "unit": updated }))
}

/// `PATCH /admin/units/{id}/warranty/status`
pub async fn set_warranty_status(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
    payload: Result<Json<StatusChange>, JsonRejection>,
) -> ApiResult {
    let Json(change) = payload?;
    let updated = warranty::approve_or_set(
        &state.db,
        &state.config.warranty,
        id,
        change,
        &admin,
        Utc::now(),
    )
    .await?;
    let status = updated.warranty_status.map_or("", WarrantyStatus::as_str);
    success(
        format!("Warranty status updated to {status}"),
        json!({ "unit": updated }),
    )
}

/// `GET /admin/units/{id}/warranty/bill`
pub async fn warranty_bill(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> ApiResult {
    let bill = warranty::bill_for_unit(&state.db, id).await?;
    success("Bill retrieved", json!({ "bill": bill }))
}

/// `POST /admin/units/{id}/return`
pub async fn mark_as_return(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
    payload: Result<Json<ReturnRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = payload?;
    let record = returns::mark_as_return(&state.db, id, request, Some(&admin), Utc::now()).await?;
    success(
        "Product successfully marked as return and moved to returns collection",
        json!({ "returnId": record.id }),
    )
}

/// Filter of the warranty request list.
#[derive(Debug, Default, Deserialize)]
pub struct WarrantyRequestQuery {
    /// A warranty status, or `all`
    pub status: Option<String>,
}

/// `GET /admin/warranty-requests`
pub async fn warranty_requests(
    State(state): State<AppState>,
    _admin: AdminCaller,
    query: Result<Query<WarrantyRequestQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let status = query
        .status
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty() && !s.eq_ignore_ascii_case("all"))
        .map(parse_status)
        .transpose()?;
    let requests = unit::warranty_requests(&state.db, status).await?;
    success("Warranty requests retrieved", requests)
}

/// `GET /admin/returns`
pub async fn list_returns(
    State(state): State<AppState>,
    _admin: AdminCaller,
    query: Result<Query<ReturnQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let listing = returns::list_returns(&state.db, &query, Utc::now()).await?;
    success("Returns retrieved", listing)
}

/// `GET /admin/returns/{id}`
pub async fn get_return(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> ApiResult {
    let record = returns::get_return(&state.db, id).await?;
    success("Return retrieved", json!({ "return": record }))
}

/// Body of a note append.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct NoteBody {
    /// Text to append
    pub note: String,
}

/// `POST /admin/returns/{id}/notes`
pub async fn append_return_note(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
    payload: Result<Json<NoteBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let record = returns::append_return_note(&state.db, id, &body.note, &admin, Utc::now()).await?;
    success("Note added", json!({ "return": record }))
}

/// `GET /admin/queries`
pub async fn list_queries(
    State(state): State<AppState>,
    _admin: AdminCaller,
    query: Result<Query<InquiryQuery>, QueryRejection>,
) -> ApiResult {
    let Query(query) = query?;
    let page = inquiry::list_inquiries(&state.db, &query).await?;
    success("Queries retrieved", json!({ "queries": page }))
}

/// `GET /admin/queries/{id}`
pub async fn get_query(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> ApiResult {
    let found = inquiry::get_inquiry(&state.db, id).await?;
    success("Query retrieved", json!({ "query": found }))
}

/// `POST /admin/queries/{id}/toggle-status`
pub async fn toggle_query_status(
    State(state): State<AppState>,
    AdminCaller(admin): AdminCaller,
    Path(id): Path<i64>,
) -> ApiResult {
    let updated = inquiry::toggle_resolved(&state.db, id, &admin, Utc::now()).await?;
    let message = if updated.is_resolved {
        "Query marked as resolved"
    } else {
        "Query marked as unresolved"
    };
    success(message, json!({ "query": updated }))
}

/// Body of an admin notes update.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AdminNotesBody {
    /// Replacement notes; empty clears them
    pub admin_notes: String,
}

/// `PUT /admin/queries/{id}/notes`
pub async fn set_query_notes(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
    payload: Result<Json<AdminNotesBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = payload?;
    let updated = inquiry::set_admin_notes(&state.db, id, &body.admin_notes, Utc::now()).await?;
    success("Notes updated", json!({ "query": updated }))
}

/// `DELETE /admin/queries/{id}`
pub async fn delete_query(
    State(state): State<AppState>,
    _admin: AdminCaller,
    Path(id): Path<i64>,
) -> ApiResult {
    inquiry::delete_inquiry(&state.db, id).await?;
    success("Query deleted", json!({ "queryId": id }))
}

/// `GET /admin/dashboard`
pub async fn dashboard(
    State(state): State<AppState>,
    _admin: AdminCaller,
    query: Result<Query<DashboardFilter>, QueryRejection>,
) -> ApiResult {
    let Query(filter) = query?;
    let view = analytics::dashboard(
        &state.db,
        &state.config.inventory,
        &state.config.analytics,
        &filter,
        Utc::now(),
    )
    .await?;
    match view {
        DashboardView::Full(dashboard) => success(
            "Dashboard data retrieved",
            json!({ "degraded": false, "dashboard": dashboard }),
        ),
        DashboardView::Degraded { summary, notice } => success(
            notice,
            json!({ "degraded": true, "summary": summary, "filter": filter }),
        ),
    }
}

/// `GET /admin/stats/warranty`
pub async fn warranty_stats(State(state): State<AppState>, _admin: AdminCaller) -> ApiResult {
    let stats = analytics::warranty_summary(&state.db, Utc::now()).await?;
    success("Warranty statistics retrieved", json!({ "stats": stats }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use crate::api::{router, test_support::*};
    use axum::http::StatusCode;
    use serde_json::json;
    use tower::ServiceExt;

    const ADMIN: Option<&str> = Some("admin@example.com");

    #[tokio::test]
    async fn test_admin_routes_require_identity() {
        let app = router(test_state(10).await);
        let response = app
            .oneshot(empty_request("GET", "/admin/units", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_create_and_list_units() {
        let app = router(test_state(10).await);
        let unit = json!({ "serialNumber": "SN-1", "name": "Disk", "capacity": "512" });

        let response = app
            .clone()
            .oneshot(json_request("POST", "/admin/units", ADMIN, &unit))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(json_request("POST", "/admin/units", ADMIN, &unit))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let bad = json!({ "serialNumber": "SN-2", "name": "Disk", "capacity": "512", "color": "red" });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/admin/units", ADMIN, &bad))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .oneshot(empty_request("GET", "/admin/units?search=sn-&limit=5", ADMIN))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["units"]["total"], 1);
        assert_eq!(body["units"]["limit"], 5);
    }

    #[tokio::test]
    async fn test_warranty_approval_and_return_flow() {
        let app = router(test_state(10).await);

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/warranty/register",
                None,
                &[
                    ("serialNumber", "SN-100"),
                    ("platform", "amazon"),
                    ("buyerName", "Jane"),
                    ("buyerPhone", "555-0100"),
                    ("buyerEmail", "jane@x.com"),
                ],
                Some(("bill.png", "image/png", b"\x89PNG")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/admin/warranty-requests?status=pending", ADMIN))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["pendingCount"], 1);
        let id = body["units"][0]["id"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/admin/units/{id}/warranty/status"),
                ADMIN,
                &json!({ "status": "pending" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = app
            .clone()
            .oneshot(json_request(
                "PATCH",
                &format!("/admin/units/{id}/warranty/status"),
                ADMIN,
                &json!({ "status": "active", "durationMonths": 24 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_json(response).await["message"],
            "Warranty status updated to active"
        );

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/admin/units/{id}/warranty/bill"), ADMIN))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["bill"]["content_type"], "image/png");

        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                &format!("/admin/units/{id}/return"),
                ADMIN,
                &json!({ "returnReason": "defective" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            "Product successfully marked as return and moved to returns collection"
        );
        let return_id = body["returnId"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(empty_request("GET", &format!("/admin/units/{id}"), ADMIN))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let response = app
            .oneshot(empty_request("GET", &format!("/admin/returns/{return_id}"), ADMIN))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["return"]["return_reason"], "defective");
        assert_eq!(body["return"]["warranty_duration_months"], 24);
    }

    #[tokio::test]
    async fn test_dashboard_and_stats() {
        let app = router(test_state(10).await);
        let response = app
            .clone()
            .oneshot(empty_request(
                "GET",
                "/admin/dashboard?dateRange=month&platform=amazon",
                ADMIN,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["degraded"], false);
        assert_eq!(body["dashboard"]["total"], 0);
        assert_eq!(body["dashboard"]["trend"].as_array().unwrap().len(), 6);

        let response = app
            .oneshot(empty_request("GET", "/admin/stats/warranty", ADMIN))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["stats"]["totalUnits"], 0);
    }

    #[tokio::test]
    async fn test_query_admin_actions() {
        let app = router(test_state(10).await);
        let form = json!({
            "name": "Jane",
            "email": "jane@x.com",
            "subject": "general",
            "description": "Hello",
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/queries", None, &form))
            .await
            .unwrap();
        let id = body_json(response).await["queryId"].as_i64().unwrap();

        let response = app
            .clone()
            .oneshot(empty_request("POST", &format!("/admin/queries/{id}/toggle-status"), ADMIN))
            .await
            .unwrap();
        let body = body_json(response).await;
        assert_eq!(body["message"], "Query marked as resolved");
        assert_eq!(body["query"]["resolved_by"], "admin@example.com");

        let response = app
            .clone()
            .oneshot(json_request(
                "PUT",
                &format!("/admin/queries/{id}/notes"),
                ADMIN,
                &json!({ "adminNotes": "Called back" }),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["query"]["admin_notes"], "Called back");

        let response = app
            .clone()
            .oneshot(empty_request("DELETE", &format!("/admin/queries/{id}"), ADMIN))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .oneshot(empty_request("GET", &format!("/admin/queries/{id}"), ADMIN))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
