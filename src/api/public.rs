use crate::{
    api::{
        AppState,
        extract::{ClientAddr, FormData, MaybeAdmin, user_agent},
        responses::{ApiResult, created, success},
    },
    core::{
        inquiry::{self, NewInquiry},
        registration::{self, RegistrationRequest, RequestOrigin, WarrantyCheck},
    },
};
use axum::{
    Json,
    extract::{Multipart, Path, State, rejection::JsonRejection},
    http::HeaderMap,
};
use chrono::Utc;
use serde_json::json;

/// `POST /warranty/register`
pub async fn register_warranty(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    MaybeAdmin(admin): MaybeAdmin,
    headers: HeaderMap,
    multipart: Multipart,
) -> ApiResult {
    let now = Utc::now();
    state.throttle("warranty", &addr, admin.as_deref(), now).await?;

    let form = FormData::read(multipart).await?;
    let request = RegistrationRequest {
        serial_number: form.text("serialNumber"),
        platform: form.text("platform"),
        buyer_name: form.text("buyerName"),
        buyer_phone: form.text("buyerPhone"),
        buyer_email: form.text("buyerEmail"),
        buyer_address: form.optional("buyerAddress"),
        buyer_payment_method: form.optional("buyerPaymentMethod"),
        duration_months: form.months("durationMonths")?,
    };
    let origin = RequestOrigin {
        client_addr: Some(addr),
        user_agent: user_agent(&headers),
    };

    let receipt = registration::register_warranty(
        &state.db,
        state.bills.as_ref(),
        &state.config,
        request,
        form.bill,
        origin,
        now,
    )
    .await?;

    created(
        "Warranty registration request submitted successfully. Pending admin approval.",
        json!({ "warranty": receipt }),
    )
}

/// `GET /warranty/check/{serial}`
pub async fn check_warranty(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    MaybeAdmin(admin): MaybeAdmin,
    Path(serial): Path<String>,
) -> ApiResult {
    let now = Utc::now();
    state.throttle("warranty", &addr, admin.as_deref(), now).await?;

    match registration::check_status(&state.db, &serial, now).await? {
        WarrantyCheck::NotRegistered { serial_number } => success(
            "No warranty registered for this product",
            json!({ "warrantyRegistered": false, "serialNumber": serial_number }),
        ),
        WarrantyCheck::Registered {
            warranty,
            product,
            buyer,
        } => success(
            "Warranty information retrieved",
            json!({
                "warrantyRegistered": true,
                "warranty": warranty,
                "product": product,
                "buyer": buyer,
            }),
        ),
    }
}

/// `POST /queries`
pub async fn submit_query(
    State(state): State<AppState>,
    ClientAddr(addr): ClientAddr,
    MaybeAdmin(admin): MaybeAdmin,
    payload: Result<Json<NewInquiry>, JsonRejection>,
) -> ApiResult {
    let now = Utc::now();
    state.throttle("queries", &addr, admin.as_deref(), now).await?;
    let Json(input) = payload?;

    let created_inquiry = inquiry::create_inquiry(&state.db, input, now).await?;
    created(
        "Your message has been sent successfully! We will get back to you within 24 hours.",
        json!({ "queryId": created_inquiry.id }),
    )
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use crate::api::{router, test_support::*};
    use axum::http::{StatusCode, header::RETRY_AFTER};
    use serde_json::json;
    use tower::ServiceExt;

    fn registration_fields(serial: &str) -> Vec<(&str, &str)> {
        vec![
            ("serialNumber", serial),
            ("platform", "Amazon"),
            ("buyerName", "Jane"),
            ("buyerPhone", "555-0100"),
            ("buyerEmail", "jane@x.com"),
        ]
    }

    #[tokio::test]
    async fn test_register_then_check() {
        let app = router(test_state(10).await);
        let fields = registration_fields("SN-100");

        let response = app
            .clone()
            .oneshot(multipart_request(
                "/warranty/register",
                None,
                &fields,
                Some(("bill.pdf", "application/pdf", b"%PDF-1.4\n")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["warranty"]["status"], "pending");
        assert_eq!(body["warranty"]["durationMonths"], 12);

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/warranty/check/SN-100", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["warrantyRegistered"], true);
        assert_eq!(body["product"]["serialNumber"], "SN-100");
        assert_eq!(body["buyer"]["email"], "jane@x.com");

        let response = app
            .oneshot(multipart_request(
                "/warranty/register",
                None,
                &fields,
                Some(("bill.pdf", "application/pdf", b"%PDF-1.4\n")),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_register_requires_bill() {
        let app = router(test_state(10).await);
        let response = app
            .oneshot(multipart_request(
                "/warranty/register",
                None,
                &registration_fields("SN-200"),
                None,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["message"], "Bill file is required");
    }

    #[tokio::test]
    async fn test_check_unknown_serial_is_not_found() {
        let app = router(test_state(10).await);
        let response = app
            .oneshot(empty_request("GET", "/warranty/check/NOPE", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["success"], false);
    }

    #[tokio::test]
    async fn test_public_routes_are_rate_limited_except_for_admins() {
        let app = router(test_state(2).await);
        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(empty_request("GET", "/warranty/check/NOPE", None))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NOT_FOUND);
        }

        let response = app
            .clone()
            .oneshot(empty_request("GET", "/warranty/check/NOPE", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(RETRY_AFTER));

        let response = app
            .oneshot(empty_request("GET", "/warranty/check/NOPE", Some("admin")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_submit_query() {
        let app = router(test_state(10).await);
        let payload = json!({
            "name": "Jane",
            "email": "Jane@X.com",
            "subject": "warranty-claim",
            "description": "Disk clicks",
            "serialNumber": "SN-100",
        });
        let response = app
            .clone()
            .oneshot(json_request("POST", "/queries", None, &payload))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
        let body = body_json(response).await;
        assert_eq!(
            body["message"],
            "Your message has been sent successfully! We will get back to you within 24 hours."
        );
        assert!(body["queryId"].is_i64());

        let bad = json!({ "name": "Jane", "email": "nope", "subject": "x", "description": "y" });
        let response = app
            .oneshot(json_request("POST", "/queries", None, &bad))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(response).await["message"],
            "Please provide a valid email address"
        );
    }
}
