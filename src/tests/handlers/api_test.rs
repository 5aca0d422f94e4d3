use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use crate::models::booking::AvailableSlot;
use crate::models::common::{BookingCreatedResponse, BookingListResponse, BookingStatusResponse};
use crate::models::booking::BookingStatus;
use crate::routes::create_router;
use crate::tests::common::fixtures::*;

fn server(env: &TestEnv, admin_token: Option<&str>) -> TestServer {
    TestServer::new(create_router(env.app_state(admin_token))).unwrap()
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn booking_body(start_hour: u32, email: &str) -> Value {
    let date = upcoming_monday();
    json!({
        "staff_id": "alice",
        "consultation_type_id": "intro",
        "start_time": at(date, start_hour, 0).to_rfc3339(),
        "end_time": at(date, start_hour, 30).to_rfc3339(),
        "client_name": "Casey Client",
        "client_email": email,
    })
}

#[tokio::test]
async fn test_health_check() {
    let env = default_env();
    let response = server(&env, None).get("/health").await;

    response.assert_status_ok();
    assert_eq!(response.text(), "OK");
}

#[tokio::test]
async fn test_catalog_listings() {
    let env = default_env();
    let server = server(&env, None);

    let types: Vec<Value> = server.get("/consultation-types").await.json();
    let ids: Vec<&str> = types.iter().map(|t| t["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["intro", "buffered", "followup", "review"]);

    let staff: Vec<Value> = server.get("/staff").await.json();
    assert_eq!(staff.len(), 2);
    assert_eq!(staff[0], json!({"id": "alice", "name": "Alice Adams"}));
}

#[tokio::test]
async fn test_slot_queries() {
    let env = default_env();
    let server = server(&env, None);

    let slots: Vec<AvailableSlot> = server
        .get("/slots")
        .add_query_param("consultation_type_id", "intro")
        .add_query_param("date", upcoming_monday().to_string())
        .await
        .json();
    assert_eq!(slots.len(), 6);
    assert_eq!(slots[0].start_time, at(upcoming_monday(), 9, 0));

    let missing_range = server
        .get("/slots")
        .add_query_param("consultation_type_id", "intro")
        .await;
    assert_eq!(missing_range.status_code(), StatusCode::BAD_REQUEST);

    let unknown_type = server
        .get("/slots")
        .add_query_param("consultation_type_id", "massage")
        .add_query_param("date", upcoming_monday().to_string())
        .await;
    assert_eq!(unknown_type.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = unknown_type.json();
    assert_eq!(body["error"]["message"], "Validation error");

    for offset in [i32::MIN, i32::MAX, 15 * 60] {
        let bad_offset = server
            .get("/slots")
            .add_query_param("consultation_type_id", "intro")
            .add_query_param("date", upcoming_monday().to_string())
            .add_query_param("utc_offset_minutes", offset)
            .await;
        assert_eq!(bad_offset.status_code(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_booking_conflict_and_cancellation() {
    let env = default_env();
    let server = server(&env, None);

    let response = server.post("/bookings").json(&booking_body(10, "a@example.com")).await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: BookingCreatedResponse = response.json();
    assert_eq!(created.status, BookingStatus::Confirmed);

    let duplicate = server.post("/bookings").json(&booking_body(10, "b@example.com")).await;
    assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
    // Other clients' booking ids stay private
    assert!(!duplicate.text().contains(&created.booking_id.to_string()));

    let without_body = server
        .post(&format!("/bookings/{}/cancel", created.booking_id))
        .await;
    assert_eq!(without_body.status_code(), StatusCode::FORBIDDEN);

    let without_token = server
        .post(&format!("/bookings/{}/cancel", created.booking_id))
        .json(&json!({}))
        .await;
    assert_eq!(without_token.status_code(), StatusCode::FORBIDDEN);

    let forged = server
        .post(&format!("/bookings/{}/cancel", created.booking_id))
        .json(&json!({"cancel_token": "forged"}))
        .await;
    assert_eq!(forged.status_code(), StatusCode::FORBIDDEN);

    let cancelled = server
        .post(&format!("/bookings/{}/cancel", created.booking_id))
        .json(&json!({"cancel_token": created.cancel_token}))
        .await;
    cancelled.assert_status_ok();
    let body: BookingStatusResponse = cancelled.json();
    assert_eq!(body.status, BookingStatus::Cancelled);

    let rebooked = server.post("/bookings").json(&booking_body(10, "b@example.com")).await;
    assert_eq!(rebooked.status_code(), StatusCode::CREATED);
}

#[tokio::test]
async fn test_invalid_booking_request() {
    let env = default_env();
    let response = server(&env, None)
        .post("/bookings")
        .json(&booking_body(10, "no-at-sign"))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_routes_require_configured_token() {
    let env = default_env();

    let hidden = server(&env, None).get("/admin/bookings").await;
    assert_eq!(hidden.status_code(), StatusCode::NOT_FOUND);

    let server = server(&env, Some(ADMIN_TOKEN));
    let anonymous = server.get("/admin/bookings").await;
    assert_eq!(anonymous.status_code(), StatusCode::UNAUTHORIZED);

    let wrong = server
        .get("/admin/bookings")
        .add_header(AUTHORIZATION, bearer("nope"))
        .await;
    assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_workflow() {
    let env = default_env();
    let server = server(&env, Some(ADMIN_TOKEN));

    let created: BookingCreatedResponse = server
        .post("/bookings")
        .json(&booking_body(9, "a@example.com"))
        .await
        .json();

    let listing: BookingListResponse = server
        .get("/admin/bookings")
        .add_query_param("page", 1)
        .add_query_param("page_size", 10)
        .add_header(AUTHORIZATION, bearer(ADMIN_TOKEN))
        .await
        .json();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.bookings[0].id, created.booking_id);

    // Listings never expose the cancel token
    let raw: Value = server
        .get("/admin/bookings")
        .add_header(AUTHORIZATION, bearer(ADMIN_TOKEN))
        .await
        .json();
    assert!(raw["bookings"][0].get("cancel_token").is_none());

    let premature = server
        .post(&format!("/admin/bookings/{}/status", created.booking_id))
        .add_header(AUTHORIZATION, bearer(ADMIN_TOKEN))
        .json(&json!({"status": "COMPLETED"}))
        .await;
    assert_eq!(premature.status_code(), StatusCode::BAD_REQUEST);

    let cancelled: BookingStatusResponse = server
        .post(&format!("/admin/bookings/{}/cancel", created.booking_id))
        .add_header(AUTHORIZATION, bearer(ADMIN_TOKEN))
        .await
        .json();
    assert_eq!(cancelled.status, BookingStatus::Cancelled);

    let missing = server
        .post(&format!("/admin/bookings/{}/cancel", uuid::Uuid::new_v4()))
        .add_header(AUTHORIZATION, bearer(ADMIN_TOKEN))
        .await;
    assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_schedule_reload() {
    let env = default_env();
    let server = server(&env, Some(ADMIN_TOKEN));

    let mut catalog = catalog();
    catalog.staff.truncate(1);
    catalog.working_hours.retain(|rule| rule.staff_id == "alice");
    std::fs::write(
        env.dir.path().join("schedule.json"),
        serde_json::to_string(&catalog).unwrap(),
    )
    .unwrap();

    let response = server
        .post("/admin/schedule/reload")
        .add_header(AUTHORIZATION, bearer(ADMIN_TOKEN))
        .await;
    response.assert_status_ok();

    let staff: Vec<Value> = server.get("/staff").await.json();
    assert_eq!(staff.len(), 1);

    // A broken file leaves the current catalog in place
    std::fs::write(env.dir.path().join("schedule.json"), "{ not json").unwrap();
    let broken = server
        .post("/admin/schedule/reload")
        .add_header(AUTHORIZATION, bearer(ADMIN_TOKEN))
        .await;
    assert_eq!(broken.status_code(), StatusCode::BAD_REQUEST);
    let staff: Vec<Value> = server.get("/staff").await.json();
    assert_eq!(staff.len(), 1);
}
