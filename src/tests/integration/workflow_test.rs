use axum::http::{header::AUTHORIZATION, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};

use crate::models::booking::{AvailableSlot, BookingStatus};
use crate::models::common::{BookingCreatedResponse, BookingListResponse};
use crate::routes::create_router;
use crate::services::notifications::NotificationKind;
use crate::tests::common::fixtures::*;

async fn slots_for(server: &TestServer, type_id: &str) -> Vec<AvailableSlot> {
    server
        .get("/slots")
        .add_query_param("consultation_type_id", type_id)
        .add_query_param("date", upcoming_monday().to_string())
        .await
        .json()
}

/// Browse, book, cancel and rebook through the HTTP surface.
#[tokio::test]
async fn test_booking_lifecycle() {
    let env = default_env();
    let server = TestServer::new(create_router(env.app_state(Some(ADMIN_TOKEN)))).unwrap();
    let admin = HeaderValue::from_str(&format!("Bearer {}", ADMIN_TOKEN)).unwrap();

    let types: Vec<Value> = server.get("/consultation-types").await.json();
    assert!(types.iter().any(|t| t["id"] == "buffered"));

    let before = slots_for(&server, "intro").await;
    let ten = before
        .iter()
        .find(|slot| slot.start_time == at(upcoming_monday(), 10, 0))
        .cloned()
        .unwrap();
    assert_eq!(ten.available_staff, vec!["alice", "bob"]);

    // Book Bob at ten
    let response = server
        .post("/bookings")
        .json(&json!({
            "staff_id": "bob",
            "consultation_type_id": "intro",
            "start_time": ten.start_time,
            "end_time": ten.end_time,
            "client_name": "Robin Reader",
            "client_email": "robin@example.com",
            "client_notes": "Second opinion",
        }))
        .await;
    assert_eq!(response.status_code(), StatusCode::CREATED);
    let created: BookingCreatedResponse = response.json();

    let after = slots_for(&server, "intro").await;
    let ten_after = after
        .iter()
        .find(|slot| slot.start_time == ten.start_time)
        .unwrap();
    assert_eq!(ten_after.available_staff, vec!["alice"]);

    // A buffered type around Bob's booking loses the neighbouring starts
    let buffered = slots_for(&server, "buffered").await;
    assert!(buffered
        .iter()
        .filter(|slot| slot.available_staff.contains(&"bob".to_string()))
        .all(|slot| slot.end_time + chrono::Duration::minutes(5) <= ten.start_time
            || slot.start_time - chrono::Duration::minutes(5) >= ten.end_time));

    let cancel = server
        .post(&format!("/bookings/{}/cancel", created.booking_id))
        .json(&json!({"cancel_token": created.cancel_token}))
        .await;
    cancel.assert_status_ok();

    let restored = slots_for(&server, "intro").await;
    assert_eq!(restored, before);

    let listing: BookingListResponse = server
        .get("/admin/bookings")
        .add_header(AUTHORIZATION, admin)
        .await
        .json();
    assert_eq!(listing.total, 1);
    assert_eq!(listing.bookings[0].status, BookingStatus::Cancelled);
    assert_eq!(listing.bookings[0].client_notes.as_deref(), Some("Second opinion"));

    let kinds: Vec<_> = env
        .notifier
        .wait_for_events(2)
        .await
        .iter()
        .map(|event| event.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![NotificationKind::BookingConfirmed, NotificationKind::BookingCancelled]
    );
}
