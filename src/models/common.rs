use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::booking::{BookingStatus, BookingSummary};

// Define pagination query parameters
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

pub fn default_page() -> usize {
    1
}

pub fn default_page_size() -> usize {
    20
}

/// Query string for `GET /slots`: either a local `date` or an explicit `from`/`to` range.
#[derive(Debug, Deserialize)]
pub struct SlotQueryParams {
    pub consultation_type_id: String,
    #[serde(default)]
    pub staff_id: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub utc_offset_minutes: Option<i32>,
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    pub staff_id: String,
    pub consultation_type_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub client_name: String,
    pub client_email: String,
    #[serde(default)]
    pub client_phone: Option<String>,
    #[serde(default)]
    pub client_notes: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingCreatedResponse {
    pub booking_id: Uuid,
    pub cancel_token: String,
    pub status: BookingStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub meeting_link: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub cancel_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingStatusResponse {
    pub booking_id: Uuid,
    pub status: BookingStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: BookingStatus,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingListResponse {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
    pub bookings: Vec<BookingSummary>,
}

/// Public staff listing entry.
#[derive(Debug, Serialize, Deserialize)]
pub struct StaffListing {
    pub id: String,
    pub name: String,
}
