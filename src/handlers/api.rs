use axum::{
    extract::{Json as ExtractJson, Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    response::Json,
};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, TimeZone, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::AdminClaims;
use crate::config::AppConfig;
use crate::error::{BookingError, BookingResult};
use crate::models::booking::{AvailableSlot, ClientInfo};
use crate::models::common::{
    BookingCreatedResponse, BookingListResponse, BookingStatusResponse, CancelBookingRequest,
    CreateBookingRequest, PaginationParams, SlotQueryParams, StaffListing, StatusUpdateRequest,
};
use crate::models::schedule::{ConsultationType, MAX_UTC_OFFSET_MINUTES};
use crate::services::booking::{AdmissionRequest, BookingService, MAX_PAGE_SIZE};
use crate::services::schedule::ScheduleStore;
use crate::services::time_slots::SlotGenerator;

// AppState struct containing shared resources
pub struct AppState {
    pub config: AppConfig,
    pub schedule: Arc<ScheduleStore>,
    pub slots: Arc<SlotGenerator>,
    pub bookings: Arc<BookingService>,
}

impl AppState {
    fn admin_claims(&self, headers: &HeaderMap) -> BookingResult<AdminClaims> {
        let authorization = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok());

        AdminClaims::verify(authorization, self.config.admin_token.as_deref()).map_err(|err| {
            warn!("Rejected admin request: missing or invalid bearer token");
            err
        })
    }
}

// Health check endpoint
pub async fn health_check() -> &'static str {
    "OK"
}

// List consultation types endpoint
pub async fn list_consultation_types(
    State(state): State<Arc<AppState>>,
) -> Json<Vec<ConsultationType>> {
    Json(state.schedule.active_consultation_types())
}

// List staff endpoint
pub async fn list_staff(State(state): State<Arc<AppState>>) -> Json<Vec<StaffListing>> {
    let staff = state
        .schedule
        .active_staff()
        .into_iter()
        .map(|member| StaffListing {
            id: member.id,
            name: member.name,
        })
        .collect();

    Json(staff)
}

// Available slots endpoint
pub async fn get_slots(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SlotQueryParams>,
) -> BookingResult<Json<Vec<AvailableSlot>>> {
    let (range_start, range_end) = resolve_range(&params)?;

    info!(
        "Received slot query for consultation type {} between {} and {}",
        params.consultation_type_id, range_start, range_end
    );

    let slots = state
        .slots
        .compute_shared_availability(
            &params.consultation_type_id,
            params.staff_id.as_deref(),
            range_start,
            range_end,
            Utc::now(),
        )
        .await?;

    Ok(Json(slots))
}

// Create booking endpoint
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    ExtractJson(request): ExtractJson<CreateBookingRequest>,
) -> BookingResult<(StatusCode, Json<BookingCreatedResponse>)> {
    info!(
        "Received booking request for staff {} at {}",
        request.staff_id, request.start_time
    );

    let admission = AdmissionRequest {
        staff_id: request.staff_id,
        consultation_type_id: request.consultation_type_id,
        start_time: request.start_time,
        end_time: request.end_time,
        client: ClientInfo {
            name: request.client_name,
            email: request.client_email,
            phone: request.client_phone,
            notes: request.client_notes,
        },
    };

    let booking = state.bookings.admit_booking(admission, Utc::now()).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookingCreatedResponse {
            booking_id: booking.id,
            cancel_token: booking.cancel_token,
            status: booking.status,
            start_time: booking.start_time,
            end_time: booking.end_time,
            meeting_link: booking.meeting_link,
        }),
    ))
}

// Cancel booking endpoint, authorised by the cancel token
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    Path(booking_id): Path<Uuid>,
    request: Option<ExtractJson<CancelBookingRequest>>,
) -> BookingResult<Json<BookingStatusResponse>> {
    info!("Received cancellation request for booking {}", booking_id);

    // A missing or unreadable body carries no token
    let cancel_token = request.and_then(|ExtractJson(body)| body.cancel_token);

    let booking = state
        .bookings
        .cancel_booking(booking_id, cancel_token.as_deref(), Utc::now())
        .await?;

    Ok(Json(BookingStatusResponse {
        booking_id: booking.id,
        status: booking.status,
    }))
}

// Admin: list bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(params): Query<PaginationParams>,
) -> BookingResult<Json<BookingListResponse>> {
    let claims = state.admin_claims(&headers)?;

    let (total, bookings) = state
        .bookings
        .list_bookings(&claims, params.page, params.page_size)?;

    Ok(Json(BookingListResponse {
        total,
        page: params.page,
        page_size: params.page_size.clamp(1, MAX_PAGE_SIZE),
        bookings,
    }))
}

// Admin: change booking status
pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<Uuid>,
    ExtractJson(request): ExtractJson<StatusUpdateRequest>,
) -> BookingResult<Json<BookingStatusResponse>> {
    let claims = state.admin_claims(&headers)?;

    let booking = state
        .bookings
        .update_status(&claims, booking_id, request.status, Utc::now())
        .await?;

    Ok(Json(BookingStatusResponse {
        booking_id: booking.id,
        status: booking.status,
    }))
}

// Admin: cancel without a token
pub async fn admin_cancel_booking(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(booking_id): Path<Uuid>,
) -> BookingResult<Json<BookingStatusResponse>> {
    let claims = state.admin_claims(&headers)?;

    let booking = state
        .bookings
        .admin_cancel(&claims, booking_id, Utc::now())
        .await?;

    Ok(Json(BookingStatusResponse {
        booking_id: booking.id,
        status: booking.status,
    }))
}

// Admin: re-read the schedule catalog from disk
pub async fn reload_schedule(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> BookingResult<Json<Value>> {
    let claims = state.admin_claims(&headers)?;

    state
        .bookings
        .reload_schedule(&claims, &state.config.schedule_path)?;

    Ok(Json(json!({
        "status": "reloaded",
        "staff": state.schedule.active_staff().len(),
        "consultation_types": state.schedule.active_consultation_types().len(),
    })))
}

/// Turn the query into a UTC range: a whole local day, or explicit bounds.
fn resolve_range(params: &SlotQueryParams) -> BookingResult<(DateTime<Utc>, DateTime<Utc>)> {
    match (params.date, params.from, params.to) {
        (Some(date), None, None) => local_day(date, params.utc_offset_minutes.unwrap_or(0)),
        (None, Some(from), Some(to)) => Ok((from, to)),
        _ => Err(BookingError::Validation(
            "provide either date or both from and to".into(),
        )),
    }
}

fn local_day(date: NaiveDate, utc_offset_minutes: i32) -> BookingResult<(DateTime<Utc>, DateTime<Utc>)> {
    let invalid_offset = || {
        BookingError::Validation(format!(
            "utc_offset_minutes {} outside +/-{}",
            utc_offset_minutes, MAX_UTC_OFFSET_MINUTES
        ))
    };

    if !(-MAX_UTC_OFFSET_MINUTES..=MAX_UTC_OFFSET_MINUTES).contains(&utc_offset_minutes) {
        return Err(invalid_offset());
    }
    let offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(invalid_offset)?;

    let midnight = date
        .and_hms_opt(0, 0, 0)
        .and_then(|local| offset.from_local_datetime(&local).single())
        .ok_or_else(|| BookingError::Validation(format!("invalid date {}", date)))?
        .with_timezone(&Utc);

    Ok((midnight, midnight + Duration::days(1)))
}
