use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, Response};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::auth::RequestSigner;
use crate::config::CalendarSettings;
use crate::error::UpstreamError;
use crate::models::booking::{Booking, TimeInterval};
use crate::models::schedule::{ConsultationType, StaffMember};
use crate::services::calendar::{BusyPeriodSource, CalendarEventRef, CalendarEventSink};

// Free/busy request and response types
#[derive(Debug, Serialize, Deserialize)]
pub struct FreeBusyRequest {
    pub calendar_id: String,
    pub time_min: DateTime<Utc>,
    pub time_max: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BusyPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FreeBusyResponse {
    #[serde(default)]
    pub busy: Vec<BusyPeriod>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEventRequest {
    pub summary: String,
    pub description: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub attendee_emails: Vec<String>,
    /// Booking id, so the provider can de-duplicate retries.
    pub external_reference: String,
    pub create_meeting_link: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateEventResponse {
    pub event_id: String,
    #[serde(default)]
    pub meeting_link: Option<String>,
}

/// Client for the external calendar provider's HTTP API
pub struct CalendarClient {
    client: Client,
    endpoint: String,
    signer: RequestSigner,
}

impl CalendarClient {
    pub fn new(settings: &CalendarSettings, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            signer: RequestSigner::new(settings.key_id.clone(), settings.secret.clone()),
        })
    }

    async fn send_signed(
        &self,
        method: Method,
        uri: &str,
        request_body: String,
    ) -> Result<Response, UpstreamError> {
        let url = format!("{}{}", self.endpoint, uri);

        debug!("API URL: {} {}", method, url);

        let mut request = self
            .client
            .request(method.clone(), &url)
            .header("Content-Type", "application/json");
        for (name, value) in self.signer.signed_headers(method.as_str(), uri, &request_body) {
            request = request.header(name, value);
        }

        let res = request.body(request_body).send().await?;
        info!("Calendar response received with status: {}", res.status());

        if !res.status().is_success() {
            return Err(UpstreamError::Status(res.status().as_u16()));
        }

        Ok(res)
    }

    async fn post_signed<B, R>(&self, uri: &str, body: &B) -> Result<R, UpstreamError>
    where
        B: Serialize + ?Sized,
        R: for<'de> Deserialize<'de>,
    {
        let request_body = serde_json::to_string(body)?;
        let res = self.send_signed(Method::POST, uri, request_body).await?;
        Ok(res.json::<R>().await?)
    }

    /// Query busy periods for one calendar.
    pub async fn query_free_busy(
        &self,
        calendar_id: &str,
        time_min: DateTime<Utc>,
        time_max: DateTime<Utc>,
    ) -> Result<FreeBusyResponse, UpstreamError> {
        let request = FreeBusyRequest {
            calendar_id: calendar_id.to_string(),
            time_min,
            time_max,
        };
        self.post_signed("/v1/freebusy", &request).await
    }

    /// Create an event in one calendar.
    pub async fn insert_event(
        &self,
        calendar_id: &str,
        request: &CreateEventRequest,
    ) -> Result<CreateEventResponse, UpstreamError> {
        let uri = format!("/v1/calendars/{}/events", calendar_id);
        self.post_signed(&uri, request).await
    }

    /// Remove an event from one calendar.
    pub async fn remove_event(&self, calendar_id: &str, event_id: &str) -> Result<(), UpstreamError> {
        let uri = format!("/v1/calendars/{}/events/{}", calendar_id, event_id);
        self.send_signed(Method::DELETE, &uri, String::new()).await?;
        Ok(())
    }
}

#[async_trait]
impl BusyPeriodSource for CalendarClient {
    async fn busy_periods(
        &self,
        staff: &StaffMember,
        window: TimeInterval,
    ) -> Result<Vec<TimeInterval>, UpstreamError> {
        let Some(calendar_id) = staff.calendar_id.as_deref() else {
            return Ok(Vec::new());
        };

        let response = self
            .query_free_busy(calendar_id, window.start, window.end)
            .await?;

        Ok(response
            .busy
            .into_iter()
            .filter_map(|period| {
                let interval = TimeInterval::new(period.start, period.end);
                if interval.is_none() {
                    debug!(
                        "Skipping malformed busy period {} - {} for staff {}",
                        period.start, period.end, staff.id
                    );
                }
                interval
            })
            .collect())
    }
}

#[async_trait]
impl CalendarEventSink for CalendarClient {
    async fn create_event(
        &self,
        booking: &Booking,
        staff: &StaffMember,
        consultation_type: &ConsultationType,
    ) -> Result<Option<CalendarEventRef>, UpstreamError> {
        let Some(calendar_id) = staff.calendar_id.as_deref() else {
            return Ok(None);
        };

        let request = CreateEventRequest {
            summary: format!("{} with {}", consultation_type.name, booking.client_name),
            description: booking.client_notes.clone(),
            start: booking.start_time,
            end: booking.end_time,
            attendee_emails: vec![booking.client_email.clone()],
            external_reference: booking.id.to_string(),
            create_meeting_link: true,
        };

        info!(
            "Creating calendar event for booking {} in calendar {}",
            booking.id, calendar_id
        );
        let response = self.insert_event(calendar_id, &request).await?;

        Ok(Some(CalendarEventRef {
            event_id: response.event_id,
            meeting_link: response.meeting_link,
        }))
    }

    async fn delete_event(&self, staff: &StaffMember, event_id: &str) -> Result<(), UpstreamError> {
        let Some(calendar_id) = staff.calendar_id.as_deref() else {
            return Ok(());
        };

        info!("Deleting calendar event {} from calendar {}", event_id, calendar_id);
        self.remove_event(calendar_id, event_id).await
    }
}
