use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::auth::RequestSigner;
use crate::config::NotificationSettings;
use crate::error::UpstreamError;
use crate::models::booking::{BookingStatus, BookingSummary};
use crate::models::schedule::{ConsultationType, StaffMember};

pub const SIGNATURE_HEADER: &str = "X-Booking-Signature";
pub const EVENT_HEADER: &str = "X-Booking-Event";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    BookingConfirmed,
    BookingPendingApproval,
    BookingCancelled,
    BookingCompleted,
    BookingNoShow,
}

impl NotificationKind {
    pub fn for_status(status: BookingStatus) -> Self {
        match status {
            BookingStatus::Confirmed => NotificationKind::BookingConfirmed,
            BookingStatus::PendingApproval => NotificationKind::BookingPendingApproval,
            BookingStatus::Cancelled => NotificationKind::BookingCancelled,
            BookingStatus::Completed => NotificationKind::BookingCompleted,
            BookingStatus::NoShow => NotificationKind::BookingNoShow,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::BookingConfirmed => "booking_confirmed",
            NotificationKind::BookingPendingApproval => "booking_pending_approval",
            NotificationKind::BookingCancelled => "booking_cancelled",
            NotificationKind::BookingCompleted => "booking_completed",
            NotificationKind::BookingNoShow => "booking_no_show",
        }
    }
}

/// Payload delivered for every booking lifecycle change.
///
/// Carries a [`BookingSummary`], never the cancel token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub kind: NotificationKind,
    pub booking: BookingSummary,
    pub staff: Option<StaffMember>,
    pub consultation_type: Option<ConsultationType>,
}

#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<(), UpstreamError>;
}

/// Posts signed JSON events to a webhook.
pub struct WebhookNotifier {
    client: Client,
    webhook_url: String,
    signer: RequestSigner,
}

impl WebhookNotifier {
    pub fn new(settings: &NotificationSettings, timeout: Duration) -> Result<Self, UpstreamError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            webhook_url: settings.webhook_url.clone(),
            signer: RequestSigner::new("webhook", settings.signing_secret.clone()),
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookNotifier {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<(), UpstreamError> {
        let body = serde_json::to_vec(event)?;
        let signature = format!("sha256={}", self.signer.payload_signature(&body));

        let res = self
            .client
            .post(&self.webhook_url)
            .header("Content-Type", "application/json")
            .header(SIGNATURE_HEADER, signature)
            .header(EVENT_HEADER, event.kind.as_str())
            .body(body)
            .send()
            .await?;

        if !res.status().is_success() {
            return Err(UpstreamError::Status(res.status().as_u16()));
        }

        info!(
            "Delivered {} notification for booking {}",
            event.kind.as_str(),
            event.booking.id
        );
        Ok(())
    }
}

/// Writes events to the log when no webhook is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl NotificationDispatcher for LogNotifier {
    async fn dispatch(&self, event: &NotificationEvent) -> Result<(), UpstreamError> {
        info!(
            "Notification {} for booking {} ({} <{}>) at {}",
            event.kind.as_str(),
            event.booking.id,
            event.booking.client_name,
            event.booking.client_email,
            event.booking.start_time
        );
        Ok(())
    }
}

/// Deliver `event` on a background task. Failures are logged only.
pub fn dispatch_in_background(
    dispatcher: Arc<dyn NotificationDispatcher>,
    event: NotificationEvent,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(err) = dispatcher.dispatch(&event).await {
            error!(
                "Failed to deliver {} notification for booking {}: {}",
                event.kind.as_str(),
                event.booking.id,
                err
            );
        }
    })
}
