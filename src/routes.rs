use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::info;

use crate::handlers::api::{
    admin_cancel_booking, cancel_booking, create_booking, get_slots, health_check, list_bookings,
    list_consultation_types, list_staff, reload_schedule, update_booking_status, AppState,
};

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let mut router = Router::new();

    // Health check is always available
    let health_route = Router::new().route("/health", get(health_check));
    router = router.merge(health_route);

    // Public booking flow
    let public_routes = Router::new()
        .route("/consultation-types", get(list_consultation_types))
        .route("/staff", get(list_staff))
        .route("/slots", get(get_slots))
        .route("/bookings", post(create_booking))
        .route("/bookings/:booking_id/cancel", post(cancel_booking));
    router = router.merge(public_routes);

    // Only add admin routes when a bearer token is configured
    if app_state.config.admin_token.is_some() {
        let admin_routes = Router::new()
            .route("/admin/bookings", get(list_bookings))
            .route("/admin/bookings/:booking_id/status", post(update_booking_status))
            .route("/admin/bookings/:booking_id/cancel", post(admin_cancel_booking))
            .route("/admin/schedule/reload", post(reload_schedule));

        router = router.merge(admin_routes);

        info!("Admin API routes enabled");
    } else {
        info!("ADMIN_API_TOKEN not set - admin routes are not exposed");
    }

    router.with_state(app_state)
}
