use std::sync::Arc;

use axum::{error_handling::HandleErrorLayer, http::StatusCode};
use tower::{BoxError, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use consultation_booking_service::{
    create_router,
    services::{
        booking::{BookingService, BookingSettings},
        calendar::{BusyPeriodSource, CalendarEventSink, NoCalendar},
        ledger::BookingLedger,
        notifications::{LogNotifier, NotificationDispatcher, WebhookNotifier},
        schedule::ScheduleStore,
        time_slots::{SlotGenerator, SlotRules},
    },
    AppConfig, AppState, CalendarClient,
};

// Error handler
async fn handle_error(error: BoxError) -> (StatusCode, String) {
    if error.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            "Request took too long".to_string(),
        )
    } else if error.is::<tower::load_shed::error::Overloaded>() {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service is overloaded, try again later".to_string(),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Unhandled internal error: {}", error),
        )
    }
}

fn fail_startup(message: &str, err: impl std::fmt::Display) -> ! {
    error!("{}: {}", message, err);
    std::process::exit(1)
}

#[tokio::main]
async fn main() {
    // Initialize tracing for logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::from_env().unwrap_or_else(|err| fail_startup("Invalid configuration", err));

    #[cfg(feature = "sentry-monitoring")]
    let _sentry_guard = std::env::var("SENTRY_DSN").ok().map(|dsn| {
        info!("Sentry error reporting enabled");
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(
                    if config.is_production { "production" } else { "development" }.into(),
                ),
                ..Default::default()
            },
        ))
    });

    if config.is_production {
        info!("Running in PRODUCTION mode");
    } else {
        info!("Running in DEVELOPMENT mode");
    }
    config.log_summary();

    // Initialize the booking ledger
    let ledger = Arc::new(
        BookingLedger::open(&config.ledger_path)
            .unwrap_or_else(|err| fail_startup("Failed to open booking ledger", err)),
    );
    info!("Booking ledger initialized");

    let schedule = Arc::new(
        ScheduleStore::load(&config.schedule_path)
            .unwrap_or_else(|err| fail_startup("Failed to load schedule catalog", err)),
    );

    // Calendar provider, or a no-op stand-in
    let (busy_source, event_sink): (Arc<dyn BusyPeriodSource>, Arc<dyn CalendarEventSink>) =
        match &config.calendar {
            Some(settings) => {
                let client = Arc::new(
                    CalendarClient::new(settings, config.side_effect_timeout)
                        .unwrap_or_else(|err| fail_startup("Failed to build calendar client", err)),
                );
                (
                    client.clone() as Arc<dyn BusyPeriodSource>,
                    client as Arc<dyn CalendarEventSink>,
                )
            }
            None => (
                Arc::new(NoCalendar) as Arc<dyn BusyPeriodSource>,
                Arc::new(NoCalendar) as Arc<dyn CalendarEventSink>,
            ),
        };

    let notifier: Arc<dyn NotificationDispatcher> = match &config.notification {
        Some(settings) => Arc::new(
            WebhookNotifier::new(settings, config.side_effect_timeout)
                .unwrap_or_else(|err| fail_startup("Failed to build notification client", err)),
        ),
        None => {
            warn!("Notifications will only be written to the log");
            Arc::new(LogNotifier)
        }
    };

    let slots = Arc::new(SlotGenerator::new(
        Arc::clone(&schedule),
        Arc::clone(&ledger),
        busy_source,
        SlotRules {
            step: config.slot_step,
            minimum_notice: config.minimum_notice,
            max_query_span: config.max_query_span,
        },
    ));

    let bookings = Arc::new(BookingService::new(
        Arc::clone(&schedule),
        Arc::clone(&ledger),
        Arc::clone(&slots),
        event_sink,
        notifier,
        BookingSettings {
            recency_window: config.recency_window,
            side_effect_timeout: config.side_effect_timeout,
        },
    ));

    let addr = config.bind_address;
    let request_timeout = config.request_timeout();

    // Create shared application state
    let app_state = Arc::new(AppState {
        config,
        schedule,
        slots,
        bookings,
    });

    let app = create_router(app_state).layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(handle_error))
            .load_shed()
            .concurrency_limit(64)
            .timeout(request_timeout)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::new().allow_origin(Any)),
    );

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|err| fail_startup("Failed to bind to address", err));

    // Set up signal handler for graceful shutdown
    let shutdown = async {
        let ctrl_c = async {
            tokio::signal::ctrl_c()
                .await
                .expect("Failed to install Ctrl+C handler");
        };

        #[cfg(unix)]
        let terminate = async {
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                .expect("Failed to install SIGTERM handler")
                .recv()
                .await;
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received interrupt signal, starting graceful shutdown");
            },
            _ = terminate => {
                info!("Received terminate signal, starting graceful shutdown");
            },
        }
    };

    info!("Server is ready to accept connections");
    if let Err(err) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
    {
        fail_startup("Server error", err);
    }

    info!("Server has been gracefully shut down");
}
