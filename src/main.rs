//! Prank call service backend
//!
//! Serves the call lifecycle RPCs, the provider webhooks, the scheduler
//! trigger, payments, and the admin console.

use actix_cors::Cors;
use actix_web::{http::header, middleware, web, App, HttpResponse, HttpServer};
use prank_api::AppState;
use prank_auth::{CronSecret, JwtService};
use prank_core::{
    models::PackageCatalog,
    traits::{ModerationClient, ProviderSet},
    AppConfig,
};
use prank_db::{
    create_pool, run_migrations, PgAuditLogRepository, PgCallRequestRepository, PgCreditLedger,
    PgPaymentRecordRepository, PgProfileRepository, PgPromoCodeRepository,
    PgRevealNotificationRepository, PgSettingsRepository,
};
use prank_providers::{
    LlmModerationClient, ProviderError, StripeClient, TwilioSmsClient, TwilioVoiceClient,
    VapiClient,
};
use prank_services::{
    CallDispatcher, ContentModerator, PaymentService, RevealNotifier, SchedulerSweep,
    SettingsService, StatusReconciler,
};
use std::env;
use std::io;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing/logging
fn init_tracing() {
    let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "prank_server={lvl},prank_api={lvl},prank_services={lvl},prank_providers={lvl},prank_db={lvl},actix_web=info,sqlx=warn",
            lvl = log_level
        ))
    });

    let json = env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_current_span(true)).init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init();
    }
}

fn startup_error(context: &str, err: impl std::fmt::Display) -> io::Error {
    error!("{}: {}", context, err);
    io::Error::other(format!("{}: {}", context, err))
}

fn provider_error(provider: &str, err: ProviderError) -> io::Error {
    startup_error(&format!("Failed to build {} client", provider), err)
}

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    info!(
        "Starting prank call service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = AppConfig::load().map_err(|e| startup_error("Invalid configuration", e))?;

    info!("Connecting to database...");
    let pool = create_pool(&config.database.url, Some(config.database.max_connections))
        .await
        .map_err(|e| startup_error("Failed to create database pool", e))?;

    if config.database.run_migrations {
        run_migrations(&pool)
            .await
            .map_err(|e| startup_error("Failed to run migrations", e))?;
    }

    // Repositories
    let calls = Arc::new(PgCallRequestRepository::new(pool.clone()));
    let ledger = Arc::new(PgCreditLedger::new(pool.clone()));
    let settings_repo = Arc::new(PgSettingsRepository::new(pool.clone()));
    let profiles = Arc::new(PgProfileRepository::new(pool.clone()));
    let reveals = Arc::new(PgRevealNotificationRepository::new(pool.clone()));
    let payment_records = Arc::new(PgPaymentRecordRepository::new(pool.clone()));
    let promos = Arc::new(PgPromoCodeRepository::new(pool.clone()));
    let audit = Arc::new(PgAuditLogRepository::new(pool.clone()));

    // Provider clients
    let twilio = TwilioVoiceClient::new(&config.twilio, &config.http)
        .map_err(|e| provider_error("twilio", e))?;
    let vapi = VapiClient::new(&config.vapi, &config.http).map_err(|e| provider_error("vapi", e))?;
    let sms = TwilioSmsClient::new(&config.twilio, &config.http)
        .map_err(|e| provider_error("twilio sms", e))?;
    let stripe = StripeClient::new(&config.stripe, &config.http)
        .map_err(|e| provider_error("stripe", e))?;

    let classifier: Option<Arc<dyn ModerationClient>> = match &config.moderation.gateway_url {
        Some(_) => Some(Arc::new(
            LlmModerationClient::new(&config.moderation, &config.http)
                .map_err(|e| provider_error("moderation", e))?,
        )),
        None => {
            warn!("No moderation gateway configured, using keyword rules only");
            None
        }
    };

    let providers = ProviderSet::new()
        .with(Arc::new(twilio))
        .with(Arc::new(vapi));

    // Services
    let moderator = Arc::new(ContentModerator::new(
        classifier,
        &config.moderation.extra_keywords,
    ));
    let dispatcher = Arc::new(CallDispatcher::new(
        calls.clone(),
        ledger.clone(),
        settings_repo.clone(),
        providers.clone(),
        moderator.clone(),
    ));
    let notifier = Arc::new(RevealNotifier::new(reveals, profiles, Arc::new(sms)));
    let reconciler = Arc::new(StatusReconciler::new(
        calls.clone(),
        ledger.clone(),
        settings_repo.clone(),
        providers,
        notifier,
    ));
    let scheduler = Arc::new(SchedulerSweep::new(
        calls.clone(),
        settings_repo.clone(),
        dispatcher.clone(),
    ));
    let payments = Arc::new(PaymentService::new(
        Arc::new(stripe),
        ledger.clone(),
        promos,
        PackageCatalog::new(config.catalog.packages.clone()),
    ));
    let settings = Arc::new(SettingsService::new(settings_repo, audit.clone()));

    let state = AppState {
        dispatcher,
        reconciler,
        scheduler,
        moderator,
        payments,
        settings,
        calls,
        ledger,
        payment_records,
        audit,
        media_stream_url: config.twilio.media_stream_url.clone(),
    };

    let jwt_service = Arc::new(JwtService::new(
        &config.auth.jwt_secret,
        config.auth.jwt_expiration_secs,
    ));
    let cron_secret = CronSecret::new(config.auth.cron_secret.clone());
    if config.auth.cron_secret.trim().is_empty() {
        warn!("auth.cron_secret is empty, the scheduler trigger will reject every call");
    }

    let cors_origins = config.server.cors_origins.clone();
    let bind_addr = config.server_addr();
    let workers = config.server.workers;

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new(move || {
        let cors_origins_inner = cors_origins.clone();
        let cors = Cors::default()
            .allowed_origin_fn(move |origin, _req_head| {
                origin
                    .to_str()
                    .map(|origin| {
                        cors_origins_inner
                            .split(',')
                            .any(|allowed| allowed.trim() == origin)
                    })
                    .unwrap_or(false)
            })
            .allowed_methods(vec!["GET", "POST", "PUT", "OPTIONS"])
            .allowed_headers(vec![
                header::AUTHORIZATION,
                header::ACCEPT,
                header::CONTENT_TYPE,
            ])
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::new(cron_secret.clone()))
            .app_data(web::JsonConfig::default().limit(256 * 1024))
            .wrap(cors)
            .wrap(TracingLogger::default())
            .wrap(middleware::NormalizePath::trim())
            .configure(prank_api::configure)
            .route(
                "/",
                web::get().to(|| async {
                    HttpResponse::Found()
                        .append_header(("Location", "/api/v1/health"))
                        .finish()
                }),
            )
    });

    let server = if workers > 0 {
        server.workers(workers)
    } else {
        server
    };

    server.bind(&bind_addr)?.run().await
}
