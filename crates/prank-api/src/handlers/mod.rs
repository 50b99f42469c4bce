//! HTTP request handlers

pub mod admin;
pub mod calls;
pub mod health;
pub mod payments;
pub mod scheduler;
pub mod webhooks;

use actix_web::web;

/// Register every route.
///
/// Expects `web::Data<AppState>`, `web::Data<Arc<JwtService>>` and
/// `web::Data<CronSecret>` in app data.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .configure(health::configure)
            .configure(calls::configure)
            .configure(payments::configure)
            .configure(scheduler::configure)
            .configure(admin::configure),
    )
    .configure(webhooks::configure);
}
