//! Scheduler trigger
//!
//! Invoked periodically by an external cron with the shared secret.

use crate::dto::SweepResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use chrono::Utc;
use prank_auth::CronCaller;
use prank_core::AppError;

pub async fn sweep(
    state: web::Data<AppState>,
    _cron: CronCaller,
) -> Result<HttpResponse, AppError> {
    let report = state.scheduler.sweep(Utc::now()).await?;

    Ok(HttpResponse::Ok().json(SweepResponse {
        processed: report.processed,
        succeeded: report.succeeded,
        failed: report.failed,
        cancelled: report.cancelled,
        provider: report.provider,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/scheduler/sweep", web::post().to(sweep));
}
