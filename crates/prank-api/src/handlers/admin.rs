//! Admin console handlers
//!
//! Runtime settings, the audit trail, and reconciled payments. Admin role
//! required.

use crate::dto::{
    ApiResponse, AuditLogResponse, PaginationParams, PaymentRecordResponse, SettingsResponse,
    UpdateSettingsRequest,
};
use crate::state::AppState;
use actix_web::{web, HttpRequest, HttpResponse};
use prank_auth::AdminUser;
use prank_core::AppError;
use prank_services::SettingsActor;
use tracing::{debug, info};
use validator::Validate;

pub async fn get_settings(
    state: web::Data<AppState>,
    _admin: AdminUser,
) -> Result<HttpResponse, AppError> {
    let settings = state.settings.current().await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(SettingsResponse::from(settings))))
}

pub async fn update_settings(
    state: web::Data<AppState>,
    admin: AdminUser,
    req: HttpRequest,
    body: web::Json<UpdateSettingsRequest>,
) -> Result<HttpResponse, AppError> {
    let actor = SettingsActor {
        user_id: admin.user_id,
        actor: admin.actor(),
        ip_address: req
            .connection_info()
            .realip_remote_addr()
            .map(str::to_string),
    };

    let changed_keys = body.settings.len();
    let settings = state
        .settings
        .update(&actor, body.into_inner().settings)
        .await?;

    info!(admin = %actor.actor, changed_keys, "Settings updated");

    Ok(HttpResponse::Ok().json(ApiResponse::with_message(
        SettingsResponse::from(settings),
        "Settings updated successfully",
    )))
}

pub async fn list_audit_logs(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate()?;
    debug!(page = query.page, "Listing audit logs");

    let (logs, total) = state.audit.list(query.limit(), query.offset()).await?;
    let logs = logs.into_iter().map(AuditLogResponse::from).collect();

    Ok(HttpResponse::Ok().json(query.paginate(logs, total)))
}

pub async fn list_payments(
    state: web::Data<AppState>,
    _admin: AdminUser,
    query: web::Query<PaginationParams>,
) -> Result<HttpResponse, AppError> {
    query.validate()?;

    let (records, total) = state
        .payment_records
        .list(query.limit(), query.offset())
        .await?;
    let records = records
        .into_iter()
        .map(PaymentRecordResponse::from)
        .collect();

    Ok(HttpResponse::Ok().json(query.paginate(records, total)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/admin")
            .route("/settings", web::get().to(get_settings))
            .route("/settings", web::put().to(update_settings))
            .route("/audit-logs", web::get().to(list_audit_logs))
            .route("/payments", web::get().to(list_payments)),
    );
}
