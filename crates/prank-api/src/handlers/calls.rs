//! Call lifecycle handlers
//!
//! Dispatch, end call, the caller's call view and credit balance, and the
//! pre-submission content check.

use crate::dto::{
    ApiResponse, CallRequestResponse, ContentCheckRequest, ContentCheckResponse, CreditsResponse,
    DispatchCallRequest, DispatchCallResponse, EndCallRequest, EndCallResponse,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use prank_auth::AuthenticatedUser;
use prank_core::{models::ModerationVerdict, AppError};
use prank_services::EndCallTarget;
use tracing::{info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

/// Place the call for a pending request owned by the caller
#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn dispatch_call(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<DispatchCallRequest>,
) -> Result<HttpResponse, AppError> {
    let result = state
        .dispatcher
        .dispatch(body.call_request_id, Some(user.user_id))
        .await?;

    Ok(HttpResponse::Ok().json(DispatchCallResponse {
        success: true,
        call_request_id: result.call_request_id,
        provider: result.provider,
        provider_call_id: result.provider_call_id,
    }))
}

/// End a running call, or cancel one that never started
#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn end_call(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<EndCallRequest>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let owner = if user.is_admin() {
        None
    } else {
        Some(user.user_id)
    };

    let result = state
        .reconciler
        .end_call(
            &EndCallTarget {
                call_request_id: body.call_request_id,
                provider_call_id: body.provider_call_id,
            },
            owner,
        )
        .await?;

    Ok(HttpResponse::Ok().json(EndCallResponse {
        success: true,
        status: result.status,
        message: result.message,
    }))
}

pub async fn get_call(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let call = state
        .calls
        .find_by_id(id)
        .await?
        .filter(|call| user.is_admin() || call.user_id == user.user_id)
        .ok_or_else(|| AppError::CallRequestNotFound(id.to_string()))?;

    Ok(HttpResponse::Ok().json(ApiResponse::success(CallRequestResponse::from(call))))
}

pub async fn get_credits(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
    let prank_credits = state.ledger.balance(user.user_id).await?;

    Ok(HttpResponse::Ok().json(CreditsResponse {
        user_id: user.user_id,
        prank_credits,
    }))
}

/// Content gate for a theme before it is saved.
///
/// Internal failures approve the content.
pub async fn check_content(
    state: web::Data<AppState>,
    _user: AuthenticatedUser,
    body: web::Json<ContentCheckRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let verdict = match state.moderator.check(&body.to_check()).await {
        Ok(verdict) => verdict,
        Err(e) => {
            warn!(error = %e, "Content check failed, approving");
            ModerationVerdict::approve()
        }
    };

    if verdict.blocked {
        info!(category = ?verdict.category, "Content blocked");
    }

    Ok(HttpResponse::Ok().json(ContentCheckResponse::from(verdict)))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/calls")
            .route("/dispatch", web::post().to(dispatch_call))
            .route("/end", web::post().to(end_call))
            .route("/{id}", web::get().to(get_call)),
    )
    .route("/credits", web::get().to(get_credits))
    .route("/content/check", web::post().to(check_content));
}
