//! Payment handlers

use crate::dto::{
    ApiResponse, CheckoutResponse, CreateCheckoutRequest, PackageResponse, StripeEvent,
    VerifyPaymentRequest,
};
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use prank_auth::AuthenticatedUser;
use prank_core::AppError;
use serde_json::json;
use tracing::{debug, instrument};
use validator::Validate;

pub async fn list_packages(state: web::Data<AppState>) -> HttpResponse {
    let packages: Vec<PackageResponse> = state
        .payments
        .catalog()
        .all()
        .iter()
        .map(PackageResponse::from)
        .collect();

    HttpResponse::Ok().json(ApiResponse::success(packages))
}

#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn create_checkout(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<CreateCheckoutRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let link = state
        .payments
        .create_checkout(
            user.user_id,
            user.email.clone(),
            &body.package_id,
            body.promo_code.as_deref(),
        )
        .await?;

    Ok(HttpResponse::Ok().json(CheckoutResponse {
        url: link.url,
        session_id: link.session_id,
    }))
}

/// Credit the caller for a completed checkout; safe to call repeatedly
#[instrument(skip(state, user, body), fields(user_id = %user.user_id))]
pub async fn verify_payment(
    state: web::Data<AppState>,
    user: AuthenticatedUser,
    body: web::Json<VerifyPaymentRequest>,
) -> Result<HttpResponse, AppError> {
    body.validate()?;

    let verification = state
        .payments
        .verify(user.user_id, &body.session_id)
        .await?;

    Ok(HttpResponse::Ok().json(verification))
}

/// Stripe events. Renewal invoices are re-read from Stripe before any
/// credit is granted; a failure answers with an error so Stripe redelivers.
#[instrument(skip_all, fields(event_type = %event.event_type))]
pub async fn stripe_events(
    state: web::Data<AppState>,
    event: web::Json<StripeEvent>,
) -> Result<HttpResponse, AppError> {
    if event.event_type == "invoice.paid" {
        let renewal = state.payments.apply_renewal(&event.data.object.id).await?;
        debug!(invoice_id = %event.data.object.id, ?renewal, "Invoice event handled");
    } else {
        debug!("Stripe event ignored");
    }

    Ok(HttpResponse::Ok().json(json!({ "received": true })))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/packages", web::get().to(list_packages)).service(
        web::scope("/payments")
            .route("/checkout", web::post().to(create_checkout))
            .route("/verify", web::post().to(verify_payment))
            .route("/webhook", web::post().to(stripe_events)),
    );
}
