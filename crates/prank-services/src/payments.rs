//! Payment Gateway Bridge
//!
//! Creates checkout sessions for catalog packages and turns completed
//! sessions into credit grants. Verification fails closed: a session whose
//! metadata names another user never credits the caller. Grants are
//! idempotent per session id in the ledger, so verifying twice is a no-op.
//!
//! Subscriptions are credited again each period from the gateway's
//! `invoice.paid` notification. The invoice is fetched back from the gateway
//! rather than trusted from the notification body, and the invoice id is the
//! grant key.

use chrono::Utc;
use prank_core::{
    models::{CheckoutRequest, GrantOutcome, PackageCatalog, PaymentGrant, PromoCode},
    traits::{CreditLedger, PaymentGateway, PromoCodeRepository},
    AppError, AppResult,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutLink {
    pub url: String,
    pub session_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentVerification {
    pub success: bool,
    pub credits_added: i32,
    pub total_credits: i32,
    pub already_processed: bool,
}

pub struct PaymentService {
    gateway: Arc<dyn PaymentGateway>,
    ledger: Arc<dyn CreditLedger>,
    promos: Arc<dyn PromoCodeRepository>,
    catalog: PackageCatalog,
}

impl PaymentService {
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: Arc<dyn CreditLedger>,
        promos: Arc<dyn PromoCodeRepository>,
        catalog: PackageCatalog,
    ) -> Self {
        Self {
            gateway,
            ledger,
            promos,
            catalog,
        }
    }

    pub fn catalog(&self) -> &PackageCatalog {
        &self.catalog
    }

    /// Open a checkout session for `package_id`.
    ///
    /// A promo code is validated before any coupon is created; its use is
    /// only counted once the session is verified.
    #[instrument(skip(self, customer_email))]
    pub async fn create_checkout(
        &self,
        user_id: Uuid,
        customer_email: Option<String>,
        package_id: &str,
        promo_code: Option<&str>,
    ) -> AppResult<CheckoutLink> {
        let package = self
            .catalog
            .find(package_id)
            .cloned()
            .ok_or_else(|| AppError::Validation(format!("Unknown package '{}'", package_id)))?;

        let promo_code = promo_code
            .map(PromoCode::normalize)
            .filter(|code| !code.is_empty());

        let coupon_id = match &promo_code {
            Some(code) => {
                let promo = self.promos.find_by_code(code).await?.ok_or_else(|| {
                    AppError::Validation(format!("Promo code '{}' does not exist", code))
                })?;
                promo.check_usable(Utc::now())?;
                let label = format!("{} -{}%", promo.code, promo.percent_off);
                Some(self.gateway.create_coupon(promo.percent_off, &label).await?)
            }
            None => None,
        };

        let session = self
            .gateway
            .create_checkout_session(&CheckoutRequest {
                user_id,
                package,
                customer_email,
                coupon_id,
                promo_code,
            })
            .await?;

        let url = session.url.clone().ok_or_else(|| {
            AppError::provider("stripe", "Checkout session was created without a URL")
        })?;

        info!(session_id = %session.id, package_id, "Checkout session created");
        Ok(CheckoutLink {
            url,
            session_id: session.id,
        })
    }

    /// Credit the caller for a completed session
    #[instrument(skip(self))]
    pub async fn verify(&self, user_id: Uuid, session_id: &str) -> AppResult<PaymentVerification> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(AppError::MissingField("sessionId".to_string()));
        }

        let session = self.gateway.retrieve_session(session_id).await?;

        if !session.belongs_to(user_id) {
            warn!(
                session_owner = ?session.metadata_user_id,
                "Payment session verified by a different user"
            );
            return Err(AppError::Forbidden);
        }

        if !session.paid {
            return Err(AppError::PaymentNotCompleted(session_id.to_string()));
        }

        let package_id = session.metadata_package_id.clone().unwrap_or_default();
        let package = self.catalog.find(&package_id).ok_or_else(|| {
            AppError::Internal(format!(
                "Session {} references unknown package '{}'",
                session_id, package_id
            ))
        })?;

        let outcome = self
            .ledger
            .grant_for_payment(&PaymentGrant {
                session_id: session_id.to_string(),
                user_id,
                package_id: package.id.clone(),
                credits: package.credits,
                amount_cents: session.amount_total,
                promo_code: session
                    .metadata_promo_code
                    .clone()
                    .filter(|code| !code.trim().is_empty()),
            })
            .await?;

        let already_processed = matches!(outcome, GrantOutcome::AlreadyGranted { .. });
        info!(
            credits_added = outcome.credits_added(),
            total = outcome.total(),
            already_processed,
            "Payment verified"
        );

        Ok(PaymentVerification {
            success: true,
            credits_added: outcome.credits_added(),
            total_credits: outcome.total(),
            already_processed,
        })
    }
}

impl PaymentService {
    /// Credit a paid subscription renewal. Returns `None` for invoices that
    /// are not renewals (the first period is credited by `verify`).
    #[instrument(skip(self))]
    pub async fn apply_renewal(&self, invoice_id: &str) -> AppResult<Option<PaymentVerification>> {
        let invoice_id = invoice_id.trim();
        if invoice_id.is_empty() {
            return Err(AppError::MissingField("invoice id".to_string()));
        }

        let invoice = self.gateway.retrieve_invoice(invoice_id).await?;
        if !invoice.is_paid_renewal() {
            debug!(
                paid = invoice.paid,
                billing_reason = ?invoice.billing_reason,
                "Invoice is not a paid renewal, ignored"
            );
            return Ok(None);
        }

        let user_id = invoice.owner().ok_or_else(|| {
            AppError::Internal(format!("Invoice {} carries no subscriber", invoice_id))
        })?;
        let package_id = invoice.metadata_package_id.clone().unwrap_or_default();
        let package = self
            .catalog
            .find(&package_id)
            .filter(|package| package.recurring)
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "Invoice {} references unknown subscription '{}'",
                    invoice_id, package_id
                ))
            })?;

        let outcome = self
            .ledger
            .grant_for_payment(&PaymentGrant {
                session_id: invoice_id.to_string(),
                user_id,
                package_id: package.id.clone(),
                credits: package.credits,
                amount_cents: invoice.amount_paid,
                promo_code: None,
            })
            .await?;

        let already_processed = matches!(outcome, GrantOutcome::AlreadyGranted { .. });
        info!(
            user_id = %user_id,
            credits_added = outcome.credits_added(),
            total = outcome.total(),
            already_processed,
            "Subscription renewal credited"
        );

        Ok(Some(PaymentVerification {
            success: true,
            credits_added: outcome.credits_added(),
            total_credits: outcome.total(),
            already_processed,
        }))
    }
}
