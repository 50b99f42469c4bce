//! Stripe Checkout

use crate::error::ProviderError;
use crate::http::{build_client, send_json};
use async_trait::async_trait;
use prank_core::{
    config::{HttpConfig, StripeConfig},
    models::{CheckoutRequest, CheckoutSession, Invoice},
    traits::PaymentGateway,
    AppError,
};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};

const PROVIDER: &str = "stripe";

/// Stripe implementation of `PaymentGateway`
pub struct StripeClient {
    http: Client,
    config: StripeConfig,
    timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
struct SessionResource {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    amount_total: Option<i64>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl From<SessionResource> for CheckoutSession {
    fn from(session: SessionResource) -> Self {
        let paid = is_paid(session.status.as_deref(), session.payment_status.as_deref());
        let mut metadata = session.metadata;
        Self {
            id: session.id,
            url: session.url,
            paid,
            amount_total: session.amount_total,
            metadata_user_id: metadata.remove("user_id"),
            metadata_package_id: metadata.remove("package_id"),
            metadata_promo_code: metadata.remove("promo_code").filter(|c| !c.is_empty()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SubscriptionDetails {
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct InvoiceParent {
    #[serde(default)]
    subscription_details: Option<SubscriptionDetails>,
}

#[derive(Debug, Deserialize)]
struct InvoiceResource {
    id: String,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    billing_reason: Option<String>,
    #[serde(default)]
    amount_paid: Option<i64>,
    #[serde(default)]
    subscription_details: Option<SubscriptionDetails>,
    /// Newer API versions nest the subscription details here
    #[serde(default)]
    parent: Option<InvoiceParent>,
}

impl From<InvoiceResource> for Invoice {
    fn from(invoice: InvoiceResource) -> Self {
        let mut metadata = invoice
            .subscription_details
            .or_else(|| invoice.parent.and_then(|p| p.subscription_details))
            .unwrap_or_default()
            .metadata;
        Self {
            id: invoice.id,
            paid: invoice.status.as_deref() == Some("paid"),
            billing_reason: invoice.billing_reason,
            amount_paid: invoice.amount_paid,
            metadata_user_id: metadata.remove("user_id"),
            metadata_package_id: metadata.remove("package_id"),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CouponResource {
    id: String,
}

/// Paid one-time sessions, or completed sessions that needed no payment
/// (100% discount, trial subscriptions)
fn is_paid(status: Option<&str>, payment_status: Option<&str>) -> bool {
    match (status, payment_status) {
        (_, Some("paid")) => true,
        (Some("complete"), Some("no_payment_required")) => true,
        _ => false,
    }
}

impl StripeClient {
    pub fn new(config: &StripeConfig, http: &HttpConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            http: build_client(http.timeout_secs)?,
            config: config.clone(),
            timeout_secs: http.timeout_secs,
        })
    }

    fn check_credentials(&self) -> Result<(), ProviderError> {
        if self.config.secret_key.trim().is_empty() {
            return Err(ProviderError::Config("secret_key is required".to_string()));
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base_url.trim_end_matches('/'), path)
    }

    /// Form parameters for `POST /checkout/sessions`
    fn session_params(&self, request: &CheckoutRequest) -> Vec<(String, String)> {
        let package = &request.package;
        let mode = if package.recurring {
            "subscription"
        } else {
            "payment"
        };

        let mut params: Vec<(String, String)> = vec![
            ("mode".into(), mode.into()),
            (
                "success_url".into(),
                format!(
                    "{}?session_id={{CHECKOUT_SESSION_ID}}",
                    self.config.success_url
                ),
            ),
            ("cancel_url".into(), self.config.cancel_url.clone()),
            ("client_reference_id".into(), request.user_id.to_string()),
            (
                "line_items[0][price_data][currency]".into(),
                self.config.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                package.price_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                package.name.clone(),
            ),
            ("line_items[0][quantity]".into(), "1".into()),
            ("metadata[user_id]".into(), request.user_id.to_string()),
            ("metadata[package_id]".into(), package.id.clone()),
        ];

        if package.recurring {
            params.push((
                "line_items[0][price_data][recurring][interval]".into(),
                "month".into(),
            ));
            params.push((
                "subscription_data[metadata][user_id]".into(),
                request.user_id.to_string(),
            ));
            params.push((
                "subscription_data[metadata][package_id]".into(),
                package.id.clone(),
            ));
        }
        if let Some(email) = request.customer_email.as_deref().filter(|e| !e.is_empty()) {
            params.push(("customer_email".into(), email.to_string()));
        }
        if let Some(coupon) = &request.coupon_id {
            params.push(("discounts[0][coupon]".into(), coupon.clone()));
        }
        if let Some(code) = &request.promo_code {
            params.push(("metadata[promo_code]".into(), code.clone()));
        }

        params
    }

    async fn post_form<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        params: &[(String, String)],
    ) -> Result<T, ProviderError> {
        self.check_credentials()?;
        let builder = self
            .http
            .post(self.url(path))
            .bearer_auth(&self.config.secret_key)
            .form(params);
        send_json(PROVIDER, builder, self.timeout_secs).await
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    #[instrument(skip(self, request), fields(user_id = %request.user_id, package_id = %request.package.id))]
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutSession, AppError> {
        let params = self.session_params(request);
        let session: SessionResource = self
            .post_form("checkout/sessions", &params)
            .await
            .map_err(|e| {
                warn!(
                    provider = PROVIDER,
                    payload = "checkout/sessions form (mode, line_items, metadata)",
                    recurring = request.package.recurring,
                    discounted = request.coupon_id.is_some(),
                    error = %e,
                    "Failed to create checkout session"
                );
                e.into_app(PROVIDER)
            })?;

        info!(session_id = %session.id, "Checkout session created");
        Ok(session.into())
    }

    #[instrument(skip(self))]
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, AppError> {
        self.check_credentials()
            .map_err(|e| e.into_app(PROVIDER))?;

        let builder = self
            .http
            .get(self.url(&format!("checkout/sessions/{}", session_id)))
            .bearer_auth(&self.config.secret_key);

        let session: SessionResource = send_json(PROVIDER, builder, self.timeout_secs)
            .await
            .map_err(|e| {
                warn!(session_id = %session_id, error = %e, "Failed to retrieve checkout session");
                e.into_app(PROVIDER)
            })?;

        Ok(session.into())
    }

    #[instrument(skip(self))]
    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<Invoice, AppError> {
        self.check_credentials()
            .map_err(|e| e.into_app(PROVIDER))?;

        let builder = self
            .http
            .get(self.url(&format!("invoices/{}", invoice_id)))
            .bearer_auth(&self.config.secret_key);

        let invoice: InvoiceResource = send_json(PROVIDER, builder, self.timeout_secs)
            .await
            .map_err(|e| {
                warn!(invoice_id = %invoice_id, error = %e, "Failed to retrieve invoice");
                e.into_app(PROVIDER)
            })?;

        Ok(invoice.into())
    }

    #[instrument(skip(self))]
    async fn create_coupon(&self, percent_off: i32, label: &str) -> Result<String, AppError> {
        let params = vec![
            ("percent_off".to_string(), percent_off.to_string()),
            ("duration".to_string(), "once".to_string()),
            ("max_redemptions".to_string(), "1".to_string()),
            ("name".to_string(), label.to_string()),
        ];

        let coupon: CouponResource = self.post_form("coupons", &params).await.map_err(|e| {
            warn!(percent_off, error = %e, "Failed to create coupon");
            e.into_app(PROVIDER)
        })?;

        Ok(coupon.id)
    }
}
