//! Domain models for the prank call service

pub mod audit;
pub mod call_request;
pub mod catalog;
pub mod credits;
pub mod moderation;
pub mod notification;
pub mod payment;
pub mod promo;
pub mod provider;
pub mod settings;
pub mod user;

pub use audit::{AuditLog, AuditLogBuilder, AuditLogData};
pub use call_request::{is_e164, CallRequest, CallStatus, StatusUpdate, TransitionCheck};
pub use catalog::{Package, PackageCatalog};
pub use credits::{ConsumeOutcome, CreditBalance, GrantOutcome};
pub use moderation::{ContentCheck, ModerationVerdict};
pub use notification::{RevealNotification, RevealStatus};
pub use payment::{CheckoutRequest, CheckoutSession, Invoice, PaymentGrant, PaymentRecord};
pub use promo::PromoCode;
pub use provider::{CallScript, EndCallOutcome, NormalizedStatus, ProviderEvent};
pub use settings::{ConsumptionPolicy, ProviderKind, RuntimeSettings};
pub use user::{Profile, UserRole};
