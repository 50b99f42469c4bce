//! Repository implementations
//!
//! This module contains concrete implementations of the repository traits
//! defined in prank-core, using sqlx for PostgreSQL access.

pub mod audit_repo;
pub mod call_request_repo;
pub mod credit_repo;
pub mod payment_repo;
pub mod profile_repo;
pub mod reveal_repo;
pub mod settings_repo;

pub use audit_repo::PgAuditLogRepository;
pub use call_request_repo::PgCallRequestRepository;
pub use credit_repo::PgCreditLedger;
pub use payment_repo::{PgPaymentRecordRepository, PgPromoCodeRepository};
pub use profile_repo::PgProfileRepository;
pub use reveal_repo::PgRevealNotificationRepository;
pub use settings_repo::PgSettingsRepository;
