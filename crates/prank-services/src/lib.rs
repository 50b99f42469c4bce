//! Business logic services for the prank call service
//!
//! This crate contains the call lifecycle workflow and the services around
//! it. Services depend only on the repository and provider traits from
//! `prank_core`, so they run unchanged against PostgreSQL and the real
//! provider clients, or against the in-memory fakes in [`testing`].
//!
//! # Services
//!
//! - [`CallDispatcher`] - guards and submits a call request to the active provider
//! - [`StatusReconciler`] - applies provider callbacks, consumes credits, ends calls
//! - [`SchedulerSweep`] - dispatches due scheduled requests
//! - [`ContentModerator`] - keyword rules plus the LLM classifier, failing open
//! - [`PaymentService`] - checkout sessions and idempotent payment verification
//! - [`RevealNotifier`] - the post-call reveal SMS, sent at most once
//! - [`SettingsService`] - admin settings updates with audit entries

pub mod dispatcher;
pub mod moderation;
pub mod payments;
pub mod prompt;
pub mod reconciler;
pub mod reveal;
pub mod scheduler;
pub mod settings;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use dispatcher::{CallDispatcher, DispatchResult};
pub use moderation::ContentModerator;
pub use payments::{CheckoutLink, PaymentService, PaymentVerification};
pub use prompt::{build_script, greeting_for, Language};
pub use reconciler::{
    EndCallResult, EndCallTarget, ReconcileOutcome, StatusReconciler, TwilioStatusCallback,
};
pub use reveal::{RevealNotifier, RevealOutcome};
pub use scheduler::{SchedulerSweep, SweepReport};
pub use settings::{SettingsActor, SettingsService};

/// Business logic constants
pub mod constants {
    /// Maximum scheduled requests dispatched by one sweep
    pub const SWEEP_BATCH_LIMIT: i64 = 100;

    /// Compare-and-set attempts before a status update is given up
    pub const MAX_STATUS_CAS_ATTEMPTS: usize = 3;
}
