//! Credit ledger model
//!
//! A user's prank credits live on their profile row. Every decrement is
//! keyed by the call request id, every increment by the payment session id.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current credit balance for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub user_id: Uuid,
    pub available_credits: i32,
}

/// Outcome of consuming one credit for a finished call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// First consumption for this call request
    Consumed { remaining: i32 },
    /// A credit was already consumed for this call request
    AlreadyConsumed,
    /// Balance was zero; nothing recorded so a redelivery may retry
    InsufficientCredits,
}

/// Outcome of granting the credits of a verified payment session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted { credits_added: i32, total: i32 },
    /// The session was reconciled before; nothing changed
    AlreadyGranted { total: i32 },
}

impl GrantOutcome {
    pub fn credits_added(&self) -> i32 {
        match self {
            GrantOutcome::Granted { credits_added, .. } => *credits_added,
            GrantOutcome::AlreadyGranted { .. } => 0,
        }
    }

    pub fn total(&self) -> i32 {
        match self {
            GrantOutcome::Granted { total, .. } | GrantOutcome::AlreadyGranted { total } => *total,
        }
    }
}
