//! Subscription state consumed from the entitlement service.
//!
//! The payment flow and its webhooks live elsewhere; they only ever replace
//! the [`SubscriptionState`] held by an [`EntitlementSource`].

use std::str::FromStr;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Billing status reported by the payment provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Trialing,
    PastDue,
    Canceled,
    Unpaid,
    #[default]
    None,
}

impl SubscriptionStatus {
    /// Whether this status grants premium lessons.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "active" => Ok(Self::Active),
            "trialing" => Ok(Self::Trialing),
            "past_due" => Ok(Self::PastDue),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "unpaid" => Ok(Self::Unpaid),
            "none" | "" => Ok(Self::None),
            other => Err(format!("unknown subscription status '{other}'")),
        }
    }
}

/// Snapshot of a user's subscription.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub status: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_period_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
}

impl SubscriptionState {
    #[must_use]
    pub fn with_status(status: SubscriptionStatus) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn has_active_subscription(&self) -> bool {
        self.status.is_active()
    }
}

/// Read access to the current subscription.
pub trait EntitlementSource: Send + Sync {
    fn subscription(&self) -> SubscriptionState;

    fn has_active_subscription(&self) -> bool {
        self.subscription().has_active_subscription()
    }
}

/// Subscription state that the entitlement service can replace at any time.
#[derive(Debug, Default)]
pub struct SharedEntitlement {
    state: RwLock<SubscriptionState>,
}

impl SharedEntitlement {
    #[must_use]
    pub fn new(state: SubscriptionState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Replace the subscription state.
    pub fn update(&self, state: SubscriptionState) {
        *self.state.write().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

impl EntitlementSource for SharedEntitlement {
    fn subscription(&self) -> SubscriptionState {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_active_and_trialing_grant_access() {
        let granted: Vec<_> = [
            SubscriptionStatus::Active,
            SubscriptionStatus::Trialing,
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
            SubscriptionStatus::None,
        ]
        .into_iter()
        .filter(|s| SubscriptionState::with_status(*s).has_active_subscription())
        .collect();

        assert_eq!(
            granted,
            vec![SubscriptionStatus::Active, SubscriptionStatus::Trialing]
        );
    }

    #[test]
    fn test_status_parsing() {
        assert_eq!("past-due".parse::<SubscriptionStatus>(), Ok(SubscriptionStatus::PastDue));
        assert_eq!("Cancelled".parse::<SubscriptionStatus>(), Ok(SubscriptionStatus::Canceled));
        assert!("gold".parse::<SubscriptionStatus>().is_err());
    }

    #[test]
    fn test_shared_entitlement_update() {
        let source = SharedEntitlement::default();
        assert!(!source.has_active_subscription());

        source.update(SubscriptionState::with_status(SubscriptionStatus::Trialing));
        assert!(source.has_active_subscription());
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
