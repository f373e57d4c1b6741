//! Per-shop subscription lifecycle.
//!
//! States:
//!
//! | Status       | Meaning                                                        |
//! |--------------|----------------------------------------------------------------|
//! | `Active`     | `plan` is in force. FREE with no subscription id is "none".    |
//! | `Pending`    | A checkout was started for `pending_plan`; `plan` stays in force. |
//! | `Cancelling` | The platform reported `subscription_id` cancelled; `plan` stays in force until the grace window ends. |
//!
//! Billing webhooks can arrive out of order during an upgrade (the old
//! subscription is cancelled before the new one activates), so cancellation
//! is held for [`CANCELLATION_GRACE_SECS`] and abandoned checkouts are
//! reverted after [`PENDING_STALENESS_SECS`]. Time-driven transitions happen in
//! [`SubscriptionState::tick`].
//!
//! Every event is safe to re-apply: a duplicate delivery yields the same
//! state and a [`TransitionOutcome::Ignored`] outcome.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::plans::PlanName;
use crate::CoreError;

/// A checkout still pending after this many seconds is treated as declined.
pub const PENDING_STALENESS_SECS: i64 = 120;

/// A cancellation not superseded within this many seconds downgrades to FREE.
pub const CANCELLATION_GRACE_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Active,
    Pending,
    Cancelling,
}

impl SubscriptionStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Pending => "PENDING",
            Self::Cancelling => "CANCELLING",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(Self::Active),
            "PENDING" => Ok(Self::Pending),
            "CANCELLING" => Ok(Self::Cancelling),
            _ => Err(CoreError::UnknownSubscriptionStatus(s.to_owned())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionState {
    pub plan: PlanName,
    pub status: SubscriptionStatus,
    pub subscription_id: Option<String>,
    pub pending_plan: Option<PlanName>,
    pub pending_subscription_id: Option<String>,
    pub plan_start_date: DateTime<Utc>,
    pub plan_end_date: Option<DateTime<Utc>>,
    /// When `status` last changed; the grace and staleness windows count from here.
    pub status_changed_at: DateTime<Utc>,
}

/// Named inputs to the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingEvent {
    /// A paid checkout was created on the billing platform.
    CreationRequested {
        plan: PlanName,
        subscription_id: String,
    },
    /// The merchant returned from the platform's confirmation page.
    ///
    /// Only completes the checkout this shop has pending; `subscription_id`
    /// is the charge id from the return URL, when the platform sent one.
    ConfirmationReceived {
        plan: PlanName,
        subscription_id: Option<String>,
        plan_end_date: Option<DateTime<Utc>>,
    },
    /// Subscription-update webhook with status ACTIVE.
    PlatformWebhookActive {
        plan: PlanName,
        subscription_id: String,
        plan_end_date: Option<DateTime<Utc>>,
    },
    /// Subscription-update webhook with status CANCELLED, EXPIRED, or DECLINED.
    PlatformWebhookCancelled { subscription_id: String },
    /// Result of reading the platform's currently active subscriptions.
    /// `None` means the shop has no active subscription.
    ManualReconciliation {
        active: Option<(PlanName, String)>,
    },
    /// The merchant chose FREE or cancelled their paid plan in the app.
    DowngradeRequested,
    StalenessTimeoutElapsed,
    GraceWindowElapsed,
}

impl BillingEvent {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreationRequested { .. } => "creation_requested",
            Self::ConfirmationReceived { .. } => "confirmation_received",
            Self::PlatformWebhookActive { .. } => "platform_webhook_active",
            Self::PlatformWebhookCancelled { .. } => "platform_webhook_cancelled",
            Self::ManualReconciliation { .. } => "manual_reconciliation",
            Self::DowngradeRequested => "downgrade_requested",
            Self::StalenessTimeoutElapsed => "staleness_timeout_elapsed",
            Self::GraceWindowElapsed => "grace_window_elapsed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionOutcome {
    Applied,
    /// The event does not apply to the current state (stale or duplicate).
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub state: SubscriptionState,
    pub outcome: TransitionOutcome,
}

impl SubscriptionState {
    /// Initial state for a newly seen shop: FREE, active, no subscription.
    #[must_use]
    pub fn new_free(now: DateTime<Utc>) -> Self {
        Self {
            plan: PlanName::Free,
            status: SubscriptionStatus::Active,
            subscription_id: None,
            pending_plan: None,
            pending_subscription_id: None,
            plan_start_date: now,
            plan_end_date: None,
            status_changed_at: now,
        }
    }

    /// `true` when the shop is on FREE with nothing in flight.
    #[must_use]
    pub fn is_none(&self) -> bool {
        self.plan == PlanName::Free
            && self.status == SubscriptionStatus::Active
            && self.subscription_id.is_none()
    }

    /// Applies `event` at time `now`.
    #[must_use]
    pub fn apply(&self, event: BillingEvent, now: DateTime<Utc>) -> Transition {
        match event {
            BillingEvent::CreationRequested {
                plan,
                subscription_id,
            } => self.on_creation_requested(plan, subscription_id, now),
            BillingEvent::ConfirmationReceived {
                plan,
                subscription_id,
                plan_end_date,
            } => self.on_confirmation(plan, subscription_id, plan_end_date, now),
            BillingEvent::PlatformWebhookActive {
                plan,
                subscription_id,
                plan_end_date,
            } => self.on_active(plan, subscription_id, plan_end_date, now),
            BillingEvent::PlatformWebhookCancelled { subscription_id } => {
                self.on_cancelled(&subscription_id, now)
            }
            BillingEvent::ManualReconciliation { active: None } | BillingEvent::DowngradeRequested => {
                self.to_free(now)
            }
            BillingEvent::ManualReconciliation {
                active: Some((plan, subscription_id)),
            } => self.activate(plan, subscription_id, None, now),
            BillingEvent::StalenessTimeoutElapsed => self.on_staleness(now),
            BillingEvent::GraceWindowElapsed => self.on_grace_elapsed(now),
        }
    }

    /// Fires any time-driven transition that is due at `now`.
    #[must_use]
    pub fn tick(&self, now: DateTime<Utc>) -> Transition {
        let elapsed = now - self.status_changed_at;
        match self.status {
            SubscriptionStatus::Pending if elapsed >= Duration::seconds(PENDING_STALENESS_SECS) => {
                self.apply(BillingEvent::StalenessTimeoutElapsed, now)
            }
            SubscriptionStatus::Cancelling if elapsed >= Duration::seconds(CANCELLATION_GRACE_SECS) => {
                self.apply(BillingEvent::GraceWindowElapsed, now)
            }
            _ => self.ignored(),
        }
    }

    fn ignored(&self) -> Transition {
        Transition {
            state: self.clone(),
            outcome: TransitionOutcome::Ignored,
        }
    }

    fn applied(state: Self) -> Transition {
        Transition {
            state,
            outcome: TransitionOutcome::Applied,
        }
    }

    fn on_creation_requested(
        &self,
        plan: PlanName,
        subscription_id: String,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.status == SubscriptionStatus::Pending
            && self.pending_subscription_id.as_deref() == Some(subscription_id.as_str())
        {
            return self.ignored();
        }

        let mut next = self.clone();
        if self.status == SubscriptionStatus::Cancelling {
            // The subscription being cancelled no longer backs the current plan.
            next.plan = PlanName::Free;
            next.subscription_id = None;
            next.plan_end_date = None;
            next.plan_start_date = now;
        }
        next.status = SubscriptionStatus::Pending;
        next.pending_plan = Some(plan);
        next.pending_subscription_id = Some(subscription_id);
        next.status_changed_at = now;
        Self::applied(next)
    }

    fn on_confirmation(
        &self,
        plan: PlanName,
        charge_id: Option<String>,
        plan_end_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.status != SubscriptionStatus::Pending || self.pending_plan != Some(plan) {
            return self.ignored();
        }
        let Some(pending_id) = self.pending_subscription_id.clone() else {
            return self.ignored();
        };
        if charge_id.is_some_and(|id| id != pending_id) {
            return self.ignored();
        }
        self.activate(plan, pending_id, plan_end_date, now)
    }

    fn on_active(
        &self,
        plan: PlanName,
        subscription_id: String,
        plan_end_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Transition {
        if self.status == SubscriptionStatus::Cancelling
            && self.subscription_id.as_deref() == Some(subscription_id.as_str())
        {
            // Late ACTIVE for the subscription being cancelled.
            return self.ignored();
        }
        self.activate(plan, subscription_id, plan_end_date, now)
    }

    fn activate(
        &self,
        plan: PlanName,
        subscription_id: String,
        plan_end_date: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Transition {
        let same_subscription = self.subscription_id.as_deref() == Some(subscription_id.as_str());
        if self.status == SubscriptionStatus::Active
            && same_subscription
            && self.plan == plan
            && (plan_end_date.is_none() || self.plan_end_date == plan_end_date)
        {
            return self.ignored();
        }

        let mut next = self.clone();
        if !same_subscription || self.plan != plan {
            next.plan_start_date = now;
        }
        next.plan = plan;
        next.status = SubscriptionStatus::Active;
        next.subscription_id = Some(subscription_id);
        next.pending_plan = None;
        next.pending_subscription_id = None;
        if plan_end_date.is_some() {
            next.plan_end_date = plan_end_date;
        }
        next.status_changed_at = now;
        Self::applied(next)
    }

    fn on_cancelled(&self, subscription_id: &str, now: DateTime<Utc>) -> Transition {
        if self.pending_subscription_id.as_deref() == Some(subscription_id) {
            // The checkout in flight was declined.
            return self.revert_pending(now);
        }

        if self.subscription_id.as_deref() != Some(subscription_id) {
            tracing::info!(
                subscription_id,
                current = ?self.subscription_id,
                "ignoring cancellation for a subscription that is no longer current"
            );
            return self.ignored();
        }

        match self.status {
            SubscriptionStatus::Cancelling => self.ignored(),
            SubscriptionStatus::Active | SubscriptionStatus::Pending => {
                let mut next = self.clone();
                next.status = SubscriptionStatus::Cancelling;
                next.pending_plan = None;
                next.pending_subscription_id = None;
                next.status_changed_at = now;
                Self::applied(next)
            }
        }
    }

    fn on_staleness(&self, now: DateTime<Utc>) -> Transition {
        if self.status != SubscriptionStatus::Pending {
            return self.ignored();
        }
        self.revert_pending(now)
    }

    fn revert_pending(&self, now: DateTime<Utc>) -> Transition {
        if self.status != SubscriptionStatus::Pending {
            return self.ignored();
        }
        let mut next = self.clone();
        next.status = SubscriptionStatus::Active;
        next.pending_plan = None;
        next.pending_subscription_id = None;
        next.status_changed_at = now;
        Self::applied(next)
    }

    fn on_grace_elapsed(&self, now: DateTime<Utc>) -> Transition {
        if self.status != SubscriptionStatus::Cancelling {
            return self.ignored();
        }
        self.to_free(now)
    }

    fn to_free(&self, now: DateTime<Utc>) -> Transition {
        if self.is_none() && self.pending_subscription_id.is_none() {
            return self.ignored();
        }
        Self::applied(Self::new_free(now))
    }
}

#[cfg(test)]
#[path = "subscription_test.rs"]
mod tests;
