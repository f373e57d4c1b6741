//! Load, transition and persist a shop's subscription state.
//!
//! Each step is a read-modify-write of the shop's settings row; concurrent
//! events for the same shop are not serialized.

use ambridge_core::{BillingEvent, SubscriptionState, Transition, TransitionOutcome};
use ambridge_db::{DbError, ShopSettingsRow};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

/// Applies `event` to the shop's stored state and saves the result when it
/// changed anything.
pub(crate) async fn apply_event(
    pool: &PgPool,
    shop: &str,
    event: BillingEvent,
    now: DateTime<Utc>,
) -> Result<Transition, DbError> {
    let row = ambridge_db::ensure_shop_settings(pool, shop).await?;
    let state = row.subscription_state()?;
    let event_name = event.name();
    let transition = state.apply(event, now);
    persist(pool, shop, event_name, &transition).await?;
    Ok(transition)
}

/// Returns the shop's settings with any due time-driven transition applied.
pub(crate) async fn refresh(
    pool: &PgPool,
    shop: &str,
    now: DateTime<Utc>,
) -> Result<(ShopSettingsRow, SubscriptionState), DbError> {
    let row = ambridge_db::ensure_shop_settings(pool, shop).await?;
    let transition = row.subscription_state()?.tick(now);
    if transition.outcome == TransitionOutcome::Ignored {
        return Ok((row, transition.state));
    }

    persist(pool, shop, "tick", &transition).await?;
    let row = ambridge_db::get_shop_settings(pool, shop)
        .await?
        .ok_or(DbError::NotFound)?;
    Ok((row, transition.state))
}

async fn persist(
    pool: &PgPool,
    shop: &str,
    event: &str,
    transition: &Transition,
) -> Result<(), DbError> {
    match transition.outcome {
        TransitionOutcome::Applied => {
            ambridge_db::save_subscription_state(pool, shop, &transition.state).await?;
            tracing::info!(
                shop = %shop,
                event,
                plan = %transition.state.plan,
                status = %transition.state.status,
                "subscription state updated"
            );
        }
        TransitionOutcome::Ignored => {
            tracing::info!(shop = %shop, event, "stale or duplicate billing event ignored");
        }
    }
    Ok(())
}

/// Fires due staleness and grace transitions for every shop with a
/// subscription change in flight. Returns the number of shops updated.
pub(crate) async fn sweep(pool: &PgPool, now: DateTime<Utc>) -> Result<usize, DbError> {
    let rows = ambridge_db::list_shops_in_flight(pool).await?;
    let mut updated = 0;

    for row in rows {
        let state = match row.subscription_state() {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(shop = %row.shop, error = %e, "sweep: unreadable subscription state");
                continue;
            }
        };
        let transition = state.tick(now);
        if transition.outcome == TransitionOutcome::Applied {
            ambridge_db::save_subscription_state(pool, &row.shop, &transition.state).await?;
            tracing::info!(
                shop = %row.shop,
                plan = %transition.state.plan,
                status = %transition.state.status,
                "sweep: subscription transition applied"
            );
            updated += 1;
        }
    }

    Ok(updated)
}
