//! The controller loop: observe, decide, apply, sleep — repeated until
//! cancellation.

use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tracing::{error, info};

use crate::decide::decide;
use crate::error::Result;
use crate::metrics::Metrics;
use crate::observe::observe;
use crate::ports::{DbConnector, FirewallConnector, RouteAdvertiser, ServiceConnector};
use crate::role::Role;
use crate::state::ControllerState;
use crate::transition::{apply, force_fault};

/// The intra-tick anti-thundering-herd jitter bounds, in whole seconds.
const JITTER_MIN_SECS: u64 = 1;
const JITTER_MAX_SECS: u64 = 2;

/// Runs the controller loop until `cancel` fires. Always leaves the node in
/// Fault before returning and stops the route advertiser, regardless of
/// which branch caused the return.
#[allow(clippy::too_many_arguments)]
pub async fn run<R, D, F, S>(
    mut state: ControllerState,
    metrics: &Metrics,
    mut advertiser: R,
    mut db: D,
    mut firewall: F,
    mut service: S,
    mut cancel: watch::Receiver<bool>,
) -> Result<()>
where
    R: RouteAdvertiser,
    D: DbConnector,
    F: FirewallConnector,
    S: ServiceConnector,
{
    advertiser.start().await?;

    let tick_span = state.config.main_polling_span;

    loop {
        tokio::select! {
            _ = cancel.changed() => {
                info!("cancellation received, forcing fault before exit");
                force_fault(&mut state, metrics, &mut advertiser, &mut db, &mut firewall, &mut service).await;
                let _ = advertiser.stop().await;
                return Ok(());
            }
            _ = tokio::time::sleep(tick_span) => {}
        }

        jittered_sleep().await;

        if *cancel.borrow() {
            info!("cancellation received, forcing fault before exit");
            force_fault(&mut state, metrics, &mut advertiser, &mut db, &mut firewall, &mut service).await;
            let _ = advertiser.stop().await;
            return Ok(());
        }

        if let Err(error) = tick(&mut state, metrics, &mut advertiser, &mut db, &mut firewall, &mut service).await {
            error!(%error, "tick failed");
        }
    }
}

async fn jittered_sleep() {
    let seconds = rand::thread_rng().gen_range(JITTER_MIN_SECS..=JITTER_MAX_SECS);
    tokio::time::sleep(Duration::from_secs(seconds)).await;
}

#[allow(clippy::too_many_arguments)]
async fn tick<R, D, F, S>(
    state: &mut ControllerState,
    metrics: &Metrics,
    advertiser: &mut R,
    db: &mut D,
    firewall: &mut F,
    service: &mut S,
) -> Result<()>
where
    R: RouteAdvertiser,
    D: DbConnector,
    F: FirewallConnector,
    S: ServiceConnector,
{
    let observation = match observe(advertiser, db, service, &state.config, &state.last_neighbors).await {
        Ok(observation) => observation,
        Err(error) => {
            error!(%error, "observation failed, forcing fault");
            force_fault(state, metrics, advertiser, db, firewall, service).await;
            return Err(error);
        }
    };

    state.last_neighbors = observation.neighbors;
    state.last_health = observation.health;
    state.last_readiness = observation.readiness;

    let current = state.current_role().await;
    let next = decide(current, &state.last_neighbors, state.last_health, state.last_readiness);

    debug_assert!(next != Role::Anchor, "decision function never proposes Anchor");

    apply(state, metrics, advertiser, db, firewall, service, next).await
}
