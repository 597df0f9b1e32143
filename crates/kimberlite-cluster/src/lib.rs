//! Per-node role-election controller for a BGP-routed, three-node MariaDB
//! cluster.
//!
//! Each node runs one [`ControllerState`] driven by [`controller::run`]:
//! observe the BGP route table and local database health, decide the next
//! role with a pure function, and apply that role's side effects across
//! the database, the firewall, and the route advertisement. Nodes never
//! talk to each other directly — BGP route state is the only shared medium.

pub mod collaborators;
pub mod config;
pub mod controller;
pub mod decide;
pub mod error;
pub mod fakes;
pub mod http;
pub mod lock;
pub mod metrics;
pub mod neighbor;
pub mod observe;
pub mod ports;
pub mod role;
pub mod state;
pub mod transition;

pub use config::ControllerConfig;
pub use error::{Error, Result};
pub use role::Role;
pub use state::ControllerState;

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use collaborators::{FrrRouteAdvertiser, MariadbConnector, NftFirewallConnector, SystemdServiceConnector};
use metrics::Metrics;

/// Acquires the process singleton lock, wires up the real collaborator
/// implementations and the optional HTTP sidecars, and runs the
/// controller loop until a termination signal arrives.
pub async fn run_controller(config: ControllerConfig) -> Result<()> {
    config.validate()?;

    let _lock = lock::acquire(&config.lock_filepath)?;

    let metrics = Arc::new(Metrics::new());
    let state = ControllerState::new(config.clone());
    let role = Arc::clone(&state.role);

    if let Some(port) = config.http_api_port {
        let role = Arc::clone(&role);
        tokio::spawn(async move {
            if let Err(error) = http::serve_status(port, role).await {
                warn!(%error, "status HTTP sidecar exited");
            }
        });
    }
    if let Some(port) = config.prometheus_exporter_port {
        let metrics = Arc::clone(&metrics);
        tokio::spawn(async move {
            if let Err(error) = http::serve_metrics(port, metrics).await {
                warn!(%error, "metrics HTTP sidecar exited");
            }
        });
    }

    let advertiser = FrrRouteAdvertiser::new(&config);
    let db = MariadbConnector::new(config.db_serving_port);
    let firewall = NftFirewallConnector::new();
    let service = SystemdServiceConnector::new();

    let cancel = spawn_signal_watcher();

    controller::run(state, metrics.as_ref(), advertiser, db, firewall, service, cancel).await
}

/// Listens for SIGINT/SIGTERM/SIGQUIT and signals cancellation on any of
/// them. SIGHUP and SIGPIPE are explicitly ignored: neither should
/// terminate a long-running daemon.
fn spawn_signal_watcher() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);

    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{signal, SignalKind};

        let mut interrupt = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut terminate = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut quit = signal(SignalKind::quit()).expect("failed to install SIGQUIT handler");
        let mut hangup = signal(SignalKind::hangup()).expect("failed to install SIGHUP handler");
        let mut pipe = signal(SignalKind::pipe()).expect("failed to install SIGPIPE handler");

        loop {
            tokio::select! {
                _ = interrupt.recv() => { info!("received SIGINT"); break; }
                _ = terminate.recv() => { info!("received SIGTERM"); break; }
                _ = quit.recv() => { info!("received SIGQUIT"); break; }
                _ = hangup.recv() => { continue; }
                _ = pipe.recv() => { continue; }
            }
        }
        let _ = tx.send(true);
    });

    rx
}
