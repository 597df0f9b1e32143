//! The transition executor: legality checking, commit, and the per-role
//! "changed"/"unchanged" side-effect sequences.

use tracing::{error, warn};

use crate::config::MARIADB_SERVICE_NAME;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::ports::{
    DbConnector, FirewallConnector, GtidMode, HealthResult, Match, RouteAdvertiser,
    ServiceConnector, Statement, REPL_SLAVE_IO_RUNNING, REPL_SLAVE_SQL_RUNNING, REPL_STATUS_YES,
};
use crate::role::{community_for_role, Role};
use crate::state::ControllerState;

const WRITE_PROBE_FAIL_THRESHOLD: u32 = 15;
const REPLICATION_FAIL_THRESHOLD: u32 = 20;
const WRITE_PROBE_DATABASE: &str = "management";
const WRITE_PROBE_TABLE: &str = "alive_check";

/// Whether `from -> to` is a reachable edge in the role-transition graph.
/// An unreachable edge is a programming error upstream, not a runtime
/// condition, so callers do not recover from a `false` here — they abort.
fn is_legal(from: Role, to: Role) -> bool {
    match from {
        Role::Fault => to != Role::Primary,
        Role::Candidate => to != Role::Replica,
        Role::Primary => to != Role::Candidate && to != Role::Replica,
        Role::Replica => to != Role::Primary,
        Role::Initial => to == Role::Fault,
        Role::Anchor => false,
    }
}

/// Commits `next` and runs the corresponding side-effect handler. On any
/// handler failure outside of Fault itself, forces a transition to Fault
/// and returns the original error.
///
/// Panics if `next` is not reachable from the currently committed role:
/// the decision function must never propose an illegal edge.
#[allow(clippy::too_many_arguments)]
pub async fn apply<R, D, F, S>(
    state: &mut ControllerState,
    metrics: &Metrics,
    advertiser: &mut R,
    db: &mut D,
    firewall: &mut F,
    service: &mut S,
    next: Role,
) -> Result<()>
where
    R: RouteAdvertiser,
    D: DbConnector,
    F: FirewallConnector,
    S: ServiceConnector,
{
    let current = state.current_role().await;
    assert!(
        is_legal(current, next),
        "illegal transition requested: {current:?} -> {next:?}"
    );

    let (previous, current) = state.commit(next).await;
    metrics.record_transition(current);

    let outcome = if previous == current {
        dispatch_unchanged(state, db, current).await
    } else {
        dispatch_changed(state, advertiser, db, firewall, service, current).await
    };

    if let Err(error) = outcome {
        if current != Role::Fault {
            error!(%error, role = %current, "transition handler failed, forcing fault");
            force_fault(state, metrics, advertiser, db, firewall, service).await;
        }
        return Err(error);
    }

    Ok(())
}

/// Forces a transition to Fault outside the normal decide/apply flow: used
/// on observation failure and on process cancellation. A no-op if the
/// controller is already in Fault.
#[allow(clippy::too_many_arguments)]
pub async fn force_fault<R, D, F, S>(
    state: &mut ControllerState,
    metrics: &Metrics,
    advertiser: &mut R,
    db: &mut D,
    firewall: &mut F,
    service: &mut S,
) where
    R: RouteAdvertiser,
    D: DbConnector,
    F: FirewallConnector,
    S: ServiceConnector,
{
    if state.current_role().await == Role::Fault {
        return;
    }
    let (_, current) = state.commit(Role::Fault).await;
    metrics.record_transition(current);
    handle_fault_changed(state, advertiser, db, firewall, service).await;
}

async fn dispatch_changed<R, D, F, S>(
    state: &mut ControllerState,
    advertiser: &mut R,
    db: &mut D,
    firewall: &mut F,
    service: &mut S,
    role: Role,
) -> Result<()>
where
    R: RouteAdvertiser,
    D: DbConnector,
    F: FirewallConnector,
    S: ServiceConnector,
{
    match role {
        Role::Primary => handle_primary_changed(state, advertiser, db, firewall).await,
        Role::Replica => handle_replica_changed(state, advertiser, db, firewall, service).await,
        Role::Candidate => handle_candidate_changed(state, advertiser, db, firewall, service).await,
        Role::Fault => {
            handle_fault_changed(state, advertiser, db, firewall, service).await;
            Ok(())
        }
        Role::Initial | Role::Anchor => {
            unreachable!("controller never commits to {role:?}")
        }
    }
}

async fn dispatch_unchanged<D: DbConnector>(
    state: &mut ControllerState,
    db: &mut D,
    role: Role,
) -> Result<()> {
    match role {
        Role::Primary => handle_primary_unchanged(state, db).await,
        Role::Replica => handle_replica_unchanged(state, db).await,
        Role::Fault | Role::Candidate => Ok(()),
        Role::Initial | Role::Anchor => {
            unreachable!("controller never commits to {role:?}")
        }
    }
}

async fn handle_primary_changed<R: RouteAdvertiser, D: DbConnector, F: FirewallConnector>(
    state: &mut ControllerState,
    advertiser: &mut R,
    db: &mut D,
    firewall: &mut F,
) -> Result<()> {
    if state.last_health == HealthResult::NotOk {
        return Err(Error::Validation(
            "refusing to become primary: health check is not Ok".into(),
        ));
    }
    if state.last_neighbors.has_any(Role::Primary) {
        return Err(Error::Validation(
            "refusing to become primary: another primary is already visible".into(),
        ));
    }

    db.stop_replica().await?;
    db.reset_all_replicas().await?;
    sync_read_only(db, false).await?;

    install_single_rule(
        firewall,
        &state.config.db_acl_chain_name,
        &state.config.global_interface_name,
        state.config.db_serving_port,
        Statement::Accept,
    )
    .await?;

    advertise(advertiser, state, Role::Primary).await?;

    state.write_probe_fail_streak = 0;
    Ok(())
}

async fn handle_replica_changed<R: RouteAdvertiser, D: DbConnector, F: FirewallConnector, S: ServiceConnector>(
    state: &mut ControllerState,
    advertiser: &mut R,
    db: &mut D,
    firewall: &mut F,
    service: &mut S,
) -> Result<()> {
    db.remove_master_info().await?;
    db.remove_relay_info().await?;

    service.start_service(MARIADB_SERVICE_NAME).await?;
    let health = service.check_service_status(MARIADB_SERVICE_NAME).await?;
    if health == HealthResult::NotOk {
        return Err(Error::Service(
            "database service did not become healthy after restart".into(),
        ));
    }

    let primary_address = state
        .last_neighbors
        .neighbors(Role::Primary)
        .first()
        .map(|n| n.address)
        .ok_or_else(|| Error::Validation("no primary neighbor observed".into()))?;

    sync_read_only(db, true).await?;
    db.stop_replica().await?;
    db.reset_all_replicas().await?;
    db.change_master_to(
        primary_address,
        state.config.db_replica_source_port,
        &state.config.db_replica_user_name,
        &state.config.db_replica_password,
        GtidMode::CurrentPos,
    )
    .await?;
    db.start_replica().await?;

    install_single_rule(
        firewall,
        &state.config.db_acl_chain_name,
        &state.config.global_interface_name,
        state.config.db_serving_port,
        Statement::Reject,
    )
    .await?;

    advertise(advertiser, state, Role::Replica).await?;

    state.replication_fail_streak = 0;
    Ok(())
}

async fn handle_candidate_changed<R: RouteAdvertiser, D: DbConnector, F: FirewallConnector, S: ServiceConnector>(
    state: &mut ControllerState,
    advertiser: &mut R,
    db: &mut D,
    firewall: &mut F,
    service: &mut S,
) -> Result<()> {
    service.start_service(MARIADB_SERVICE_NAME).await?;
    let health = service.check_service_status(MARIADB_SERVICE_NAME).await?;
    if health == HealthResult::NotOk {
        return Err(Error::Service(
            "database service did not become healthy after restart".into(),
        ));
    }

    sync_read_only(db, true).await?;

    install_single_rule(
        firewall,
        &state.config.db_acl_chain_name,
        &state.config.global_interface_name,
        state.config.db_serving_port,
        Statement::Reject,
    )
    .await?;

    advertise(advertiser, state, Role::Candidate).await?;
    Ok(())
}

/// Reads the current read-only flag and only issues `set_read_only` when it
/// differs from `desired`, matching the no-op law: re-applying the same
/// value must not re-issue the write.
async fn sync_read_only<D: DbConnector>(db: &mut D, desired: bool) -> Result<()> {
    if db.is_read_only().await? != desired {
        db.set_read_only(desired).await?;
    }
    Ok(())
}

/// Best-effort and never fails: every step's error is logged and skipped.
/// Fault is the safe sink; its handler must not itself provoke a recursive
/// forced-Fault.
async fn handle_fault_changed<R: RouteAdvertiser, D: DbConnector, F: FirewallConnector, S: ServiceConnector>(
    state: &mut ControllerState,
    advertiser: &mut R,
    _db: &mut D,
    firewall: &mut F,
    service: &mut S,
) {
    if let Err(error) = advertise(advertiser, state, Role::Fault).await {
        warn!(%error, "failed to advertise fault role");
    }

    if let Err(error) = install_single_rule(
        firewall,
        &state.config.db_acl_chain_name,
        &state.config.global_interface_name,
        state.config.db_serving_port,
        Statement::Reject,
    )
    .await
    {
        warn!(%error, "failed to install fault firewall rule");
    }

    if let Err(error) = service.kill_service(MARIADB_SERVICE_NAME).await {
        warn!(%error, "failed to kill database service");
    }
    if let Err(error) = service.stop_service(MARIADB_SERVICE_NAME).await {
        warn!(%error, "failed to stop database service");
    }
}

async fn handle_primary_unchanged<D: DbConnector>(
    state: &mut ControllerState,
    db: &mut D,
) -> Result<()> {
    match run_write_probe(db).await {
        Ok(()) => {
            state.write_probe_fail_streak = 0;
            Ok(())
        }
        Err(error) => {
            state.write_probe_fail_streak += 1;
            warn!(
                streak = state.write_probe_fail_streak,
                %error, "write probe failed"
            );
            if state.write_probe_fail_streak >= WRITE_PROBE_FAIL_THRESHOLD {
                Err(Error::Transition {
                    role: Role::Primary,
                    source: Box::new(error),
                })
            } else {
                Ok(())
            }
        }
    }
}

async fn run_write_probe<D: DbConnector>(db: &mut D) -> Result<()> {
    db.create_database(WRITE_PROBE_DATABASE).await?;
    db.create_id_table(WRITE_PROBE_DATABASE, WRITE_PROBE_TABLE).await?;
    db.insert_id(WRITE_PROBE_DATABASE, WRITE_PROBE_TABLE, 1).await?;
    db.delete_all(WRITE_PROBE_DATABASE, WRITE_PROBE_TABLE).await?;
    Ok(())
}

async fn handle_replica_unchanged<D: DbConnector>(
    state: &mut ControllerState,
    db: &mut D,
) -> Result<()> {
    let healthy = match db.show_replication_status().await {
        Ok(status) => {
            let io_ok = status.get(REPL_SLAVE_IO_RUNNING).is_some_and(|v| v == REPL_STATUS_YES);
            let sql_ok = status.get(REPL_SLAVE_SQL_RUNNING).is_some_and(|v| v == REPL_STATUS_YES);
            io_ok && sql_ok
        }
        Err(error) => {
            warn!(%error, "could not read replication status");
            false
        }
    };

    if healthy {
        state.replication_fail_streak = 0;
        return Ok(());
    }

    state.replication_fail_streak += 1;
    warn!(
        streak = state.replication_fail_streak,
        "replication appears stalled, restarting replica"
    );
    let _ = db.stop_replica().await;
    let _ = db.start_replica().await;

    if state.replication_fail_streak >= REPLICATION_FAIL_THRESHOLD {
        Err(Error::Transition {
            role: Role::Replica,
            source: Box::new(Error::Db("replication did not recover".into())),
        })
    } else {
        Ok(())
    }
}

async fn advertise<R: RouteAdvertiser>(
    advertiser: &mut R,
    state: &ControllerState,
    role: Role,
) -> Result<()> {
    let community = community_for_role(role)
        .unwrap_or_else(|| unreachable!("every adopted role has a community"));
    advertiser
        .add_path(crate::ports::Route {
            prefix: state.host_address(),
            prefix_len: 32,
            community,
        })
        .await
}

async fn install_single_rule<F: FirewallConnector>(
    firewall: &mut F,
    chain: &str,
    interface: &str,
    port: u16,
    statement: Statement,
) -> Result<()> {
    firewall.create_chain(chain).await?;
    firewall.flush_chain(chain).await?;
    firewall
        .add_rule(
            chain,
            &[
                Match::InboundInterface(interface.to_string()),
                Match::TcpDestinationPort(port),
            ],
            statement,
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BgpPeer, ControllerConfig};
    use crate::fakes::{FakeDbConnector, FakeFirewallConnector, FakeRouteAdvertiser, FakeServiceConnector};
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn config() -> ControllerConfig {
        ControllerConfig {
            host_address: Ipv4Addr::new(10, 0, 0, 1),
            global_interface_name: "eth0".to_string(),
            db_serving_port: 3306,
            db_replica_user_name: "repl".to_string(),
            db_replica_password: "secret".to_string(),
            db_replica_source_port: 13306,
            db_acl_chain_name: "mariadb".to_string(),
            bgp_local_asn: 65001,
            bgp_peers: vec![
                BgpPeer { address: Ipv4Addr::new(10, 0, 0, 2), asn: 65002 },
                BgpPeer { address: Ipv4Addr::new(10, 0, 0, 3), asn: 65003 },
            ],
            bgp_serving_port: 179,
            bgp_keepalive_interval: Duration::from_secs(3),
            main_polling_span: Duration::from_secs(4),
            lock_filepath: "/tmp/does-not-matter".into(),
            http_api_port: None,
            prometheus_exporter_port: None,
        }
    }

    #[test]
    fn legality_graph_matches_specification() {
        assert!(!is_legal(Role::Fault, Role::Primary));
        assert!(is_legal(Role::Fault, Role::Candidate));
        assert!(is_legal(Role::Fault, Role::Replica));

        assert!(!is_legal(Role::Candidate, Role::Replica));
        assert!(is_legal(Role::Candidate, Role::Primary));
        assert!(is_legal(Role::Candidate, Role::Fault));

        assert!(!is_legal(Role::Primary, Role::Candidate));
        assert!(!is_legal(Role::Primary, Role::Replica));
        assert!(is_legal(Role::Primary, Role::Fault));

        assert!(!is_legal(Role::Replica, Role::Primary));
        assert!(is_legal(Role::Replica, Role::Candidate));
        assert!(is_legal(Role::Replica, Role::Fault));

        assert!(is_legal(Role::Initial, Role::Fault));
        assert!(!is_legal(Role::Initial, Role::Candidate));
    }

    #[tokio::test]
    #[should_panic(expected = "illegal transition")]
    async fn illegal_transition_aborts() {
        let mut state = ControllerState::new(config());
        let metrics = Metrics::new();
        let mut advertiser = FakeRouteAdvertiser::default();
        let mut db = FakeDbConnector::default();
        let mut firewall = FakeFirewallConnector::default();
        let mut service = FakeServiceConnector::default();

        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Fault)
            .await
            .unwrap();
        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Primary)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn candidate_to_primary_installs_accept_rule_and_advertises() {
        let mut state = ControllerState::new(config());
        let metrics = Metrics::new();
        let mut advertiser = FakeRouteAdvertiser::default();
        let mut db = FakeDbConnector::default();
        let mut firewall = FakeFirewallConnector::default();
        let mut service = FakeServiceConnector::default();

        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Fault)
            .await
            .unwrap();
        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Candidate)
            .await
            .unwrap();
        state.last_health = HealthResult::Ok;
        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Primary)
            .await
            .unwrap();

        assert_eq!(state.current_role().await, Role::Primary);
        assert!(!db.read_only);
        let rules = &firewall.chains["mariadb"];
        assert_eq!(rules.last().unwrap().1, Statement::Accept);
        assert_eq!(advertiser.rib.last().unwrap().community, community_for_role(Role::Primary).unwrap());
    }

    #[tokio::test]
    async fn primary_unchanged_write_probe_failure_streak_forces_fault_at_threshold() {
        let mut state = ControllerState::new(config());
        let metrics = Metrics::new();
        let mut advertiser = FakeRouteAdvertiser::default();
        let mut db = FakeDbConnector::default();
        let mut firewall = FakeFirewallConnector::default();
        let mut service = FakeServiceConnector::default();

        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Fault)
            .await
            .unwrap();
        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Candidate)
            .await
            .unwrap();
        state.last_health = HealthResult::Ok;
        apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Primary)
            .await
            .unwrap();

        db.fail_next_write = true;
        for _ in 0..14 {
            apply(&mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Primary)
                .await
                .unwrap();
        }
        assert_eq!(state.write_probe_fail_streak, 14);
        assert_eq!(state.current_role().await, Role::Primary);

        let result = apply(
            &mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Primary,
        )
        .await;
        assert!(result.is_err());
        assert_eq!(state.current_role().await, Role::Fault);
    }

    #[tokio::test]
    async fn fault_handler_never_fails_even_when_sub_steps_error() {
        let mut state = ControllerState::new(config());
        let metrics = Metrics::new();
        let mut advertiser = FakeRouteAdvertiser {
            fail_list_path: false,
            ..Default::default()
        };
        let mut db = FakeDbConnector::default();
        let mut firewall = FakeFirewallConnector::default();
        let mut service = FakeServiceConnector::default();

        let result = apply(
            &mut state, &metrics, &mut advertiser, &mut db, &mut firewall, &mut service, Role::Fault,
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn sync_read_only_is_a_noop_when_already_at_the_desired_value() {
        let mut db = FakeDbConnector::default();
        db.read_only = true;

        sync_read_only(&mut db, true).await.unwrap();
        assert!(!db.calls.iter().any(|call| call.op == "set_read_only"));

        sync_read_only(&mut db, false).await.unwrap();
        assert!(db.calls.iter().any(|call| call.op == "set_read_only"));
        assert!(!db.read_only);
    }
}
