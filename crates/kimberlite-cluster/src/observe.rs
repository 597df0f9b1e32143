//! Observation phase: read-only probing of routes, database health, and
//! replication readiness. Never installs side effects.

use std::net::Ipv4Addr;

use tracing::{debug, info, warn};

use crate::config::{ControllerConfig, MARIADB_SERVICE_NAME};
use crate::error::Result;
use crate::neighbor::NeighborSet;
use crate::ports::{
    DbConnector, HealthResult, ReadyForPrimary, RouteAdvertiser, ServiceConnector,
    REPL_EXEC_MASTER_LOG_POS, REPL_MASTER_LOG_FILE, REPL_READ_MASTER_LOG_POS,
    REPL_RELAY_MASTER_LOG_FILE,
};
use crate::role::role_for_community;

/// The result of one observation phase: the three inputs the decision
/// function reads.
#[derive(Debug, Clone)]
pub struct Observation {
    pub neighbors: NeighborSet,
    pub health: HealthResult,
    pub readiness: ReadyForPrimary,
}

/// Pulls the route table, checks database health, and checks replication
/// readiness. The only fallible step is the route table pull: health and
/// readiness probe errors are absorbed into `NotOk`.
pub async fn observe<R, D, S>(
    route_advertiser: &mut R,
    db: &mut D,
    service: &mut S,
    config: &ControllerConfig,
    previous: &NeighborSet,
) -> Result<Observation>
where
    R: RouteAdvertiser,
    D: DbConnector,
    S: ServiceConnector,
{
    let neighbors = observe_neighbors(route_advertiser, config.host_address).await?;
    if neighbors.different(previous) {
        info!("neighbor set changed");
    }

    let health = observe_health(service).await;
    let readiness = if health == HealthResult::Ok {
        observe_readiness(db).await
    } else {
        ReadyForPrimary::NotOk
    };

    Ok(Observation {
        neighbors,
        health,
        readiness,
    })
}

async fn observe_neighbors<R: RouteAdvertiser>(
    route_advertiser: &mut R,
    host_address: Ipv4Addr,
) -> Result<NeighborSet> {
    let routes = route_advertiser.list_path().await?;

    let mut neighbors = NeighborSet::new();
    for route in routes {
        if route.prefix_len != 32 {
            debug!(prefix_len = route.prefix_len, "ignoring non-host route");
            continue;
        }
        if route.prefix == host_address {
            continue;
        }
        let Some(role) = role_for_community(route.community) else {
            warn!(community = %route.community, "ignoring route with unknown community");
            continue;
        };
        neighbors.insert(role, route.prefix);
    }

    Ok(neighbors)
}

async fn observe_health<S: ServiceConnector>(service: &mut S) -> HealthResult {
    match service.check_service_status(MARIADB_SERVICE_NAME).await {
        Ok(health) => health,
        Err(error) => {
            warn!(%error, "health probe failed, treating as unhealthy");
            HealthResult::NotOk
        }
    }
}

async fn observe_readiness<D: DbConnector>(db: &mut D) -> ReadyForPrimary {
    let status = match db.show_replication_status().await {
        Ok(status) => status,
        Err(error) => {
            warn!(%error, "readiness probe failed, treating as not ready");
            return ReadyForPrimary::NotOk;
        }
    };

    let Some(read_pos) = status.get(REPL_READ_MASTER_LOG_POS) else {
        // Never replicated: a genuinely fresh, primary-eligible node.
        return ReadyForPrimary::Ok;
    };

    let exec_pos = status.get(REPL_EXEC_MASTER_LOG_POS);
    let master_file = status.get(REPL_MASTER_LOG_FILE);
    let relay_file = status.get(REPL_RELAY_MASTER_LOG_FILE);

    if Some(read_pos) == exec_pos && master_file == relay_file {
        ReadyForPrimary::Ok
    } else {
        ReadyForPrimary::NotOk
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{FakeDbConnector, FakeRouteAdvertiser, FakeServiceConnector};
    use crate::role::{community_for_role, Role};
    use crate::ports::Route;

    fn route(addr: [u8; 4], role: Role) -> Route {
        Route {
            prefix: Ipv4Addr::from(addr),
            prefix_len: 32,
            community: community_for_role(role).unwrap(),
        }
    }

    #[tokio::test]
    async fn filters_own_address_and_short_prefixes_and_unknown_communities() {
        let mut advertiser = FakeRouteAdvertiser::default();
        advertiser.rib = vec![
            route([10, 0, 0, 1], Role::Fault), // own address
            Route {
                prefix: Ipv4Addr::new(10, 0, 0, 9),
                prefix_len: 31,
                community: community_for_role(Role::Primary).unwrap(),
            },
            Route {
                prefix: Ipv4Addr::new(10, 0, 0, 8),
                prefix_len: 32,
                community: crate::role::Community::new(65000, 99),
            },
            route([10, 0, 0, 2], Role::Replica),
        ];

        let neighbors = observe_neighbors(&mut advertiser, Ipv4Addr::new(10, 0, 0, 1))
            .await
            .unwrap();

        assert!(!neighbors.has_any(Role::Fault));
        assert!(!neighbors.has_any(Role::Primary));
        assert!(neighbors.has_any(Role::Replica));
        assert_eq!(neighbors.neighbors(Role::Replica).len(), 1);
    }

    #[tokio::test]
    async fn health_not_ok_forces_readiness_not_ok() {
        let mut service = FakeServiceConnector::default();
        let mut db = FakeDbConnector::default();
        db.replication_status
            .insert(REPL_READ_MASTER_LOG_POS.to_string(), "100".to_string());

        let health = observe_health(&mut service).await;
        assert_eq!(health, HealthResult::NotOk);

        // Readiness is only probed when health is Ok; the caller enforces this,
        // so directly exercise that the probe itself would say "caught up".
        let readiness = observe_readiness(&mut db).await;
        assert_eq!(readiness, ReadyForPrimary::NotOk);
    }

    #[tokio::test]
    async fn fresh_node_never_replicated_is_ready() {
        let mut db = FakeDbConnector::default();
        assert_eq!(observe_readiness(&mut db).await, ReadyForPrimary::Ok);
    }

    #[tokio::test]
    async fn caught_up_replica_is_ready() {
        let mut db = FakeDbConnector::default();
        db.replication_status
            .insert(REPL_READ_MASTER_LOG_POS.to_string(), "500".to_string());
        db.replication_status
            .insert(REPL_EXEC_MASTER_LOG_POS.to_string(), "500".to_string());
        db.replication_status
            .insert(REPL_MASTER_LOG_FILE.to_string(), "binlog.3".to_string());
        db.replication_status
            .insert(REPL_RELAY_MASTER_LOG_FILE.to_string(), "binlog.3".to_string());

        assert_eq!(observe_readiness(&mut db).await, ReadyForPrimary::Ok);
    }

    #[tokio::test]
    async fn lagging_replica_is_not_ready() {
        let mut db = FakeDbConnector::default();
        db.replication_status
            .insert(REPL_READ_MASTER_LOG_POS.to_string(), "500".to_string());
        db.replication_status
            .insert(REPL_EXEC_MASTER_LOG_POS.to_string(), "400".to_string());

        assert_eq!(observe_readiness(&mut db).await, ReadyForPrimary::NotOk);
    }
}
