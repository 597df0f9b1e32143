//! The four external collaborator ports the controller depends on.
//!
//! Each port is a narrow, fully-specified interface to an external system:
//! the BGP speaker, the database, the firewall, and the service supervisor.
//! The core only ever talks to these traits, never to `Command` directly,
//! so that tests can swap in the in-memory fakes from [`crate::fakes`].
//! Concrete implementations live under [`crate::collaborators`] and all
//! shell out to an external program under a per-call timeout.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::error::Result;
use crate::role::Community;

/// Health of the local database service unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthResult {
    Ok,
    NotOk,
}

/// Whether the local replication position allows safe promotion to Primary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyForPrimary {
    Ok,
    NotOk,
}

/// GTID acquisition mode for `CHANGE MASTER TO ... master_use_gtid = <mode>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GtidMode {
    CurrentPos,
    SlavePos,
    No,
}

impl GtidMode {
    pub fn as_sql(self) -> &'static str {
        match self {
            GtidMode::CurrentPos => "current_pos",
            GtidMode::SlavePos => "slave_pos",
            GtidMode::No => "no",
        }
    }
}

/// A mapping of well-known replication-status keys to their string values,
/// as returned by `SHOW REPLICA STATUS`.
pub type ReplicationStatus = HashMap<String, String>;

pub const REPL_SLAVE_IO_RUNNING: &str = "Slave_IO_Running";
pub const REPL_SLAVE_SQL_RUNNING: &str = "Slave_SQL_Running";
pub const REPL_MASTER_LOG_FILE: &str = "Master_Log_File";
pub const REPL_READ_MASTER_LOG_POS: &str = "Read_Master_Log_Pos";
pub const REPL_EXEC_MASTER_LOG_POS: &str = "Exec_Master_Log_Pos";
pub const REPL_RELAY_MASTER_LOG_FILE: &str = "Relay_Master_Log_File";
pub const REPL_STATUS_YES: &str = "Yes";

/// An advertised route: a host prefix paired with the first recognized
/// community carried on it. Only `prefix_len == 32` routes are meaningful;
/// the core discards others during observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub prefix: Ipv4Addr,
    pub prefix_len: u8,
    pub community: Community,
}

/// Port onto the BGP speaker that advertises this node's role to its peers.
pub trait RouteAdvertiser {
    /// Begins BGP speaking and establishes peering with the configured neighbors.
    fn start(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Installs or replaces the advertisement for `own_address` with the
    /// given route. A no-op with respect to the old advertisement.
    fn add_path(&mut self, route: Route) -> impl Future<Output = Result<()>> + Send;

    /// Returns the current RIB for the IPv4 unicast family, including
    /// routes from all peers and from this node itself.
    fn list_path(&mut self) -> impl Future<Output = Result<Vec<Route>>> + Send;

    /// Tears down peering.
    fn stop(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Port onto the managed MariaDB instance.
pub trait DbConnector {
    fn is_read_only(&mut self) -> impl Future<Output = Result<bool>> + Send;
    fn set_read_only(&mut self, read_only: bool) -> impl Future<Output = Result<()>> + Send;

    fn start_replica(&mut self) -> impl Future<Output = Result<()>> + Send;
    fn stop_replica(&mut self) -> impl Future<Output = Result<()>> + Send;
    fn reset_all_replicas(&mut self) -> impl Future<Output = Result<()>> + Send;

    fn change_master_to(
        &mut self,
        host: Ipv4Addr,
        port: u16,
        user: &str,
        password: &str,
        gtid_mode: GtidMode,
    ) -> impl Future<Output = Result<()>> + Send;

    fn show_replication_status(&mut self) -> impl Future<Output = Result<ReplicationStatus>> + Send;

    fn create_database(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    fn create_id_table(&mut self, database: &str, table: &str) -> impl Future<Output = Result<()>> + Send;
    fn insert_id(&mut self, database: &str, table: &str, id: i64) -> impl Future<Output = Result<()>> + Send;
    fn delete_all(&mut self, database: &str, table: &str) -> impl Future<Output = Result<()>> + Send;

    /// Deletes `master.info`, idempotently (absence is success).
    fn remove_master_info(&mut self) -> impl Future<Output = Result<()>> + Send;
    /// Deletes `relay-log.info`, idempotently (absence is success).
    fn remove_relay_info(&mut self) -> impl Future<Output = Result<()>> + Send;
}

/// Match criteria for a firewall rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    InboundInterface(String),
    TcpDestinationPort(u16),
}

/// The action a firewall rule takes on matching traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Statement {
    Accept,
    Reject,
}

/// Port onto the local firewall (nftables).
pub trait FirewallConnector {
    /// Ensures a filter chain named `name`, hooked on input, exists. Idempotent.
    fn create_chain(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    fn flush_chain(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    fn add_rule(
        &mut self,
        name: &str,
        matches: &[Match],
        statement: Statement,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Port onto systemd (or an equivalent service supervisor) for the database unit.
pub trait ServiceConnector {
    fn start_service(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    fn stop_service(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    /// Sends SIGKILL to the service's main process.
    fn kill_service(&mut self, name: &str) -> impl Future<Output = Result<()>> + Send;
    fn check_service_status(&mut self, name: &str) -> impl Future<Output = Result<HealthResult>> + Send;
}
