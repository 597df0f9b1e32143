//! In-memory fakes for the four external collaborator ports, for tests.
//!
//! Each fake records the timestamp of every call it receives so that tests
//! can assert ordering across subsystems (e.g. "replication was stopped
//! before the firewall rule was replaced") by comparing timestamps rather
//! than by threading a shared call counter through the test.

use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Instant;

use crate::error::Result;
use crate::ports::{
    DbConnector, FirewallConnector, GtidMode, HealthResult, Match, ReplicationStatus,
    RouteAdvertiser, Route, ServiceConnector, Statement,
};

/// A single recorded call, with the instant it was observed.
#[derive(Debug, Clone)]
pub struct Call {
    pub op: &'static str,
    pub at: Instant,
}

fn record(log: &mut Vec<Call>, op: &'static str) {
    log.push(Call {
        op,
        at: Instant::now(),
    });
}

/// Fake [`RouteAdvertiser`] backed by an in-memory RIB.
#[derive(Debug, Default)]
pub struct FakeRouteAdvertiser {
    pub calls: Vec<Call>,
    pub rib: Vec<Route>,
    pub started: bool,
    pub fail_list_path: bool,
}

impl RouteAdvertiser for FakeRouteAdvertiser {
    async fn start(&mut self) -> Result<()> {
        record(&mut self.calls, "start");
        self.started = true;
        Ok(())
    }

    async fn add_path(&mut self, route: Route) -> Result<()> {
        record(&mut self.calls, "add_path");
        self.rib.retain(|r| r.prefix != route.prefix);
        self.rib.push(route);
        Ok(())
    }

    async fn list_path(&mut self) -> Result<Vec<Route>> {
        record(&mut self.calls, "list_path");
        if self.fail_list_path {
            return Err(crate::error::Error::RouteAdvertiser("fake: forced failure".into()));
        }
        Ok(self.rib.clone())
    }

    async fn stop(&mut self) -> Result<()> {
        record(&mut self.calls, "stop");
        self.started = false;
        Ok(())
    }
}

/// Fake [`DbConnector`] backed by in-memory state.
#[derive(Debug)]
pub struct FakeDbConnector {
    pub calls: Vec<Call>,
    pub read_only: bool,
    pub replica_running: bool,
    pub replication_status: ReplicationStatus,
    pub databases: HashMap<(String, String), Vec<i64>>,
    pub fail_next_write: bool,
}

impl Default for FakeDbConnector {
    fn default() -> Self {
        Self {
            calls: Vec::new(),
            read_only: false,
            replica_running: false,
            replication_status: ReplicationStatus::new(),
            databases: HashMap::new(),
            fail_next_write: false,
        }
    }
}

impl DbConnector for FakeDbConnector {
    async fn is_read_only(&mut self) -> Result<bool> {
        record(&mut self.calls, "is_read_only");
        Ok(self.read_only)
    }

    async fn set_read_only(&mut self, read_only: bool) -> Result<()> {
        record(&mut self.calls, "set_read_only");
        self.read_only = read_only;
        Ok(())
    }

    async fn start_replica(&mut self) -> Result<()> {
        record(&mut self.calls, "start_replica");
        self.replica_running = true;
        Ok(())
    }

    async fn stop_replica(&mut self) -> Result<()> {
        record(&mut self.calls, "stop_replica");
        self.replica_running = false;
        Ok(())
    }

    async fn reset_all_replicas(&mut self) -> Result<()> {
        record(&mut self.calls, "reset_all_replicas");
        Ok(())
    }

    async fn change_master_to(
        &mut self,
        _host: Ipv4Addr,
        _port: u16,
        _user: &str,
        _password: &str,
        _gtid_mode: GtidMode,
    ) -> Result<()> {
        record(&mut self.calls, "change_master_to");
        Ok(())
    }

    async fn show_replication_status(&mut self) -> Result<ReplicationStatus> {
        record(&mut self.calls, "show_replication_status");
        Ok(self.replication_status.clone())
    }

    async fn create_database(&mut self, _name: &str) -> Result<()> {
        record(&mut self.calls, "create_database");
        if self.fail_next_write {
            return Err(crate::error::Error::Db("fake: forced failure".into()));
        }
        Ok(())
    }

    async fn create_id_table(&mut self, _database: &str, _table: &str) -> Result<()> {
        record(&mut self.calls, "create_id_table");
        Ok(())
    }

    async fn insert_id(&mut self, database: &str, table: &str, id: i64) -> Result<()> {
        record(&mut self.calls, "insert_id");
        self.databases
            .entry((database.to_string(), table.to_string()))
            .or_default()
            .push(id);
        Ok(())
    }

    async fn delete_all(&mut self, database: &str, table: &str) -> Result<()> {
        record(&mut self.calls, "delete_all");
        if let Some(rows) = self
            .databases
            .get_mut(&(database.to_string(), table.to_string()))
        {
            rows.clear();
        }
        Ok(())
    }

    async fn remove_master_info(&mut self) -> Result<()> {
        record(&mut self.calls, "remove_master_info");
        Ok(())
    }

    async fn remove_relay_info(&mut self) -> Result<()> {
        record(&mut self.calls, "remove_relay_info");
        Ok(())
    }
}

/// Fake [`FirewallConnector`] backed by in-memory chains.
#[derive(Debug, Default)]
pub struct FakeFirewallConnector {
    pub calls: Vec<Call>,
    pub chains: HashMap<String, Vec<(Vec<Match>, Statement)>>,
}

impl FirewallConnector for FakeFirewallConnector {
    async fn create_chain(&mut self, name: &str) -> Result<()> {
        record(&mut self.calls, "create_chain");
        self.chains.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn flush_chain(&mut self, name: &str) -> Result<()> {
        record(&mut self.calls, "flush_chain");
        if let Some(rules) = self.chains.get_mut(name) {
            rules.clear();
        }
        Ok(())
    }

    async fn add_rule(&mut self, name: &str, matches: &[Match], statement: Statement) -> Result<()> {
        record(&mut self.calls, "add_rule");
        self.chains
            .entry(name.to_string())
            .or_default()
            .push((matches.to_vec(), statement));
        Ok(())
    }
}

/// Fake [`ServiceConnector`] backed by in-memory service states.
#[derive(Debug, Default)]
pub struct FakeServiceConnector {
    pub calls: Vec<Call>,
    pub running: HashMap<String, bool>,
}

impl ServiceConnector for FakeServiceConnector {
    async fn start_service(&mut self, name: &str) -> Result<()> {
        record(&mut self.calls, "start_service");
        self.running.insert(name.to_string(), true);
        Ok(())
    }

    async fn stop_service(&mut self, name: &str) -> Result<()> {
        record(&mut self.calls, "stop_service");
        self.running.insert(name.to_string(), false);
        Ok(())
    }

    async fn kill_service(&mut self, name: &str) -> Result<()> {
        record(&mut self.calls, "kill_service");
        self.running.insert(name.to_string(), false);
        Ok(())
    }

    async fn check_service_status(&mut self, name: &str) -> Result<HealthResult> {
        record(&mut self.calls, "check_service_status");
        Ok(if *self.running.get(name).unwrap_or(&false) {
            HealthResult::Ok
        } else {
            HealthResult::NotOk
        })
    }
}
