//! Controller configuration: the immutable, CLI-supplied half of [`crate::state`].

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// The systemd unit name of the managed database service.
pub const MARIADB_SERVICE_NAME: &str = "mariadb";

/// A BGP peer this controller establishes a session with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BgpPeer {
    pub address: Ipv4Addr,
    pub asn: u32,
}

/// Immutable configuration for one controller instance, built from CLI flags.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// This node's own address on `global_interface_name`, discovered at startup.
    pub host_address: Ipv4Addr,

    /// Name of the network interface whose address identifies this node.
    pub global_interface_name: String,

    /// TCP port the database service listens on.
    pub db_serving_port: u16,
    /// Username the replicas authenticate as against the primary.
    pub db_replica_user_name: String,
    /// Password the replicas authenticate with (read from `--db-replica-password-filepath`).
    pub db_replica_password: String,
    /// Port replicas connect to on the primary for replication traffic.
    pub db_replica_source_port: u16,

    /// nftables chain name used for the database access-control rule.
    pub db_acl_chain_name: String,

    /// Local BGP AS number.
    pub bgp_local_asn: u32,
    /// The (exactly two, for a three-node cluster) configured BGP peers.
    pub bgp_peers: Vec<BgpPeer>,
    /// Local port the BGP speaker listens on.
    pub bgp_serving_port: u16,
    /// BGP keepalive interval.
    pub bgp_keepalive_interval: Duration,

    /// Interval between controller ticks.
    pub main_polling_span: Duration,

    /// Path to the exclusive process-singleton lock file.
    pub lock_filepath: PathBuf,

    /// Port the `/status` and `/healthcheck` HTTP API listens on, if enabled.
    pub http_api_port: Option<u16>,
    /// Port the Prometheus `/metrics` exporter listens on, if enabled.
    pub prometheus_exporter_port: Option<u16>,
}

impl ControllerConfig {
    /// Validates cross-field invariants not expressible in the flag parser itself:
    /// an ASN must be configured, and exactly two peers (one per sibling, for a
    /// three-node cluster) must be configured.
    pub fn validate(&self) -> Result<()> {
        if self.bgp_local_asn == 0 {
            return Err(Error::Validation(
                "--bgp-local-asn must be specified".to_string(),
            ));
        }
        if self.bgp_peers.len() != 2 {
            return Err(Error::Validation(format!(
                "expected exactly 2 BGP peers for a 3-node cluster, got {}",
                self.bgp_peers.len()
            )));
        }
        if self.bgp_peers.iter().any(|p| p.asn == 0) {
            return Err(Error::Validation(
                "every configured BGP peer must have a nonzero ASN".to_string(),
            ));
        }
        Ok(())
    }
}

/// Log level accepted by `--log-level`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "debug" => Some(LogLevel::Debug),
            "info" => Some(LogLevel::Info),
            "warning" => Some(LogLevel::Warning),
            "error" => Some(LogLevel::Error),
            _ => None,
        }
    }

    pub fn as_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warning => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ControllerConfig {
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
                BgpPeer {
                    address: Ipv4Addr::new(10, 0, 0, 2),
                    asn: 65002,
                },
                BgpPeer {
                    address: Ipv4Addr::new(10, 0, 0, 3),
                    asn: 65003,
                },
            ],
            bgp_serving_port: 179,
            bgp_keepalive_interval: Duration::from_secs(3),
            main_polling_span: Duration::from_secs(4),
            lock_filepath: PathBuf::from("/var/run/db-controller/lock"),
            http_api_port: Some(54545),
            prometheus_exporter_port: Some(50505),
        }
    }

    #[test]
    fn valid_config_passes() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_asn_is_rejected() {
        let mut config = base_config();
        config.bgp_local_asn = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn wrong_peer_count_is_rejected() {
        let mut config = base_config();
        config.bgp_peers.pop();
        assert!(config.validate().is_err());
    }

    #[test]
    fn log_level_parses_known_values() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse("loud"), None);
    }
}
