//! `db-controller` — runs one node's role-election controller.
//!
//! Discovers this node's address on the configured interface, reads the
//! replication password off disk, validates the assembled configuration,
//! and hands off to [`kimberlite_cluster::run_controller`].

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use kimberlite_cluster::config::{BgpPeer, ControllerConfig, LogLevel};
use tracing::info;
use tracing_subscriber::FmtSubscriber;

const ADDRESS_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "db-controller")]
#[command(
    version,
    about = "Per-node role-election controller for a BGP-routed MariaDB cluster",
    long_about = None
)]
struct Cli {
    /// One of debug, info, warning, error.
    #[arg(long, default_value = "warning")]
    log_level: String,

    /// Exclusive process-singleton lock path.
    #[arg(long, default_value = "/var/run/db-controller/lock")]
    lock_filepath: PathBuf,

    /// TCP port the managed database service listens on.
    #[arg(long, default_value_t = 3306, value_parser = clap::value_parser!(u16).range(1..=65535))]
    db_serving_port: u16,

    /// Username replicas authenticate as against the primary.
    #[arg(long, default_value = "repl")]
    db_replica_user_name: String,

    /// Path to a file containing the replica password.
    #[arg(long, default_value = "/var/run/db-controller/.db-replica-password")]
    db_replica_password_filepath: PathBuf,

    /// Port replicas connect to on the primary for replication traffic.
    #[arg(long, default_value_t = 13306, value_parser = clap::value_parser!(u16).range(1..=65535))]
    db_replica_source_port: u16,

    /// Network interface whose address identifies this node.
    #[arg(long, default_value = "eth0")]
    global_interface_name: String,

    /// nftables chain name used for the database access-control rule.
    #[arg(long, default_value = "mariadb")]
    chain_name_for_db_acl: String,

    /// Seconds between controller ticks.
    #[arg(long, default_value_t = 4)]
    main_polling_span_second: u64,

    /// Enables the `/status` and `/healthcheck` HTTP API server.
    #[arg(long, default_value_t = true)]
    http_api: bool,

    #[arg(long, default_value_t = 54545, value_parser = clap::value_parser!(u16).range(1..=65535))]
    http_api_server_port: u16,

    /// Enables the Prometheus `/metrics` exporter.
    #[arg(long, default_value_t = true)]
    prometheus_exporter: bool,

    #[arg(long, default_value_t = 50505, value_parser = clap::value_parser!(u16).range(1..=65535))]
    prometheus_exporter_port: u16,

    /// This node's local BGP AS number.
    #[arg(long, default_value_t = 0)]
    bgp_local_asn: u32,

    /// Address of BGP peer #1 (the first sibling node).
    #[arg(long)]
    bgp_peer1_addr: Ipv4Addr,
    #[arg(long, default_value_t = 0)]
    bgp_peer1_asn: u32,

    /// Address of BGP peer #2 (the second sibling node).
    #[arg(long)]
    bgp_peer2_addr: Ipv4Addr,
    #[arg(long, default_value_t = 0)]
    bgp_peer2_asn: u32,

    #[arg(long, default_value_t = 179, value_parser = clap::value_parser!(u16).range(1..=65535))]
    bgp_serving_port: u16,

    #[arg(long, default_value_t = 3)]
    bgp_keepalive_interval_sec: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = LogLevel::parse(&cli.log_level).ok_or_else(|| {
        anyhow!(
            "invalid --log-level '{}': expected debug, info, warning, or error",
            cli.log_level
        )
    })?;
    init_logging(log_level);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the tokio runtime")?;
    runtime.block_on(run(cli))
}

fn init_logging(level: LogLevel) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level.as_tracing_level())
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(cli: Cli) -> Result<()> {
    let db_replica_password = std::fs::read_to_string(&cli.db_replica_password_filepath)
        .with_context(|| {
            format!(
                "failed to read replica password from {}",
                cli.db_replica_password_filepath.display()
            )
        })?
        .trim()
        .to_string();

    let host_address = discover_host_address(&cli.global_interface_name)
        .await
        .with_context(|| format!("failed to discover address on interface {}", cli.global_interface_name))?;

    info!(%host_address, interface = %cli.global_interface_name, "discovered host address");

    let config = ControllerConfig {
        host_address,
        global_interface_name: cli.global_interface_name,
        db_serving_port: cli.db_serving_port,
        db_replica_user_name: cli.db_replica_user_name,
        db_replica_password,
        db_replica_source_port: cli.db_replica_source_port,
        db_acl_chain_name: cli.chain_name_for_db_acl,
        bgp_local_asn: cli.bgp_local_asn,
        bgp_peers: vec![
            BgpPeer {
                address: cli.bgp_peer1_addr,
                asn: cli.bgp_peer1_asn,
            },
            BgpPeer {
                address: cli.bgp_peer2_addr,
                asn: cli.bgp_peer2_asn,
            },
        ],
        bgp_serving_port: cli.bgp_serving_port,
        bgp_keepalive_interval: Duration::from_secs(cli.bgp_keepalive_interval_sec),
        main_polling_span: Duration::from_secs(cli.main_polling_span_second),
        lock_filepath: cli.lock_filepath,
        http_api_port: cli.http_api.then_some(cli.http_api_server_port),
        prometheus_exporter_port: cli.prometheus_exporter.then_some(cli.prometheus_exporter_port),
    };

    kimberlite_cluster::run_controller(config).await.map_err(Into::into)
}

/// Discovers this host's IPv4 address on `interface` by shelling out to
/// `ip -4 -o addr show dev <interface>` and parsing the first `inet` token.
async fn discover_host_address(interface: &str) -> Result<Ipv4Addr> {
    let output = tokio::time::timeout(
        ADDRESS_DISCOVERY_TIMEOUT,
        tokio::process::Command::new("ip")
            .args(["-4", "-o", "addr", "show", "dev", interface])
            .output(),
    )
    .await
    .context("ip addr show timed out")?
    .context("failed to run ip addr show")?;

    if !output.status.success() {
        bail!(
            "ip addr show dev {interface} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    let text = String::from_utf8_lossy(&output.stdout);
    parse_inet_address(&text).ok_or_else(|| anyhow!("no inet address found on interface {interface}"))
}

/// Parses the first `inet <addr>/<prefix>` token out of `ip -o addr show` output.
fn parse_inet_address(text: &str) -> Option<Ipv4Addr> {
    for line in text.lines() {
        let mut fields = line.split_whitespace();
        while let Some(field) = fields.next() {
            if field == "inet" {
                let cidr = fields.next()?;
                let addr = cidr.split('/').next()?;
                return addr.parse().ok();
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_inet_address_from_ip_addr_show_output() {
        let output = "2: eth0    inet 10.0.0.1/24 brd 10.0.0.255 scope global eth0\n       valid_lft forever preferred_lft forever\n";
        assert_eq!(parse_inet_address(output), Some(Ipv4Addr::new(10, 0, 0, 1)));
    }

    #[test]
    fn missing_inet_token_yields_none() {
        assert_eq!(parse_inet_address("2: eth0    link/ether aa:bb:cc:dd:ee:ff\n"), None);
    }
}
