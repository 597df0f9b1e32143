//! [`FirewallConnector`] backed by the `nft` CLI.

use std::time::Duration;

use crate::collaborators::run;
use crate::error::{Error, Result};
use crate::ports::{FirewallConnector, Match, Statement};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);
const TABLE: &str = "filter";

/// Manages a single nftables chain in the `inet filter` table.
pub struct NftFirewallConnector;

impl NftFirewallConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for NftFirewallConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl FirewallConnector for NftFirewallConnector {
    async fn create_chain(&mut self, name: &str) -> Result<()> {
        // Idempotent: nft errors if the chain already exists, so probe first.
        let probe = run(
            "nft",
            &["list", "chain", "inet", TABLE, name],
            COMMAND_TIMEOUT,
            Error::Firewall,
        )
        .await;
        if probe.is_ok() {
            return Ok(());
        }

        run(
            "nft",
            &[
                "add", "chain", "inet", TABLE, name,
                "{", "type", "filter", "hook", "input", "priority", "0", ";", "}",
            ],
            COMMAND_TIMEOUT,
            Error::Firewall,
        )
        .await?;
        Ok(())
    }

    async fn flush_chain(&mut self, name: &str) -> Result<()> {
        run(
            "nft",
            &["flush", "chain", "inet", TABLE, name],
            COMMAND_TIMEOUT,
            Error::Firewall,
        )
        .await?;
        Ok(())
    }

    async fn add_rule(&mut self, name: &str, matches: &[Match], statement: Statement) -> Result<()> {
        let mut rule = vec!["add".to_string(), "rule".to_string(), "inet".to_string(), TABLE.to_string(), name.to_string()];
        for m in matches {
            match m {
                Match::InboundInterface(interface) => {
                    rule.push("iifname".to_string());
                    rule.push(interface.clone());
                }
                Match::TcpDestinationPort(port) => {
                    rule.push("tcp".to_string());
                    rule.push("dport".to_string());
                    rule.push(port.to_string());
                }
            }
        }
        rule.push(
            match statement {
                Statement::Accept => "accept",
                Statement::Reject => "reject",
            }
            .to_string(),
        );

        let args: Vec<&str> = rule.iter().map(String::as_str).collect();
        run("nft", &args, COMMAND_TIMEOUT, Error::Firewall).await?;
        Ok(())
    }
}
