//! [`RouteAdvertiser`] backed by FRR's `vtysh` CLI.

use std::net::Ipv4Addr;
use std::time::Duration;

use crate::collaborators::run;
use crate::config::{BgpPeer, ControllerConfig};
use crate::error::{Error, Result};
use crate::ports::{Route, RouteAdvertiser};
use crate::role::{community_for_role, role_for_community, Community};

const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Speaks to a local FRR instance through `vtysh`. Peering and route
/// advertisement are configured declaratively; the RIB is read back with
/// `show bgp ipv4 unicast json`.
pub struct FrrRouteAdvertiser {
    local_asn: u32,
    peers: Vec<BgpPeer>,
}

impl FrrRouteAdvertiser {
    pub fn new(config: &ControllerConfig) -> Self {
        Self {
            local_asn: config.bgp_local_asn,
            peers: config.bgp_peers.clone(),
        }
    }

    async fn vtysh(&self, config_lines: &[String]) -> Result<String> {
        let mut args = vec!["-c".to_string(), "configure terminal".to_string()];
        for line in config_lines {
            args.push("-c".to_string());
            args.push(line.clone());
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run("vtysh", &args, COMMAND_TIMEOUT, Error::RouteAdvertiser).await
    }
}

impl RouteAdvertiser for FrrRouteAdvertiser {
    async fn start(&mut self) -> Result<()> {
        let mut lines = vec![format!("router bgp {}", self.local_asn)];
        for peer in &self.peers {
            lines.push(format!("neighbor {} remote-as {}", peer.address, peer.asn));
        }
        self.vtysh(&lines).await?;
        Ok(())
    }

    async fn add_path(&mut self, route: Route) -> Result<()> {
        let network = format!("network {}/{}", route.prefix, route.prefix_len);
        let community = format!(
            "set community {}:{} additive",
            route.community.asn(),
            route.community.value()
        );
        self.vtysh(&[
            format!("router bgp {}", self.local_asn),
            "address-family ipv4 unicast".to_string(),
            network,
            community,
        ])
        .await?;
        Ok(())
    }

    async fn list_path(&mut self) -> Result<Vec<Route>> {
        let output = run(
            "vtysh",
            &["-c", "show bgp ipv4 unicast json"],
            COMMAND_TIMEOUT,
            Error::RouteAdvertiser,
        )
        .await?;
        parse_rib(&output)
    }

    async fn stop(&mut self) -> Result<()> {
        self.vtysh(&[format!("no router bgp {}", self.local_asn)]).await?;
        Ok(())
    }
}

/// Parses FRR's `show bgp ipv4 unicast json` output. Each top-level key is
/// a prefix in `address/len` form; each entry's `path.community.list`
/// (if present) carries the route's communities as `"asn:value"` strings.
fn parse_rib(raw: &str) -> Result<Vec<Route>> {
    let parsed: serde_json::Value = serde_json::from_str(raw)
        .map_err(|error| Error::RouteAdvertiser(format!("malformed RIB json: {error}")))?;

    let Some(routes) = parsed.get("routes").and_then(|v| v.as_object()) else {
        return Ok(Vec::new());
    };

    let mut result = Vec::new();
    for (prefix, paths) in routes {
        let Some((address, len)) = prefix.split_once('/') else {
            continue;
        };
        let Ok(address) = address.parse::<Ipv4Addr>() else {
            continue;
        };
        let Ok(prefix_len) = len.parse::<u8>() else {
            continue;
        };

        let Some(first_path) = paths.as_array().and_then(|a| a.first()) else {
            continue;
        };
        let Some(community_list) = first_path
            .get("community")
            .and_then(|c| c.get("list"))
            .and_then(|l| l.as_array())
        else {
            continue;
        };

        for entry in community_list {
            let Some(text) = entry.as_str() else {
                continue;
            };
            let Some((asn, value)) = text.split_once(':') else {
                continue;
            };
            let (Ok(asn), Ok(value)) = (asn.parse::<u16>(), value.parse::<u16>()) else {
                continue;
            };
            let community = Community::new(asn, value);
            if role_for_community(community).is_some() {
                result.push(Route {
                    prefix: address,
                    prefix_len,
                    community,
                });
                break;
            }
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Role;

    #[test]
    fn parses_known_community_routes_and_skips_malformed_entries() {
        // Prefix-length filtering is observe_neighbors' job (observe.rs), not
        // parse_rib's, so this fixture only varies community validity.
        let json = serde_json::json!({
            "routes": {
                "10.0.0.2/32": [{
                    "community": { "list": ["65000:3"] }
                }],
                "10.0.0.9/32": [{
                    "community": { "list": ["65000:99"] }
                }],
            }
        })
        .to_string();

        let routes = parse_rib(&json).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].prefix, Ipv4Addr::new(10, 0, 0, 2));
        assert_eq!(routes[0].prefix_len, 32);
        assert_eq!(community_for_role(Role::Primary).unwrap(), routes[0].community);
    }

    #[test]
    fn does_not_filter_by_prefix_length() {
        let json = serde_json::json!({
            "routes": {
                "10.0.0.0/24": [{
                    "community": { "list": ["65000:3"] }
                }],
            }
        })
        .to_string();

        let routes = parse_rib(&json).unwrap();
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].prefix_len, 24);
    }
}
