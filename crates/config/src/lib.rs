// SPDX-License-Identifier: PolyForm-Shield-1.0

//! Root configuration for a fabric node: where its multicast ganglion
//! binds, how aggressively it heartbeats and proposes, and which
//! channels/codecs it is willing to carry.

use std::collections::HashSet;
use std::net::Ipv4Addr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

fn default_port() -> u16 {
    9301
}

fn default_heartbeat_interval_seconds() -> u64 {
    30
}

fn default_proposal_timeout_seconds() -> u64 {
    5
}

/// Deserialized shape of the TOML file; `FabricConfig::load` turns this
/// into the typed, ready-to-use form the rest of the fabric consumes.
#[derive(Debug, Deserialize)]
struct RawFabricConfig {
    bind_interface: Option<Ipv4Addr>,
    multicast_cidr: String,
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_heartbeat_interval_seconds")]
    heartbeat_interval_seconds: u64,
    #[serde(default = "default_proposal_timeout_seconds")]
    proposal_timeout_seconds: u64,
    #[serde(default)]
    relevant_neurons: Option<Vec<String>>,
    #[serde(default)]
    ignored_neurons: Vec<String>,
    #[serde(default)]
    allowed_codecs: Option<Vec<String>>,
}

/// A fully resolved, typed configuration for one fabric node's multicast
/// ganglion.
#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub bind_interface: Ipv4Addr,
    pub multicast_cidr: ipnet::Ipv4Net,
    pub port: u16,
    pub heartbeat_interval: Duration,
    pub proposal_timeout: Duration,
    pub relevant_neurons: Option<HashSet<String>>,
    pub ignored_neurons: HashSet<String>,
    pub allowed_codecs: Option<HashSet<String>>,
}

impl FabricConfig {
    /// Read and parse a TOML file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading config file {}", path.display()))?;
        Self::parse(&raw)
    }

    /// Parse an already-read TOML document. Exposed separately so tests
    /// and embedders don't need a file on disk.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw: RawFabricConfig = toml::from_str(raw).context("parsing fabric configuration")?;
        Ok(Self {
            bind_interface: raw.bind_interface.unwrap_or(Ipv4Addr::UNSPECIFIED),
            multicast_cidr: raw.multicast_cidr.parse().context("parsing multicast_cidr as an IPv4 CIDR")?,
            port: raw.port,
            heartbeat_interval: Duration::from_secs(raw.heartbeat_interval_seconds),
            proposal_timeout: Duration::from_secs(raw.proposal_timeout_seconds),
            relevant_neurons: raw.relevant_neurons.map(|v| v.into_iter().collect()),
            ignored_neurons: raw.ignored_neurons.into_iter().collect(),
            allowed_codecs: raw.allowed_codecs.map(|v| v.into_iter().collect()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_document_with_defaults() {
        let cfg = FabricConfig::parse(r#"multicast_cidr = "239.5.0.0/16""#).unwrap();
        assert_eq!(cfg.port, 9301);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(cfg.proposal_timeout, Duration::from_secs(5));
        assert!(cfg.relevant_neurons.is_none());
        assert!(cfg.ignored_neurons.is_empty());
    }

    #[test]
    fn parses_full_document() {
        let doc = r#"
            bind_interface = "10.0.0.5"
            multicast_cidr = "239.5.0.0/16"
            port = 9400
            heartbeat_interval_seconds = 10
            proposal_timeout_seconds = 2
            relevant_neurons = ["orders.v2.Order.json"]
            ignored_neurons = ["debug.v1.Ping.json"]
            allowed_codecs = ["json"]
        "#;
        let cfg = FabricConfig::parse(doc).unwrap();
        assert_eq!(cfg.bind_interface, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(cfg.port, 9400);
        assert_eq!(cfg.heartbeat_interval, Duration::from_secs(10));
        assert!(cfg.relevant_neurons.unwrap().contains("orders.v2.Order.json"));
        assert!(cfg.ignored_neurons.contains("debug.v1.Ping.json"));
    }

    #[test]
    fn rejects_malformed_cidr() {
        let doc = r#"multicast_cidr = "not-a-cidr""#;
        assert!(FabricConfig::parse(doc).is_err());
    }
}
