//! Configuration surface (spec.md §6): local identity plus one entry per
//! configured peer, loaded from a TOML file.

use std::net::Ipv4Addr;

use serde::Deserialize;

use crate::error::{BgpError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub local_identifier: Ipv4Addr,
    pub local_asn: u16,
    pub local_hold_time: u16,
    #[serde(default)]
    pub peers: Vec<PeerConfig>,
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| BgpError::Configuration(e.to_string()))
    }

    pub fn load(path: &std::path::Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

/// Per-peer behavior flags from spec.md §3. `delay_open` and
/// `send_notification_without_open` are config fields that are acted on
/// only where spec.md says they are (capability negotiation itself is
/// never performed, per the Non-goals in spec.md §1).
/// `collision_detect_established_state` is part of the same data model but
/// §4.5's collision algorithm as given never branches on it; carried as a
/// parsed, inert field for the same reason `delay_open` is.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PeerConfig {
    pub peer_ip: Ipv4Addr,
    pub peer_asn: u16,
    #[serde(default)]
    pub active_mode: bool,
    #[serde(default)]
    pub passive_mode: bool,
    #[serde(default)]
    pub allow_automatic_start: bool,
    #[serde(default)]
    pub allow_automatic_stop: bool,
    #[serde(default)]
    pub damp_peer_oscillations: bool,
    #[serde(default)]
    pub delay_open: bool,
    #[serde(default)]
    pub send_notification_without_open: bool,
    #[serde(default)]
    pub collision_detect_established_state: bool,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            peer_ip: Ipv4Addr::UNSPECIFIED,
            peer_asn: 0,
            active_mode: true,
            passive_mode: true,
            allow_automatic_start: true,
            allow_automatic_stop: true,
            damp_peer_oscillations: false,
            delay_open: false,
            send_notification_without_open: false,
            collision_detect_established_state: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
            local_identifier = "1.1.1.1"
            local_asn = 65101
            local_hold_time = 180

            [[peers]]
            peer_ip = "192.168.9.201"
            peer_asn = 65201
            active_mode = true
            passive_mode = true
        "#;
        let cfg = Config::from_toml_str(toml).unwrap();
        assert_eq!(cfg.local_identifier, Ipv4Addr::new(1, 1, 1, 1));
        assert_eq!(cfg.peers.len(), 1);
        assert_eq!(cfg.peers[0].peer_asn, 65201);
        assert!(cfg.peers[0].active_mode);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::from_toml_str("not valid toml =").is_err());
    }
}
