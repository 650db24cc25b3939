use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::addr::Family;
use crate::error::{SctpError, SctpResult};
use crate::options::{EventSubscriptions, InitMsg};
use crate::params;

/// Settings for [`crate::server::Server::bind`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address family of the listening socket.
    pub family: Family,
    /// Local addresses; empty binds the wildcard.
    pub addresses: Vec<String>,
    /// Local port; 0 lets the kernel pick one.
    pub port: u16,
    /// Emulate one-to-one accept on top of the shared socket.
    pub one_to_one: bool,
    /// Listen backlog.
    pub backlog: i32,
    /// Set `SO_REUSEADDR` before binding.
    pub reuse_addr: bool,
    /// Stream counts and INIT retry limits for new associations.
    pub init_msg: Option<InitMsg>,
    /// Notifications to deliver.
    pub subscriptions: EventSubscriptions,
    /// `SCTP_NODELAY`, left untouched when `None`.
    pub nodelay: Option<bool>,
    /// Idle seconds before an association is closed, left untouched when `None`.
    pub autoclose: Option<u32>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            family: Family::Inet,
            addresses: Vec::new(),
            port: 0,
            one_to_one: false,
            backlog: 128,
            reuse_addr: true,
            init_msg: None,
            subscriptions: EventSubscriptions::server_default(),
            nodelay: None,
            autoclose: None,
        }
    }
}

impl ServerConfig {
    /// Parses a JSON document; missing keys keep their defaults, unknown keys are ignored.
    pub fn from_json(text: &str) -> SctpResult<Self> {
        let value: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| SctpError::invalid_argument(format!("invalid server config: {}", e)))?;
        params::from_params(&value)
    }

    /// Reads a JSON config file.
    pub fn from_file(path: &Path) -> SctpResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| SctpError::Syscall {
            call: "read_to_string",
            source,
        })?;
        Self::from_json(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = ServerConfig::default();
        assert_eq!(config.family, Family::Inet);
        assert!(config.addresses.is_empty());
        assert_eq!(config.port, 0);
        assert!(!config.one_to_one);
        assert_eq!(config.backlog, 128);
        assert!(config.reuse_addr);
        assert!(config.init_msg.is_none());
        assert_eq!(config.subscriptions, EventSubscriptions::server_default());
    }

    #[test]
    fn test_from_json_partial() {
        let config = ServerConfig::from_json(
            r#"{
                "family": "inet6",
                "addresses": ["::1"],
                "port": 3868,
                "one_to_one": true,
                "init_msg": {"num_ostreams": 10, "max_instreams": 10},
                "unknown": 1
            }"#,
        )
        .unwrap();
        assert_eq!(config.family, Family::Inet6);
        assert_eq!(config.addresses, vec!["::1"]);
        assert_eq!(config.port, 3868);
        assert!(config.one_to_one);
        assert_eq!(config.backlog, 128);
        assert_eq!(config.init_msg.map(|i| i.num_ostreams), Some(10));
    }

    #[test]
    fn test_from_json_subscriptions_replace_defaults() {
        let config = ServerConfig::from_json(r#"{"subscriptions": {"data_io": true}}"#).unwrap();
        assert!(config.subscriptions.data_io);
        assert!(!config.subscriptions.association);
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(
            ServerConfig::from_json("{not json").unwrap_err(),
            SctpError::InvalidArgument { .. }
        ));
        match ServerConfig::from_json(r#"{"port": "http"}"#).unwrap_err() {
            SctpError::TypeMismatch { field, .. } => assert_eq!(field, "port"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_serialization_round_trip() {
        let config = ServerConfig {
            addresses: vec!["127.0.0.1".into(), "127.0.0.2".into()],
            port: 9000,
            nodelay: Some(true),
            autoclose: Some(30),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ServerConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_from_file_missing() {
        let err = ServerConfig::from_file(Path::new("/nonexistent/sctp-server.json")).unwrap_err();
        assert_eq!(err.raw_os_error(), Some(libc::ENOENT));
    }
}
