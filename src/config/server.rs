//! Server configuration

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use super::error::ValidationError;
use crate::domain::foundation::NodeId;

const MAX_SHUTDOWN_GRACE_SECS: u64 = 300;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind; must be an IP literal
    pub host: IpAddr,

    pub port: u16,

    pub environment: Environment,

    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,

    /// Tag for cross-node presence notifications; random when unset
    pub node_id: Option<String>,

    /// Time background loops get to stop after the shutdown signal
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8080,
            environment: Environment::default(),
            log_level: "info,taskflow_realtime=debug,tower_http=info".to_string(),
            node_id: None,
            shutdown_grace_secs: 10,
        }
    }
}

impl ServerConfig {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn is_production(&self) -> bool {
        self.environment == Environment::Production
    }

    /// Configured node id, or a fresh random one.
    pub fn node_id(&self) -> NodeId {
        match self.node_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => NodeId::new(id),
            _ => NodeId::random(),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        if self.shutdown_grace_secs == 0 {
            return Err(ValidationError::InvalidTimeout("server.shutdown_grace_secs"));
        }
        if self.shutdown_grace_secs > MAX_SHUTDOWN_GRACE_SECS {
            return Err(ValidationError::OutOfRange {
                field: "server.shutdown_grace_secs",
                reason: "at most 300 seconds",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_bind_every_interface_on_8080() {
        let config = ServerConfig::default();
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
        assert!(!config.is_production());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn explicit_node_id_wins_over_random() {
        let named = ServerConfig {
            node_id: Some("node-7".to_string()),
            ..Default::default()
        };
        assert_eq!(named.node_id().as_str(), "node-7");

        let blank = ServerConfig {
            node_id: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(blank.node_id().as_str().starts_with("node-"));
    }

    #[test]
    fn port_and_grace_are_checked() {
        let no_port = ServerConfig {
            port: 0,
            ..Default::default()
        };
        assert_eq!(no_port.validate(), Err(ValidationError::InvalidPort));

        let endless = ServerConfig {
            shutdown_grace_secs: 3600,
            ..Default::default()
        };
        assert!(matches!(
            endless.validate(),
            Err(ValidationError::OutOfRange { field: "server.shutdown_grace_secs", .. })
        ));
    }
}
