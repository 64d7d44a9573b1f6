use std::net::{IpAddr, SocketAddr};

use crate::config::helpers::{parse_number_env, parse_string_env};
use crate::error::ConfigError;
use crate::settings::Settings;

/// HTTP gateway bind settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: IpAddr,
    pub port: u16,
}

impl GatewayConfig {
    pub fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let raw_host = parse_string_env("GATEWAY_HOST", settings.gateway.host.clone())?;
        let host = raw_host
            .parse::<IpAddr>()
            .map_err(|e| ConfigError::InvalidValue {
                key: "GATEWAY_HOST".to_string(),
                message: format!("'{raw_host}' is not an IP address: {e}"),
            })?;

        Ok(Self {
            host,
            port: parse_number_env("GATEWAY_PORT", settings.gateway.port)?,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
