//! Environment-driven bridge configuration.

use std::env;
use std::net::SocketAddr;

use anyhow::{Context, Result};

const ENV_ENGINE_HOST: &str = "PIXERA_HOST";
const ENV_ENGINE_PORT: &str = "PIXERA_PORT";
const ENV_LISTEN_ADDR: &str = "BRIDGE_ADDR";

const DEFAULT_ENGINE_HOST: &str = "192.168.68.76";
const DEFAULT_ENGINE_PORT: u16 = 4023;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8000";

#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Engine endpoint the protocol client connects to.
    pub engine_host: String,
    pub engine_port: u16,
    /// Address the gateway listens on.
    pub listen_addr: SocketAddr,
}

impl BridgeConfig {
    pub fn from_env() -> Result<Self> {
        let engine_host =
            env::var(ENV_ENGINE_HOST).unwrap_or_else(|_| DEFAULT_ENGINE_HOST.to_string());

        let engine_port = match env::var(ENV_ENGINE_PORT) {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("Invalid {} value: {}", ENV_ENGINE_PORT, raw))?,
            Err(_) => DEFAULT_ENGINE_PORT,
        };

        let listen_raw =
            env::var(ENV_LISTEN_ADDR).unwrap_or_else(|_| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_raw
            .parse()
            .with_context(|| format!("Invalid {} value: {}", ENV_LISTEN_ADDR, listen_raw))?;

        Ok(Self {
            engine_host,
            engine_port,
            listen_addr,
        })
    }
}
