//! Daemon configuration: CLI flags layered over an optional TOML file,
//! matching the keys enumerated in section 6 of the distillation.

use std::net::Ipv6Addr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use serde::Deserialize;
use service::ManagerConfig;

#[derive(Parser, Debug)]
#[command(name = "xdmcp-manager", about = "A pure rust-implemented XDMCP manager.")]
pub struct Args {
    /// Path to a TOML configuration file. Missing keys fall back to defaults.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Overrides `[network].port`.
    #[arg(short, long)]
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub port: u16,
    pub use_multicast: bool,
    pub multicast_address: Ipv6Addr,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            port: codec::DEFAULT_PORT,
            use_multicast: false,
            multicast_address: "ff02::1".parse().unwrap(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub honor_indirect: bool,
    pub willing_script: Option<PathBuf>,
    pub max_displays_per_host: u32,
    pub max_displays: u32,
    pub max_pending_displays: u32,
    pub max_wait_secs: u64,
    pub max_indirect: u32,
    pub max_wait_indirect_secs: u64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            honor_indirect: true,
            willing_script: None,
            max_displays_per_host: 2,
            max_displays: 16,
            max_pending_displays: 4,
            max_wait_secs: 15,
            max_indirect: 16,
            max_wait_indirect_secs: 15,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub network: NetworkConfig,
    pub policy: PolicyConfig,
}

impl Config {
    /// Loads the TOML file named by `--config`, if any, then applies CLI
    /// overrides on top.
    pub fn load(args: &Args) -> anyhow::Result<Self> {
        let mut config: Config = match &args.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                toml::from_str(&text)?
            }
            None => Config::default(),
        };

        if let Some(port) = args.port {
            config.network.port = port;
        }

        Ok(config)
    }

    pub fn into_manager_config(self) -> ManagerConfig {
        ManagerConfig {
            port: self.network.port,
            honor_indirect: self.policy.honor_indirect,
            willing_script: self.policy.willing_script,
            max_displays_per_host: self.policy.max_displays_per_host,
            max_displays: self.policy.max_displays,
            max_pending_displays: self.policy.max_pending_displays,
            max_wait: Duration::from_secs(self.policy.max_wait_secs),
            max_indirect: self.policy.max_indirect,
            max_wait_indirect: Duration::from_secs(self.policy.max_wait_indirect_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_section_six() {
        let config = Config::default();
        assert_eq!(config.network.port, 177);
        assert!(config.policy.honor_indirect);
        assert_eq!(config.policy.max_displays, 16);
        assert_eq!(config.policy.max_pending_displays, 4);
        assert_eq!(config.policy.max_displays_per_host, 2);
        assert_eq!(config.policy.max_wait_secs, 15);
    }

    #[test]
    fn cli_port_overrides_default() {
        let args = Args {
            config: None,
            port: Some(9177),
        };

        let config = Config::load(&args).unwrap();
        assert_eq!(config.network.port, 9177);
    }
}
