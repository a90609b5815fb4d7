use std::fs;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

const DEFAULT_CONFIG_NAME: &str = "slack-relay.toml";
const PORT_ENV: &str = "PORT";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: Server,
    pub upstream: Upstream,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Server {
    pub host: IpAddr,
    pub port: u16,
    /// Largest accepted request body, in bytes
    pub body_limit: usize,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            host: IpAddr::from([0, 0, 0, 0]),
            port: 3000,
            body_limit: 1024 * 1024,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Upstream {
    /// Optional bound on the outbound webhook call
    pub timeout_secs: Option<u64>,
}

impl Upstream {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

impl Config {
    /// Load configuration from an explicit path, or search upward from current dir,
    /// then the user config dir. Falls back to defaults when nothing is found.
    pub fn load(path_override: Option<PathBuf>) -> Result<Self> {
        let path = match path_override {
            Some(p) => Some(p),
            None => find_upwards(DEFAULT_CONFIG_NAME).or_else(user_config),
        };

        let mut cfg: Config = match path {
            Some(path) => {
                let contents = fs::read_to_string(&path)
                    .with_context(|| format!("Reading config file {}", path.display()))?;
                toml::from_str(&contents)
                    .with_context(|| format!("Parsing TOML config {}", path.display()))?
            }
            None => Config::default(),
        };

        cfg.apply_port(std::env::var(PORT_ENV).ok().as_deref())?;
        Ok(cfg)
    }

    /// An unset or empty `PORT` keeps the configured port.
    fn apply_port(&mut self, port: Option<&str>) -> Result<()> {
        let Some(port) = port.map(str::trim).filter(|p| !p.is_empty()) else {
            return Ok(());
        };
        self.server.port = port
            .parse()
            .with_context(|| format!("Invalid {PORT_ENV} value '{port}'"))?;
        Ok(())
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.host, self.server.port)
    }
}

fn find_upwards(file_name: &str) -> Option<PathBuf> {
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(file_name);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            break;
        }
    }
    None
}

fn user_config() -> Option<PathBuf> {
    let candidate = dirs::config_dir()?
        .join("slack-relay")
        .join(DEFAULT_CONFIG_NAME);
    candidate.exists().then_some(candidate)
}
