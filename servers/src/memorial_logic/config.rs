use clap::Parser;
use lib_memorial::utils::defaults;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "server_memorial.conf";

#[derive(Parser, Deserialize, Serialize, Debug, Clone, Default, PartialEq)]
#[clap(about = "Memorial lights controller", version)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    #[clap(long, env = "MEMORIAL_CONFIG_PATH", help = "Path to the JSON configuration file.")]
    pub config_path: Option<PathBuf>,

    #[clap(long, env = "MEMORIAL_UDP_PORT", help = "UDP port devices report on and listen to for commands.")]
    pub udp_port: Option<u16>,

    #[clap(long, env = "MEMORIAL_HTTP_PORT", help = "Port for the HTTP API.")]
    pub http_port: Option<u16>,

    #[clap(long, env = "MEMORIAL_STORE_PATH", help = "Path of the device snapshot file.")]
    pub store_path: Option<PathBuf>,

    #[clap(long, env = "MEMORIAL_SCHEDULER_INTERVAL_SECONDS", help = "Seconds between calendar scheduler passes.")]
    pub scheduler_interval_seconds: Option<u64>,

    #[clap(long, env = "MEMORIAL_BROADCAST_ADDR", help = "IPv4 broadcast address commands are sent to.")]
    pub broadcast_addr: Option<Ipv4Addr>,

    #[clap(long, env = "MEMORIAL_RECV_BUFFER_SIZE", help = "Largest datagram the listener reads, in bytes.")]
    pub recv_buffer_size: Option<usize>,

    #[clap(long, env = "MEMORIAL_LOG_DIR", help = "Directory for log files.")]
    pub log_dir: Option<PathBuf>,

    #[clap(long, env = "MEMORIAL_LOG_LEVEL", help = "Logging level (trace, debug, info, warn, error).")]
    pub log_level: Option<String>,
}

/// Fully resolved settings, every value present.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub udp_port: u16,
    pub http_port: u16,
    pub store_path: PathBuf,
    pub scheduler_interval: Duration,
    pub broadcast_addr: Ipv4Addr,
    pub recv_buffer_size: usize,
    pub log_dir: PathBuf,
    pub log_level: String,
}

impl Settings {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.udp_port))
    }

    pub fn broadcast_target(&self) -> SocketAddr {
        SocketAddr::from((self.broadcast_addr, self.udp_port))
    }

    pub fn http_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.http_port))
    }
}

impl Config {
    // Merge two Config structs, where 'other' overrides 'self' for Some values
    fn merge(self, other: Config) -> Config {
        Config {
            config_path: other.config_path.or(self.config_path),
            udp_port: other.udp_port.or(self.udp_port),
            http_port: other.http_port.or(self.http_port),
            store_path: other.store_path.or(self.store_path),
            scheduler_interval_seconds: other.scheduler_interval_seconds.or(self.scheduler_interval_seconds),
            broadcast_addr: other.broadcast_addr.or(self.broadcast_addr),
            recv_buffer_size: other.recv_buffer_size.or(self.recv_buffer_size),
            log_dir: other.log_dir.or(self.log_dir),
            log_level: other.log_level.or(self.log_level),
        }
    }

    fn defaults() -> Config {
        Config {
            config_path: None,
            udp_port: Some(defaults::UDP_PORT),
            http_port: Some(defaults::HTTP_PORT),
            store_path: Some(PathBuf::from(defaults::STORE_PATH)),
            scheduler_interval_seconds: Some(defaults::SCHEDULER_INTERVAL_SECS),
            broadcast_addr: defaults::BROADCAST_ADDR.parse().ok(),
            recv_buffer_size: Some(defaults::RECV_BUFFER_SIZE),
            log_dir: Some(PathBuf::from("./logs")),
            log_level: Some("info".to_string()),
        }
    }

    fn into_settings(self) -> Settings {
        let fallback = Config::defaults();
        let merged = fallback.merge(self);
        Settings {
            udp_port: merged.udp_port.unwrap_or(defaults::UDP_PORT),
            http_port: merged.http_port.unwrap_or(defaults::HTTP_PORT),
            store_path: merged.store_path.unwrap_or_else(|| PathBuf::from(defaults::STORE_PATH)),
            scheduler_interval: Duration::from_secs(
                merged
                    .scheduler_interval_seconds
                    .unwrap_or(defaults::SCHEDULER_INTERVAL_SECS)
                    .max(1),
            ),
            broadcast_addr: merged.broadcast_addr.unwrap_or(Ipv4Addr::BROADCAST),
            recv_buffer_size: merged.recv_buffer_size.unwrap_or(defaults::RECV_BUFFER_SIZE),
            log_dir: merged.log_dir.unwrap_or_else(|| PathBuf::from("./logs")),
            log_level: merged.log_level.unwrap_or_else(|| "info".to_string()),
        }
    }
}

/// Reads a config file. Problems are reported and the file is skipped.
fn read_config_file(path: &Path) -> Option<Config> {
    if !path.exists() {
        log::info!("Config file not found at {}. Using defaults and environment/CLI variables.", path.display());
        return None;
    }
    match fs::read_to_string(path) {
        Ok(config_str) => match serde_json::from_str::<Config>(&config_str) {
            Ok(file_config) => Some(file_config),
            Err(e) => {
                log::warn!("Failed to parse config file {}: {}. Falling back to other sources.", path.display(), e);
                None
            }
        },
        Err(e) => {
            log::warn!("Failed to read config file {}: {}. Falling back to other sources.", path.display(), e);
            None
        }
    }
}

/// Layers defaults, the config file and `cli` (which already includes the
/// environment), later sources winning.
pub fn resolve(cli: Config) -> Settings {
    let config_file_path = cli
        .config_path
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    let mut current_config = Config::defaults();
    if let Some(file_config) = read_config_file(&config_file_path) {
        current_config = current_config.merge(file_config);
    }
    current_config.merge(cli).into_settings()
}

pub fn load_config() -> Settings {
    resolve(Config::parse())
}
