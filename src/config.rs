use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
    pub database_url: String,
    pub jwt_secret: Option<String>,
    pub file_logs: bool,
    pub log_dir: String,
    pub seed_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)),
            port: 3000,
            log_level: "info".to_string(),
            database_url: "sqlite://lms.db".to_string(),
            jwt_secret: None,
            file_logs: false,
            log_dir: "./logs".to_string(),
            seed_file: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let port = env_non_empty("PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(defaults.port);

        let host = env_non_empty("HOST")
            .and_then(|value| value.parse::<IpAddr>().ok())
            .unwrap_or(defaults.host);

        Self {
            host,
            port,
            log_level: env_non_empty("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: env_non_empty("DATABASE_URL").unwrap_or(defaults.database_url),
            jwt_secret: env_non_empty("JWT_SECRET"),
            file_logs: env_bool("ENABLE_FILE_LOGS").unwrap_or(defaults.file_logs),
            log_dir: env_non_empty("LOG_DIR").unwrap_or(defaults.log_dir),
            seed_file: env_non_empty("SEED_FILE").map(PathBuf::from),
        }
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_bool(key: &str) -> Option<bool> {
    let normalized = env_non_empty(key)?.to_ascii_lowercase();
    match normalized.as_str() {
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        "0" | "false" | "no" | "n" | "off" => Some(false),
        _ => None,
    }
}
