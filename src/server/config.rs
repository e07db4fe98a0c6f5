use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML from config file at {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("Invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// How a container's address gets probed.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProbeMethod {
    /// Run the system `ping` utility.
    #[default]
    Command,
    /// Native ICMP echo socket.
    Icmp,
}

impl FromStr for ProbeMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "command" => Ok(ProbeMethod::Command),
            "icmp" => Ok(ProbeMethod::Icmp),
            other => Err(format!("expected `command` or `icmp`, got `{other}`")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    pub allowed_origin: String,
    pub database_url: String,
    pub db_max_connections: u32,
    pub runtime_bin: String,
    pub ping_bin: String,
    pub probe_method: ProbeMethod,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub log_dir: String,
}

// Partial config for layering
#[derive(Deserialize, Default, Debug)]
struct PartialServerConfig {
    listen_addr: Option<String>,
    allowed_origin: Option<String>,
    database_url: Option<String>,
    db_host: Option<String>,
    db_port: Option<u16>,
    db_user: Option<String>,
    db_password: Option<String>,
    db_name: Option<String>,
    db_sslmode: Option<String>,
    db_max_connections: Option<u32>,
    runtime_bin: Option<String>,
    ping_bin: Option<String>,
    probe_method: Option<ProbeMethod>,
    probe_timeout_secs: Option<u64>,
    poll_interval_secs: Option<u64>,
    log_dir: Option<String>,
}

impl PartialServerConfig {
    fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let display = path.display().to_string();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: display,
            source,
        })
    }

    fn from_env<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            listen_addr: lookup("LISTEN_ADDR"),
            allowed_origin: lookup("ALLOWED_ORIGIN"),
            database_url: lookup("DATABASE_URL"),
            db_host: lookup("DB_HOST"),
            db_port: parse_env(&lookup, "DB_PORT", "db_port")?,
            db_user: lookup("DB_USER"),
            db_password: lookup("DB_PASSWORD"),
            db_name: lookup("DB_NAME"),
            db_sslmode: lookup("DB_SSLMODE"),
            db_max_connections: parse_env(&lookup, "DB_MAX_CONNECTIONS", "db_max_connections")?,
            runtime_bin: lookup("RUNTIME_BIN"),
            ping_bin: lookup("PING_BIN"),
            probe_method: parse_env(&lookup, "PROBE_METHOD", "probe_method")?,
            probe_timeout_secs: parse_env(&lookup, "PROBE_TIMEOUT_SECS", "probe_timeout_secs")?,
            poll_interval_secs: parse_env(&lookup, "POLL_INTERVAL_SECS", "poll_interval_secs")?,
            log_dir: lookup("LOG_DIR"),
        })
    }
}

fn parse_env<F, T>(lookup: &F, var: &str, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                message: format!("{var}={raw}: {e}"),
            }),
        None => Ok(None),
    }
}

fn positive_secs(key: &'static str, secs: u64) -> Result<Duration, ConfigError> {
    if secs == 0 {
        return Err(ConfigError::Invalid {
            key,
            message: "must be at least 1 second".to_string(),
        });
    }
    Ok(Duration::from_secs(secs))
}

impl ServerConfig {
    /// Loads `.env`, then the optional TOML file, then environment variables
    /// (which override the file), then defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::load_with(config_path, |key| std::env::var(key).ok())
    }

    pub fn load_with<F>(config_path: Option<&str>, env_lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match config_path {
            Some(path) => PartialServerConfig::from_file(Path::new(path))?,
            None => PartialServerConfig::default(),
        };
        let env = PartialServerConfig::from_env(env_lookup)?;

        let listen_addr_raw = env
            .listen_addr
            .or(file.listen_addr)
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let listen_addr = listen_addr_raw
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "listen_addr",
                message: format!("{listen_addr_raw}: {e}"),
            })?;

        let allowed_origin = env
            .allowed_origin
            .or(file.allowed_origin)
            .unwrap_or_else(|| "http://localhost:3000".to_string());
        if axum::http::HeaderValue::from_str(&allowed_origin).is_err() {
            return Err(ConfigError::Invalid {
                key: "allowed_origin",
                message: format!("{allowed_origin} is not a valid header value"),
            });
        }

        let database_url = match env.database_url.or(file.database_url) {
            Some(url) => url,
            None => postgres_url(
                &env.db_host.or(file.db_host).unwrap_or_else(|| "localhost".to_string()),
                env.db_port.or(file.db_port).unwrap_or(5432),
                &env.db_user.or(file.db_user).unwrap_or_else(|| "youruser".to_string()),
                &env
                    .db_password
                    .or(file.db_password)
                    .unwrap_or_else(|| "yourpassword".to_string()),
                &env.db_name.or(file.db_name).unwrap_or_else(|| "yourdb".to_string()),
                &env
                    .db_sslmode
                    .or(file.db_sslmode)
                    .unwrap_or_else(|| "disable".to_string()),
            ),
        };

        let db_max_connections = env
            .db_max_connections
            .or(file.db_max_connections)
            .unwrap_or(10);
        if db_max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "db_max_connections",
                message: "must be at least 1".to_string(),
            });
        }

        Ok(ServerConfig {
            listen_addr,
            allowed_origin,
            database_url,
            db_max_connections,
            runtime_bin: env
                .runtime_bin
                .or(file.runtime_bin)
                .unwrap_or_else(|| "docker".to_string()),
            ping_bin: env
                .ping_bin
                .or(file.ping_bin)
                .unwrap_or_else(|| "ping".to_string()),
            probe_method: env.probe_method.or(file.probe_method).unwrap_or_default(),
            probe_timeout: positive_secs(
                "probe_timeout_secs",
                env.probe_timeout_secs.or(file.probe_timeout_secs).unwrap_or(1),
            )?,
            poll_interval: positive_secs(
                "poll_interval_secs",
                env.poll_interval_secs.or(file.poll_interval_secs).unwrap_or(30),
            )?,
            log_dir: env
                .log_dir
                .or(file.log_dir)
                .unwrap_or_else(|| "logs".to_string()),
        })
    }
}

fn postgres_url(
    host: &str,
    port: u16,
    user: &str,
    password: &str,
    db: &str,
    sslmode: &str,
) -> String {
    format!("postgres://{user}:{password}@{host}:{port}/{db}?sslmode={sslmode}")
}
