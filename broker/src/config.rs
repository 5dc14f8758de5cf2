use std::fs::read_to_string;
use std::net::SocketAddr;

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;

#[derive(Deserialize, Debug, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_level(&self) -> log::Level {
        match *self {
            Self::Error => log::Level::Error,
            Self::Warn => log::Level::Warn,
            Self::Info => log::Level::Info,
            Self::Debug => log::Level::Debug,
            Self::Trace => log::Level::Trace,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Log {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Broker {
    #[serde(default = "Broker::listen")]
    pub listen: SocketAddr,
    #[serde(default = "Broker::auth_token")]
    pub auth_token: String,
    #[serde(default = "Broker::admin_token")]
    pub admin_token: String,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl Broker {
    fn listen() -> SocketAddr {
        "0.0.0.0:8080".parse().unwrap()
    }

    fn auth_token() -> String {
        "your_auth_token_here".to_string()
    }

    fn admin_token() -> String {
        "admin_token".to_string()
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            auth_token: Self::auth_token(),
            admin_token: Self::admin_token(),
            idle_timeout_secs: None,
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub broker: Broker,
    #[serde(default)]
    pub log: Log,
}

#[derive(Parser, Debug)]
#[command(
    about = env!("CARGO_PKG_DESCRIPTION"),
    version = env!("CARGO_PKG_VERSION"),
    author = env!("CARGO_PKG_AUTHORS"),
)]
struct Cli {
    /// Specify the configuration file path. Built-in defaults are used when
    /// no path is given or the file can't be read.
    #[arg(long, short)]
    config: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self> {
        let cli = Cli::parse();
        let contents = cli
            .config
            .and_then(|path| read_to_string(path).ok())
            .unwrap_or_default();

        if contents.is_empty() {
            return Ok(Self::default());
        }

        Ok(toml::from_str(&contents)?)
    }
}
