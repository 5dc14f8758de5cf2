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
pub struct Bridge {
    #[serde(default = "Bridge::listen")]
    pub listen: SocketAddr,
    #[serde(default = "Bridge::broker")]
    pub broker: SocketAddr,
}

impl Bridge {
    fn listen() -> SocketAddr {
        "0.0.0.0:8081".parse().unwrap()
    }

    fn broker() -> SocketAddr {
        "127.0.0.1:8080".parse().unwrap()
    }
}

impl Default for Bridge {
    fn default() -> Self {
        Self {
            listen: Self::listen(),
            broker: Self::broker(),
        }
    }
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub bridge: Bridge,
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
