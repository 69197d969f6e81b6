//! Command line and configuration file

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use sipline_core::ProxyConfig;

use crate::logging::{parse_log_level, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "sipline")]
#[command(version, about = "Stateless SIP proxy and registrar over UDP")]
pub struct Args {
    /// Address to advertise when the local hostname only resolves to loopback
    pub fallback_address: Option<IpAddr>,

    /// TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// UDP port to listen on
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind to
    #[arg(short, long)]
    pub bind: Option<IpAddr>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long)]
    pub log_level: Option<String>,

    /// Log JSON lines instead of text
    #[arg(long)]
    pub json_logs: bool,
}

/// Contents of the configuration file: proxy settings at the top level plus
/// an optional `[log]` table
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    #[serde(flatten)]
    pub proxy: ProxyConfig,
    pub log: LogSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LogSection {
    pub level: Option<String>,
    pub json: bool,
    pub file_info: bool,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid configuration")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("in {}", path.display()))
    }
}

/// Everything the binary needs to start
#[derive(Debug)]
pub struct Settings {
    pub proxy: ProxyConfig,
    pub logging: LoggingConfig,
    pub fallback_address: Option<IpAddr>,
}

impl Args {
    /// Merge the configuration file (if any) with the command line, which wins
    pub fn settings(&self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        self.apply(file)
    }

    fn apply(&self, file: FileConfig) -> Result<Settings> {
        let mut proxy = file.proxy;
        if let Some(port) = self.port {
            proxy.port = port;
        }
        if let Some(bind) = self.bind {
            proxy.bind_address = bind;
        }
        proxy.validate()?;

        let level = match self.log_level.as_deref().or(file.log.level.as_deref()) {
            Some(level) => parse_log_level(level)?,
            None => LoggingConfig::default().level,
        };
        let mut logging = LoggingConfig::new(level);
        if self.json_logs || file.log.json {
            logging = logging.with_json();
        }
        if file.log.file_info {
            logging = logging.with_file_info();
        }

        Ok(Settings {
            proxy,
            logging,
            fallback_address: self.fallback_address,
        })
    }
}
