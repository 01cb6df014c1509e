use crate::models::Verdict;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, path::Path, time::Duration};
use tokio::fs;
use tracing::warn;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct KernelConfig {
    /// Flux de statut : URL http(s) ou chemin local
    pub feed: String,
    /// Base SQLite des bâtiments : URL http(s) ou chemin local
    pub metadata: String,
    pub refresh_interval_secs: u64,
    pub fetch_timeout_secs: u64,
    pub rules: FeedRules,
    pub icons: IconConf,
    pub http: HttpConf,
    pub mqtt: Option<MqttConf>,
}

/// Littéraux réservés du flux
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct FeedRules {
    pub timestamp_key: String,
    pub down_status: String,
    pub up_status: String,
    pub missing_status: String,
}

/// Table verdict -> icône de marqueur
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct IconConf {
    pub healthy: String,
    pub unhealthy: String,
    pub unknown: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HttpConf {
    pub bind: String,
    /// Si défini, exigé dans x-api-key pour POST /refresh
    pub api_key: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MqttConf {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("refresh_interval_secs must be greater than zero")]
    ZeroInterval,
    #[error("rule '{0}' must not be empty")]
    EmptyLiteral(&'static str),
    #[error("status literal '{0}' is used for more than one meaning")]
    AmbiguousStatus(String),
    #[error("invalid HTTP bind address '{0}'")]
    Bind(String),
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            feed: "data/akipsStatus.csv".into(),
            metadata: "data/buildings.db".into(),
            refresh_interval_secs: 30,
            fetch_timeout_secs: 10,
            rules: FeedRules::default(),
            icons: IconConf::default(),
            http: HttpConf::default(),
            mqtt: None,
        }
    }
}

impl Default for FeedRules {
    fn default() -> Self {
        Self {
            timestamp_key: "TIME".into(),
            down_status: "down".into(),
            up_status: "up".into(),
            missing_status: "unknown".into(),
        }
    }
}

impl Default for IconConf {
    fn default() -> Self {
        Self {
            healthy: "images/check-mark.svg".into(),
            unhealthy: "images/x-mark.svg".into(),
            unknown: "images/unknown.svg".into(),
        }
    }
}

impl Default for HttpConf {
    fn default() -> Self {
        Self { bind: "0.0.0.0:8080".into(), api_key: None }
    }
}

impl IconConf {
    pub fn asset(&self, verdict: Verdict) -> &str {
        match verdict {
            Verdict::Healthy => &self.healthy,
            Verdict::Unhealthy => &self.unhealthy,
            Verdict::Unknown => &self.unknown,
        }
    }
}

impl KernelConfig {
    pub fn from_yaml(txt: &str) -> Result<Self, serde_yaml::Error> {
        if txt.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(txt)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.http.bind.parse().map_err(|_| ConfigError::Bind(self.http.bind.clone()))
    }

    /// Surcharges NETMAP_* (lookup injecté pour rester testable sans toucher l'env)
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(feed) = lookup("NETMAP_FEED") {
            self.feed = feed;
        }
        if let Some(metadata) = lookup("NETMAP_METADATA") {
            self.metadata = metadata;
        }
        if let Some(secs) = lookup("NETMAP_REFRESH_SECS") {
            match secs.parse() {
                Ok(secs) => self.refresh_interval_secs = secs,
                Err(_) => warn!("[config] ignoring NETMAP_REFRESH_SECS={secs}: not a number"),
            }
        }
        if let Some(key) = lookup("NETMAP_API_KEY").filter(|k| !k.is_empty()) {
            self.http.api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh_interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        let rules = &self.rules;
        for (name, value) in [
            ("timestamp_key", &rules.timestamp_key),
            ("down_status", &rules.down_status),
            ("up_status", &rules.up_status),
            ("missing_status", &rules.missing_status),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::EmptyLiteral(name));
            }
        }
        if rules.up_status == rules.down_status || rules.missing_status == rules.down_status {
            return Err(ConfigError::AmbiguousStatus(rules.down_status.clone()));
        }
        if rules.missing_status == rules.up_status {
            return Err(ConfigError::AmbiguousStatus(rules.up_status.clone()));
        }
        self.bind_addr()?;
        Ok(())
    }
}

pub async fn load_config() -> KernelConfig {
    let path = std::env::var("NETMAP_KERNEL_CONFIG").unwrap_or_else(|_| "kernel.yaml".into());
    let mut cfg = if Path::new(&path).exists() {
        let txt = fs::read_to_string(&path).await.unwrap_or_default();
        KernelConfig::from_yaml(&txt).unwrap_or_else(|e| {
            warn!("[config] invalid {path}: {e}, using defaults");
            KernelConfig::default()
        })
    } else {
        warn!("[config] no {path}, using defaults");
        KernelConfig::default()
    };
    cfg.apply_overrides(|key| std::env::var(key).ok());
    cfg
}
