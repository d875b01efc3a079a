use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::blocklist::DEFAULT_CLEARSKY_BASE;
use crate::xrpc::{DEFAULT_LABELER, DEFAULT_SERVICE_URL, PUBLIC_API_BASE};

const DEFAULT_ENV_PREFIX: &str = "FEEDMUX";

pub const ACCESS_TOKEN_ENV: &str = "FEEDMUX_ACCESS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub public_api: PublicApiConfig,
    #[serde(default)]
    pub blocklist: BlocklistConfig,
    #[serde(default)]
    pub preferences: PreferencesConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServiceConfig {
    #[serde(default = "default_service_url")]
    pub url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            user_agent: default_user_agent(),
            timeout: default_timeout(),
        }
    }
}

fn default_service_url() -> String {
    DEFAULT_SERVICE_URL.to_string()
}

fn default_user_agent() -> String {
    format!("feedmux/{}", crate::VERSION)
}

fn default_timeout() -> Duration {
    Duration::from_secs(15)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublicApiConfig {
    #[serde(default = "default_public_base")]
    pub base_url: String,
    #[serde(default = "default_labelers")]
    pub labelers: Vec<String>,
}

impl Default for PublicApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_public_base(),
            labelers: default_labelers(),
        }
    }
}

fn default_public_base() -> String {
    PUBLIC_API_BASE.to_string()
}

fn default_labelers() -> Vec<String> {
    vec![DEFAULT_LABELER.to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlocklistConfig {
    #[serde(default = "default_blocklist_base")]
    pub base_url: String,
}

impl Default for BlocklistConfig {
    fn default() -> Self {
        Self {
            base_url: default_blocklist_base(),
        }
    }
}

fn default_blocklist_base() -> String {
    DEFAULT_CLEARSKY_BASE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct PreferencesConfig {
    #[serde(default)]
    pub hidden_reposts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    pub config_file: Option<PathBuf>,
    pub env_prefix: Option<String>,
}

pub fn load(options: LoadOptions) -> Result<Config> {
    let mut cfg = Config::default();

    let path = options.config_file.clone().or_else(default_path);
    if let Some(path) = path.filter(|p| p.exists()) {
        let from_file = read_config_file(&path)?;
        cfg = merge_config(cfg, from_file);
    }

    let prefix = options.env_prefix.as_deref().unwrap_or(DEFAULT_ENV_PREFIX);
    apply_env(&mut cfg, prefix);

    Ok(cfg)
}

fn read_config_file(path: &Path) -> Result<Config> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("config: failed to read {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&data)
        .with_context(|| format!("config: failed to parse {}", path.display()))?;
    Ok(config)
}

fn merge_config(mut base: Config, other: Config) -> Config {
    if !other.service.url.is_empty() {
        base.service.url = other.service.url;
    }
    if !other.service.user_agent.is_empty() {
        base.service.user_agent = other.service.user_agent;
    }
    if !other.service.timeout.is_zero() {
        base.service.timeout = other.service.timeout;
    }

    if !other.public_api.base_url.is_empty() {
        base.public_api.base_url = other.public_api.base_url;
    }
    // serde fills the default labeler when the key is absent, so an
    // explicit empty list turns redaction off.
    base.public_api.labelers = other.public_api.labelers;

    if !other.blocklist.base_url.is_empty() {
        base.blocklist.base_url = other.blocklist.base_url;
    }

    if !other.preferences.hidden_reposts.is_empty() {
        base.preferences.hidden_reposts = other.preferences.hidden_reposts;
    }

    base
}

fn apply_env(cfg: &mut Config, prefix: &str) {
    let upper_prefix = format!("{}_", prefix.to_uppercase());
    let map: HashMap<String, String> = env::vars()
        .filter_map(|(key, value)| {
            key.strip_prefix(&upper_prefix)
                .map(|stripped| (stripped.to_ascii_lowercase().replace("__", "."), value))
        })
        .collect();

    for (key, value) in map {
        apply_env_value(cfg, &key, value);
    }
}

fn apply_env_value(cfg: &mut Config, key: &str, value: String) {
    match key {
        "service.url" => cfg.service.url = value,
        "service.user_agent" => cfg.service.user_agent = value,
        "service.timeout" => {
            if let Ok(duration) = humantime::parse_duration(&value) {
                cfg.service.timeout = duration;
            }
        }
        "public_api.base_url" => cfg.public_api.base_url = value,
        "public_api.labelers" => cfg.public_api.labelers = split_list(&value),
        "blocklist.base_url" => cfg.blocklist.base_url = value,
        "preferences.hidden_reposts" => cfg.preferences.hidden_reposts = split_list(&value),
        _ => {}
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("feedmux").join("config.yaml"))
}

pub fn access_token() -> Option<String> {
    env::var(ACCESS_TOKEN_ENV)
        .ok()
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
}
