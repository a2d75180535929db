//! Worker configuration parsed from environment variables

use crate::error::{Result, WorkerError};
use crate::request::ResponseKind;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use url::Url;

/// Order in which the network and the cache are consulted for GET requests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStrategy {
    CacheFirst,
    NetworkFirst,
}

impl FromStr for FetchStrategy {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cache-first" => Ok(Self::CacheFirst),
            "network-first" => Ok(Self::NetworkFirst),
            other => Err(WorkerError::Config(format!("unknown fetch strategy: {other}"))),
        }
    }
}

/// What the installer does when a precache asset cannot be fetched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPolicy {
    /// Any failure aborts the install and nothing is stored
    Atomic,
    /// Failures are logged and the remaining assets are still cached
    BestEffort,
}

impl FromStr for InstallPolicy {
    type Err = WorkerError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "atomic" => Ok(Self::Atomic),
            "best-effort" => Ok(Self::BestEffort),
            other => Err(WorkerError::Config(format!("unknown install policy: {other}"))),
        }
    }
}

const DEFAULT_PRECACHE: &[&str] = &[
    "",
    "index.html",
    "manifest.json",
    "icons/icon-192x192.png",
    "icons/icon-512x512.png",
];

/// Worker configuration. Partition names are derived from the prefix and
/// version, so bumping `cache_version` orphans every older partition.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub port: u16,
    pub origin: Url,
    pub base_path: String,
    pub app_name: String,
    pub cache_prefix: String,
    pub cache_version: String,
    pub app_shell: String,
    /// Asset paths relative to `base_path`
    pub precache: Vec<String>,
    pub strategy: FetchStrategy,
    /// Hostname substrings that always go to the network with `no-store`
    pub bypass_hosts: Vec<String>,
    pub install_policy: InstallPolicy,
    /// Refuse to evict old partitions unless the app shell is precached
    pub activation_guard: bool,
    pub cacheable_kinds: Vec<ResponseKind>,
    pub sync_tag: String,
    pub periodic_sync_tag: String,
    /// `None` keeps the cache in memory
    pub cache_dir: Option<PathBuf>,
    /// `None` lets a stalled fetch stall its response indefinitely
    pub fetch_timeout: Option<Duration>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            port: 3002,
            origin: Url::parse("http://localhost:5173").expect("default origin is a valid URL"),
            base_path: "/".to_string(),
            app_name: "Offline App".to_string(),
            cache_prefix: "app-shell".to_string(),
            cache_version: "v1".to_string(),
            app_shell: "index.html".to_string(),
            precache: DEFAULT_PRECACHE.iter().map(|s| s.to_string()).collect(),
            strategy: FetchStrategy::CacheFirst,
            bypass_hosts: Vec::new(),
            install_policy: InstallPolicy::BestEffort,
            activation_guard: true,
            cacheable_kinds: vec![ResponseKind::Basic, ResponseKind::Cors],
            sync_tag: "background-sync".to_string(),
            periodic_sync_tag: "content-sync".to_string(),
            cache_dir: None,
            fetch_timeout: None,
        }
    }
}

impl WorkerConfig {
    /// Parse configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Parse configuration from any variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let list = |value: String| -> Vec<String> {
            value
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        };

        let port = lookup("PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);

        let origin = match lookup("ORIGIN_URL") {
            Some(raw) => Url::parse(&raw)?,
            None => defaults.origin,
        };

        let base_path = lookup("BASE_PATH")
            .map(|p| normalize_base_path(&p))
            .unwrap_or(defaults.base_path);

        // An empty entry stands for the scope root, so keep it when listed
        let precache = lookup("PRECACHE_ASSETS")
            .map(|value| value.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(defaults.precache);

        let strategy = match lookup("FETCH_STRATEGY") {
            Some(raw) => raw.parse()?,
            None => defaults.strategy,
        };

        let install_policy = match lookup("INSTALL_POLICY") {
            Some(raw) => raw.parse()?,
            None => defaults.install_policy,
        };

        let activation_guard = lookup("ACTIVATION_GUARD")
            .map(|v| !matches!(v.trim(), "0" | "false" | "no" | "off"))
            .unwrap_or(defaults.activation_guard);

        let cacheable_kinds = match lookup("CACHEABLE_KINDS") {
            Some(raw) => list(raw)
                .iter()
                .map(|k| k.parse())
                .collect::<Result<Vec<ResponseKind>>>()?,
            None => defaults.cacheable_kinds,
        };

        let fetch_timeout = lookup("FETCH_TIMEOUT_SECS")
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs);

        Ok(Self {
            port,
            origin,
            base_path,
            app_name: lookup("APP_NAME").unwrap_or(defaults.app_name),
            cache_prefix: lookup("CACHE_PREFIX").unwrap_or(defaults.cache_prefix),
            cache_version: lookup("CACHE_VERSION").unwrap_or(defaults.cache_version),
            app_shell: lookup("APP_SHELL").unwrap_or(defaults.app_shell),
            precache,
            strategy,
            bypass_hosts: lookup("BYPASS_HOSTS").map(list).unwrap_or_default(),
            install_policy,
            activation_guard,
            cacheable_kinds,
            sync_tag: lookup("SYNC_TAG").unwrap_or(defaults.sync_tag),
            periodic_sync_tag: lookup("PERIODIC_SYNC_TAG").unwrap_or(defaults.periodic_sync_tag),
            cache_dir: lookup("CACHE_DIR").map(PathBuf::from),
            fetch_timeout,
        })
    }

    pub fn static_partition(&self) -> String {
        format!("{}-static-{}", self.cache_prefix, self.cache_version)
    }

    pub fn dynamic_partition(&self) -> String {
        format!("{}-dynamic-{}", self.cache_prefix, self.cache_version)
    }

    /// Whether a partition belongs to this app's namespace, whatever its version
    pub fn owns_partition(&self, name: &str) -> bool {
        name.strip_prefix(&self.cache_prefix)
            .is_some_and(|rest| rest.starts_with('-'))
    }

    /// The root URL the worker controls
    pub fn scope_url(&self) -> Result<Url> {
        Ok(self.origin.join(&self.base_path)?)
    }

    /// Resolve a path relative to the scope root
    pub fn resolve(&self, path: &str) -> Result<Url> {
        Ok(self.scope_url()?.join(path.trim_start_matches('/'))?)
    }

    pub fn app_shell_url(&self) -> Result<Url> {
        self.resolve(&self.app_shell)
    }

    pub fn precache_urls(&self) -> Result<Vec<Url>> {
        self.precache.iter().map(|p| self.resolve(p)).collect()
    }
}

fn normalize_base_path(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        format!("/{}/", trimmed)
    }
}
