//! Steam app-id → name lookup used for owned games that are not installed.
//!
//! Populated at most once per cache instance: from the disk cache if present, else from the
//! first remote catalog that answers, else from a small built-in table. Whatever came from a
//! remote catalog is written back to disk for the next start.

use anyhow::{Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::sync::{Once, RwLock};
use std::time::Duration;

pub const CACHE_FILE_NAME: &str = "steam_cache.json";

const USER_AGENT: &str = "Valve/Steam HTTP Client 1.0";

const FALLBACK_NAMES: [(&str, &str); 10] = [
    ("730", "Counter-Strike 2"),
    ("570", "Dota 2"),
    ("440", "Team Fortress 2"),
    ("578080", "PUBG: BATTLEGROUNDS"),
    ("271590", "Grand Theft Auto V"),
    ("1172470", "Apex Legends"),
    ("105600", "Terraria"),
    ("252490", "Rust"),
    ("292030", "The Witcher 3: Wild Hunt"),
    ("1085660", "Destiny 2"),
];

/// A remote source of the full app list.
#[cfg_attr(test, mockall::automock)]
pub trait CatalogSource: Send + Sync {
    /// Every known app id and name, or `None` if no source could be reached.
    fn fetch(&self) -> Option<HashMap<String, String>>;
}

/// Fetches the app list over HTTP, trying each mirror in order.
pub struct HttpCatalogSource {
    urls: Vec<String>,
    timeout: Duration,
}

impl HttpCatalogSource {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Self {
        Self { urls, timeout }
    }

    fn fetch_one(client: &reqwest::blocking::Client, url: &str) -> Result<HashMap<String, String>> {
        let response = client
            .get(url)
            .send()
            .with_context(|| format!("Request to {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Bad status from {}", url))?;
        let body = response
            .text()
            .with_context(|| format!("Failed to read body from {}", url))?;

        parse_catalog(&body).with_context(|| format!("Unrecognized app list from {}", url))
    }
}

impl CatalogSource for HttpCatalogSource {
    fn fetch(&self) -> Option<HashMap<String, String>> {
        let client = match reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .build()
        {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!("Failed to build HTTP client: {}", e);
                return None;
            }
        };

        tracing::info!("Downloading Steam app list");
        for url in &self.urls {
            match Self::fetch_one(&client, url) {
                Ok(names) => {
                    tracing::info!("Downloaded {} app names from {}", names.len(), url);
                    return Some(names);
                }
                Err(e) => tracing::warn!("{:#}", e),
            }
        }
        None
    }
}

#[derive(Debug, Deserialize)]
struct CatalogApp {
    appid: u64,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CatalogApps {
    apps: Vec<CatalogApp>,
}

/// The three shapes served by the known mirrors.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogBody {
    Standard { applist: CatalogApps },
    Flat(CatalogApps),
    Array(Vec<CatalogApp>),
}

/// Parse an app-list body. HTML error pages and empty lists are rejected.
pub fn parse_catalog(body: &str) -> Result<HashMap<String, String>> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        anyhow::bail!("response is HTML, not JSON");
    }

    let apps = match serde_json::from_str::<CatalogBody>(trimmed)? {
        CatalogBody::Standard { applist } => applist.apps,
        CatalogBody::Flat(list) => list.apps,
        CatalogBody::Array(apps) => apps,
    };

    let names: HashMap<String, String> = apps
        .into_iter()
        .filter(|app| !app.name.trim().is_empty())
        .map(|app| (app.appid.to_string(), app.name))
        .collect();

    if names.is_empty() {
        anyhow::bail!("app list is empty");
    }
    Ok(names)
}

/// Process-wide name cache, owned by the engine and shared by reference.
pub struct AppNameCache {
    names: RwLock<HashMap<String, String>>,
    init: Once,
    cache_file: Option<Utf8PathBuf>,
    source: Box<dyn CatalogSource>,
}

impl AppNameCache {
    pub fn new(cache_file: Option<Utf8PathBuf>, source: Box<dyn CatalogSource>) -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
            init: Once::new(),
            cache_file,
            source,
        }
    }

    /// Name for `app_id`, loading the cache on first use.
    pub fn resolve(&self, app_id: &str) -> Option<String> {
        self.ensure_loaded();
        let names = self.names.read().unwrap_or_else(|e| e.into_inner());
        names.get(app_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ensure_loaded(&self) {
        self.init.call_once(|| self.populate());
    }

    fn populate(&self) {
        let loaded = self
            .cache_file
            .as_deref()
            .and_then(|path| match load_from_disk(path) {
                Ok(names) => Some(names),
                Err(e) => {
                    tracing::debug!("No usable name cache: {:#}", e);
                    None
                }
            });

        let names = if let Some(names) = loaded {
            tracing::info!("Loaded {} app names from cache", names.len());
            names
        } else if let Some(names) = self.source.fetch() {
            if let Some(path) = &self.cache_file {
                if let Err(e) = save_to_disk(path, &names) {
                    tracing::warn!("Failed to persist name cache: {:#}", e);
                }
            }
            names
        } else {
            tracing::warn!("App list unavailable, using built-in names");
            fallback_names()
        };

        *self.names.write().unwrap_or_else(|e| e.into_inner()) = names;
    }
}

fn fallback_names() -> HashMap<String, String> {
    FALLBACK_NAMES
        .iter()
        .map(|(id, name)| (id.to_string(), name.to_string()))
        .collect()
}

fn load_from_disk(path: &Utf8Path) -> Result<HashMap<String, String>> {
    let text = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path))?;
    let names: HashMap<String, String> =
        serde_json::from_str(&text).with_context(|| format!("Failed to parse {}", path))?;
    if names.is_empty() {
        anyhow::bail!("{} is empty", path);
    }
    Ok(names)
}

fn save_to_disk(path: &Utf8Path, names: &HashMap<String, String>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent))?;
    }
    let json = serde_json::to_string(names).context("Failed to serialize name cache")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path))?;
    tracing::debug!("Saved {} app names to {}", names.len(), path);
    Ok(())
}
