use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::{DEFAULT_CONFIG_FILE, DEFAULT_MAX_PHOTO_BYTES};
use crate::error::{AppError, Result};

/// `database.path` value that selects the in-memory store.
pub const IN_MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub photos: PhotoConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory served under `/static`
    pub static_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            static_dir: "static".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/roof_inspect.db".to_string(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_DATABASE
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhotoStoreKind {
    Fs,
    Supabase,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PhotoConfig {
    pub store: PhotoStoreKind,
    pub root: PathBuf,
    pub max_bytes: usize,
    pub supabase: SupabaseConfig,
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            store: PhotoStoreKind::Fs,
            root: PathBuf::from("data/photos"),
            max_bytes: DEFAULT_MAX_PHOTO_BYTES,
            supabase: SupabaseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SupabaseConfig {
    /// e.g. https://xyzcompany.supabase.co
    pub url: Option<String>,
    pub service_role_key: Option<String>,
    pub bucket: Option<String>,
    /// Optional path prefix inside the bucket
    pub prefix: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub file_name: String,
    /// Default directive when RUST_LOG is unset
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("logs"),
            file_name: "roof_inspect.log".to_string(),
            filter: "roof_inspect=info,tower_http=info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Loads `.env`, then the TOML file, then environment overrides.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv::dotenv().ok();

        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Applies overrides from a key lookup (the process environment in
    /// production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("ROOF_INSPECT_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("ROOF_INSPECT_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| AppError::Config(format!("ROOF_INSPECT_PORT '{port}' is not a port")))?;
        }
        if let Some(path) = lookup("DATABASE_PATH") {
            self.database.path = path;
        }
        if let Some(store) = lookup("PHOTO_STORE") {
            self.photos.store = match store.to_lowercase().as_str() {
                "fs" => PhotoStoreKind::Fs,
                "supabase" => PhotoStoreKind::Supabase,
                other => {
                    return Err(AppError::Config(format!(
                        "PHOTO_STORE must be 'fs' or 'supabase', got '{other}'"
                    )))
                }
            };
        }
        if let Some(root) = lookup("PHOTO_ROOT") {
            self.photos.root = PathBuf::from(root);
        }
        if let Some(max) = lookup("MAX_PHOTO_BYTES") {
            self.photos.max_bytes = max
                .parse()
                .map_err(|_| AppError::Config(format!("MAX_PHOTO_BYTES '{max}' is not a number")))?;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.logging.dir = PathBuf::from(dir);
        }

        // Either a full URL or a project ref
        let supabase = &mut self.photos.supabase;
        if let Some(url) = lookup("SUPABASE_URL") {
            supabase.url = Some(url);
        } else if let Some(project_ref) = lookup("SUPABASE_PROJECT_REF") {
            supabase.url = Some(format!("https://{}.supabase.co", project_ref));
        }
        if let Some(key) = lookup("SUPABASE_SERVICE_ROLE_KEY") {
            supabase.service_role_key = Some(key);
        }
        if let Some(bucket) = lookup("SUPABASE_BUCKET") {
            supabase.bucket = Some(bucket);
        }
        if let Some(prefix) = lookup("SUPABASE_PREFIX") {
            supabase.prefix = Some(prefix);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
