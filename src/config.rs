use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use crate::catalog::DirCatalog;
use crate::cli::{GlobalOptions, ServeArgs, StoreKind};
use crate::db::SqliteStore;
use crate::paths::{default_database_path, default_state_file, default_videos_dir};
use crate::resolver::DailyResolver;
use crate::store::{FileStore, MemoryStore, SelectionStore};

const AUTH_CACHE_TTL: Duration = Duration::from_secs(60 * 60 * 24);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateBackend {
    File(PathBuf),
    Sqlite(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub videos_dir: PathBuf,
    pub state: StateBackend,
    pub time_zone: Tz,
}

impl Config {
    pub fn load(options: &GlobalOptions) -> Result<Self> {
        let videos_dir = match &options.videos_dir {
            Some(dir) => dir.clone(),
            None => default_videos_dir()?,
        };

        let state = match options.state_backend {
            StoreKind::File => StateBackend::File(
                options
                    .state_file
                    .clone()
                    .unwrap_or_else(|| default_state_file(&videos_dir)),
            ),
            StoreKind::Sqlite => StateBackend::Sqlite(match &options.state_db {
                Some(path) => path.clone(),
                None => default_database_path()?,
            }),
            StoreKind::Memory => {
                warn!("memory state backend selected; the rotation resets on restart");
                StateBackend::Memory
            }
        };

        let time_zone = options
            .time_zone
            .parse::<Tz>()
            .map_err(|err| anyhow!("invalid ESPEN_TZ value '{}': {err}", options.time_zone))?;

        Ok(Self {
            videos_dir,
            state,
            time_zone,
        })
    }

    /// The calendar day in the configured zone.
    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.time_zone).date_naive()
    }

    pub fn open_resolver(&self) -> Result<DailyResolver> {
        let catalog = DirCatalog::open(&self.videos_dir)?;
        let store: Box<dyn SelectionStore> = match &self.state {
            StateBackend::File(path) => Box::new(FileStore::new(path)),
            StateBackend::Sqlite(path) => Box::new(SqliteStore::open(path)?),
            StateBackend::Memory => Box::new(MemoryStore::default()),
        };
        Ok(DailyResolver::new(Box::new(catalog), store))
    }
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub userinfo_url: Option<String>,
    pub allowed_numbers: Vec<String>,
    pub dev: bool,
    pub cache_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub upload_limit: usize,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn load(args: &ServeArgs) -> Result<Self> {
        Self::from_args(args, env_flag("DEV"))
    }

    /// `dev_env` is the value of the `DEV` variable; the `--dev` flag also
    /// enables dev mode.
    pub fn from_args(args: &ServeArgs, dev_env: bool) -> Result<Self> {
        let dev = args.dev || dev_env;
        let allowed_numbers: Vec<String> = args
            .allowed_numbers
            .iter()
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .collect();

        if dev {
            warn!("DEV mode: authorization is disabled");
        } else {
            if args.userinfo_url.is_none() {
                bail!("OAUTH2_USERINFO must be set unless DEV=yes");
            }
            if allowed_numbers.is_empty() {
                warn!("ESPEN_ALLOWED_NUMBERS is empty; every request will be rejected");
            }
        }

        let upload_limit = args
            .upload_limit_mb
            .checked_mul(1024 * 1024)
            .context("ESPEN_UPLOAD_LIMIT_MB is too large")?;
        info!(port = args.port, allowed = allowed_numbers.len(), "server configuration loaded");

        Ok(Self {
            port: args.port,
            upload_limit,
            auth: AuthConfig {
                userinfo_url: args.userinfo_url.clone(),
                allowed_numbers,
                dev,
                cache_ttl: AUTH_CACHE_TTL,
            },
        })
    }
}

fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "yes" | "true" | "1"))
        .unwrap_or(false)
}
