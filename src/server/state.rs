use std::sync::Arc;

use chrono::NaiveDate;

use crate::auth::Authenticator;
use crate::config::{Config, ServerConfig};
use crate::resolver::DailyResolver;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub server: ServerConfig,
    pub resolver: DailyResolver,
    pub auth: Authenticator,
}

impl AppState {
    pub fn new(config: Config, server: ServerConfig) -> anyhow::Result<SharedState> {
        let resolver = config.open_resolver()?;
        let auth = Authenticator::new(server.auth.clone());
        Ok(Arc::new(Self {
            config,
            server,
            resolver,
            auth,
        }))
    }

    pub fn today(&self) -> NaiveDate {
        self.config.today()
    }
}
