//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::Config;
use crate::database::Database;
use crate::identity::IdentityProvider;
use crate::scheduling::ScheduleRules;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Database, identity: Arc<dyn IdentityProvider>, config: Config) -> Self {
        Self {
            db,
            identity,
            config: Arc::new(config),
        }
    }

    pub fn schedule_rules(&self) -> ScheduleRules {
        self.config.schedule_rules()
    }
}
