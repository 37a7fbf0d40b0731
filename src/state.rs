use std::sync::Arc;

use crate::config::Config;
use crate::mailer::Mailer;
use crate::meeting::MeetingLinkGenerator;
use crate::store::Store;

/// Everything a workflow needs: the store and the outside collaborators.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub mailer: Arc<dyn Mailer>,
    pub meetings: Arc<dyn MeetingLinkGenerator>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        mailer: Arc<dyn Mailer>,
        meetings: Arc<dyn MeetingLinkGenerator>,
        config: Config,
    ) -> Self {
        Self {
            store,
            mailer,
            meetings,
            config: Arc::new(config),
        }
    }
}
