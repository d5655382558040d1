use crate::config::Config;
use crate::db::{self, DbPool, EventContext};
use crate::error::AppError;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<Config>,
}

impl AppState {
    /// Loads everything the forms need to know about an event, or 404s.
    pub async fn event_context(&self, slug: &str) -> Result<EventContext, AppError> {
        db::load_event_context(self.pool.as_ref(), slug)
            .await?
            .ok_or(AppError::NotFound("event"))
    }
}
