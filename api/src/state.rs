use sqlx::PgPool;

use crate::agent::AgentClient;
use crate::notify::Notifier;

/// Shared application state. External-service endpoints and credentials are
/// resolved exactly once at startup and carried here — handlers and workers
/// never re-read configuration or look up a "latest" credential at runtime.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub agent: AgentClient,
    pub notifier: Notifier,
}
