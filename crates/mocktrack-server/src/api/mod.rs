//! Protocol routers and the HTTP server composition.

pub mod handlers;
pub mod router;
pub mod server;
pub mod types;

use crate::gate::Gate;
use crate::hook::WebhookDispatcher;
use crate::store::Store;
use std::sync::Arc;
use std::time::Instant;

/// Everything a handler needs, shared across connections.
pub struct AppContext {
    pub store: Arc<Store>,
    pub gate: Arc<Gate>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub started_at: Instant,
}
