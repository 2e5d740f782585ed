pub mod endpoints;
pub mod events;
pub mod health;
pub mod ingest;
pub mod metrics_handler;
pub mod session;

use crate::{auth::OwnershipResolver, config::Config, fanout::FanoutChannel, store::CaptureStore};
use std::sync::Arc;

/// Shared state for all request handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<CaptureStore>,
    pub fanout: FanoutChannel,
    pub ownership: Arc<OwnershipResolver>,
    pub config: Arc<Config>,
}
