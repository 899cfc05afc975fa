//! Shared application state for all routes.

use crate::access::AccessGate;
use crate::connection::ConnectionManager;
use crate::source::DataSource;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn DataSource>,
    pub gate: Arc<AccessGate>,
    pub manager: Arc<ConnectionManager>,
}
