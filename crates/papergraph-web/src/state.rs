use std::sync::Mutex;

use papergraph_core::GraphStore;

/// Shared application state accessible from all handlers.
///
/// Every request goes through the one connection.
pub struct AppState {
    pub store: Mutex<GraphStore>,
}

impl AppState {
    pub fn new(store: GraphStore) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }
}
