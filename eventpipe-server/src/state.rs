//! Application state shared across all request handlers.

use crate::integration::Integration;
use std::collections::HashMap;
use std::sync::Arc;

/// Application state that is shared across all request handlers.
///
/// This is cloneable and cheap to pass around (everything is behind Arc).
#[derive(Clone)]
pub struct AppState {
    /// Configured integrations, keyed by name.
    pub integrations: Arc<HashMap<String, Arc<Integration>>>,
}

impl AppState {
    pub fn new(integrations: HashMap<String, Arc<Integration>>) -> Self {
        Self {
            integrations: Arc::new(integrations),
        }
    }

    /// Look up an integration by its route name.
    pub fn integration(&self, name: &str) -> Option<Arc<Integration>> {
        self.integrations.get(name).cloned()
    }
}
