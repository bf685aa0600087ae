use std::sync::Arc;

use crate::config::Config;
use crate::hierarchy::DepartmentHierarchy;
use crate::store::TransactionalStore;

/// Application state shared across handlers
pub struct AppState<S> {
    /// Department hierarchy over the configured store
    pub departments: Arc<DepartmentHierarchy<S>>,
    /// Application configuration
    pub config: Arc<Config>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            departments: Arc::clone(&self.departments),
            config: Arc::clone(&self.config),
        }
    }
}

impl<S: TransactionalStore> AppState<S> {
    /// Create new application state
    pub fn new(store: S, config: Config) -> Self {
        Self {
            departments: Arc::new(DepartmentHierarchy::new(store)),
            config: Arc::new(config),
        }
    }
}
