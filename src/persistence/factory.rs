use super::{InMemoryPersistence, SearchPersistence, SledPersistence};
use crate::config::{PersistenceBackend, PersistenceConfig};
use crate::error::{AppError, Result};
use std::sync::Arc;

/// Create the persistence backend selected by configuration
pub fn create_persistence(config: &PersistenceConfig) -> Result<Arc<dyn SearchPersistence>> {
    match config.backend {
        PersistenceBackend::Sled => {
            let path = config.path.as_ref().ok_or_else(|| {
                AppError::Configuration("Sled backend requires 'path' configuration".to_string())
            })?;

            tracing::info!(path = ?path, "Initializing Sled persistence backend");
            Ok(Arc::new(SledPersistence::new(path)?))
        }
        PersistenceBackend::Memory => Ok(create_in_memory_persistence()),
    }
}

/// Create in-memory persistence (for tests and the CLI)
pub fn create_in_memory_persistence() -> Arc<dyn SearchPersistence> {
    tracing::info!("Initializing in-memory persistence backend");
    Arc::new(InMemoryPersistence::new())
}
