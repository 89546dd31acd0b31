use std::sync::Arc;

use crate::config::Config;
use crate::storage::driver::filesystem::FilesystemStorage;
use crate::storage::Storage;

/// Shared handler state. The filesystem is the only mutable store; the
/// state itself is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let storage: Arc<dyn Storage> = match config.storage_backend.as_str() {
            "FILESYSTEM" => Arc::new(FilesystemStorage::new(&config.root_dir)),
            _ => Arc::new(FilesystemStorage::new(&config.root_dir)),
        };

        AppState {
            storage,
            config: Arc::new(config),
        }
    }
}
