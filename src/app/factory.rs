use std::sync::{Arc, RwLock};

use anyhow::{Context, Result};
use homedir::my_home;

use super::{backend::AppBackend, local::AppLocal, remote::AppRemote};
use crate::{
    config::Config,
    inference::{GeminiBackend, ModelProvider},
    notes::BackendJson,
};

/// Application factory: resolves paths, loads config, picks a backend.
pub struct AppFactory;

impl AppFactory {
    /// Create the backend CLI commands run against: a remote proxy when
    /// `MNEMA_ADDR` points at a daemon, the local store otherwise.
    pub fn create_backend(paths: &AppPaths) -> Result<Box<dyn AppBackend>> {
        if let Ok(addr) = std::env::var("MNEMA_ADDR") {
            log::info!("Using remote backend: {addr}");
            let basic_auth = Self::parse_basic_auth();
            return Ok(Box::new(AppRemote::new(&addr, basic_auth)));
        }

        Ok(Box::new(Self::create_local_app(paths)?))
    }

    /// Create a local application instance (used directly by the daemon).
    pub fn create_local_app(paths: &AppPaths) -> Result<AppLocal> {
        let config = Arc::new(RwLock::new(Config::load_with(&paths.base_path)));

        let store = BackendJson::load(&paths.notes_path)?;

        let provider: Arc<dyn ModelProvider> = {
            let config = config.read().unwrap();
            Arc::new(GeminiBackend::from_config(&config.inference))
        };

        Ok(AppLocal::new(config, Arc::new(store), provider))
    }

    /// Get application paths, creating the base directory.
    pub fn get_paths() -> Result<AppPaths> {
        let base_path = Self::get_base_path();
        let notes_path = format!("{base_path}/notes.json");

        std::fs::create_dir_all(&base_path)
            .context("Failed to create application base directory")?;

        Ok(AppPaths {
            base_path,
            notes_path,
        })
    }

    fn get_base_path() -> String {
        std::env::var("MNEMA_BASE_PATH").unwrap_or_else(|_| {
            let home = my_home()
                .expect("Could not determine home directory")
                .expect("Home directory path is empty");
            format!("{}/.local/share/mnema", home.to_string_lossy())
        })
    }

    /// Basic auth for the remote backend, from `MNEMA_BASIC_AUTH`
    /// (`username` or `username:password`).
    fn parse_basic_auth() -> Option<(String, Option<String>)> {
        match std::env::var("MNEMA_BASIC_AUTH") {
            Ok(ba) => {
                let parts: Vec<_> = ba.split(':').collect();
                match parts.as_slice() {
                    [username] => Some((username.to_string(), None)),
                    [username, password] => {
                        Some((username.to_string(), Some(password.to_string())))
                    }
                    _ => {
                        log::warn!(
                            "Invalid MNEMA_BASIC_AUTH format. Expected 'username' or 'username:password'"
                        );
                        None
                    }
                }
            }
            Err(_) => None,
        }
    }
}

/// Application paths structure
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_path: String,
    pub notes_path: String,
}
