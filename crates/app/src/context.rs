//! Process-wide wiring: settings, the shared store, and the workflow layer.

use directories::ProjectDirs;
use providers::Gateway;
use shared::settings::AppSettings;
use std::path::PathBuf;
use std::sync::Arc;
use store::persist::SnapshotFile;
use store::Store;
use tracing::{info, warn};
use workflows::Workflows;

pub struct AppContext {
    pub store: store::SharedStore,
    pub workflows: Workflows,
}

impl AppContext {
    /// Wire the whole app together. Nothing here is fatal: missing
    /// settings fall back to defaults and a missing API key degrades
    /// the AI features to their fallback replies.
    pub fn init() -> Self {
        let settings = load_settings();

        let slot = match &settings.data_file {
            Some(path) => SnapshotFile::at(path.clone()),
            None => SnapshotFile::new(),
        };
        info!("workspace data at {}", slot.path().display());
        let store = Store::load(slot).into_shared();

        let api_key = std::env::var("GEMINI_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            warn!("GEMINI_API_KEY is not set; AI features will return fallback replies");
        }
        let gateway = Arc::new(Gateway::new(&settings.model, &api_key));

        let workflows = Workflows::new(Arc::clone(&store), gateway);
        AppContext { store, workflows }
    }

    /// Write one last snapshot so nothing typed this session is lost.
    pub fn shutdown(&self) {
        if let Err(e) = self.store.lock().flush() {
            warn!("final snapshot save failed: {e:#}");
        }
    }
}

fn settings_path() -> Option<PathBuf> {
    ProjectDirs::from("com.local", "Astra", "Astra").map(|d| d.config_dir().join("settings.json"))
}

fn load_settings() -> AppSettings {
    if let Some(path) = settings_path() {
        if let Ok(raw) = std::fs::read_to_string(&path) {
            match serde_json::from_str(&raw) {
                Ok(settings) => return settings,
                Err(e) => warn!("ignoring malformed {}: {e}", path.display()),
            }
        }
    }
    AppSettings::default()
}
