//! Cross-platform application paths using the `dirs` crate.
//!
//! Layout:
//!
//! Config dir (settings + voice profiles):
//!   Windows: %APPDATA%\jarvis\
//!   macOS:   ~/Library/Application Support/jarvis/
//!   Linux:   ~/.config/jarvis/
//!
//! Data dir (models):
//!   Windows: %LOCALAPPDATA%\jarvis\
//!   macOS:   ~/Library/Application Support/jarvis/
//!   Linux:   ~/.local/share/jarvis/

use std::path::PathBuf;

/// Holds all resolved application directory/file paths.
#[derive(Debug, Clone)]
pub struct AppPaths {
    /// Directory for `settings.toml` and voice profiles.
    pub config_dir: PathBuf,
    /// Full path to `settings.toml`.
    pub settings_file: PathBuf,
    /// Directory for downloaded GGML model files.
    pub models_dir: PathBuf,
}

impl AppPaths {
    const APP_NAME: &'static str = "jarvis";

    /// Resolves all paths using the `dirs` crate.
    ///
    /// Falls back to the current directory if the platform cannot provide a
    /// standard path.
    pub fn new() -> Self {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(Self::APP_NAME);

        Self {
            settings_file: config_dir.join("settings.toml"),
            models_dir: data_dir.join("models"),
            config_dir,
        }
    }

    /// GGML model file for the given model stem (`"base"` → `ggml-base.bin`).
    pub fn model_file(&self, model: &str) -> PathBuf {
        self.models_dir.join(format!("ggml-{model}.bin"))
    }

    /// Resolve a path from the config file relative to the config directory.
    /// Absolute paths are returned unchanged.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        let path = PathBuf::from(relative);
        if path.is_absolute() {
            path
        } else {
            self.config_dir.join(path)
        }
    }
}

impl Default for AppPaths {
    fn default() -> Self {
        Self::new()
    }
}
