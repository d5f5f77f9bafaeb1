// ── Persisted device filter ──
//
// A tiny TOML document next to the other per-user data:
//
//     device_filter = "10-12,15"

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sensordeck_core::{CoreError, FilterStore};

#[derive(Debug, Default, Deserialize, Serialize)]
struct Prefs {
    device_filter: Option<String>,
}

/// File-backed [`FilterStore`].
#[derive(Debug, Clone)]
pub struct FilePreferences {
    path: PathBuf,
}

impl FilePreferences {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the platform data directory.
    pub fn at_default_location() -> Self {
        Self::new(crate::prefs_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Prefs, CoreError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Prefs::default()),
            Err(e) => return Err(storage_error(&self.path, &e)),
        };
        toml::from_str(&raw).map_err(|e| storage_error(&self.path, &e))
    }
}

fn storage_error(path: &Path, err: &dyn std::fmt::Display) -> CoreError {
    CoreError::Preferences {
        message: format!("{}: {err}", path.display()),
    }
}

impl FilterStore for FilePreferences {
    fn load(&self) -> Result<Option<String>, CoreError> {
        Ok(self.read()?.device_filter)
    }

    fn save(&self, expr: &str) -> Result<(), CoreError> {
        let mut prefs = self.read().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "overwriting unreadable preferences");
            Prefs::default()
        });
        prefs.device_filter = Some(expr.to_owned());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| storage_error(parent, &e))?;
        }
        let body = toml::to_string_pretty(&prefs).map_err(|e| storage_error(&self.path, &e))?;
        std::fs::write(&self.path, body).map_err(|e| storage_error(&self.path, &e))?;
        tracing::debug!(path = %self.path.display(), expr, "device filter saved");
        Ok(())
    }
}
