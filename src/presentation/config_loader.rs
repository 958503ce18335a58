//! VM configuration file loading
//!
//! The CLI accepts a YAML or JSON configuration file (selected by
//! extension) and decodes it into a [`VmConfig`] with figment. Validation
//! happens later, inside the command handlers; loading only has to produce
//! a structurally well-formed value.

use std::path::Path;

use figment::providers::{Format, Json, Yaml};
use figment::Figment;
use thiserror::Error;

use crate::domain::VmConfig;

/// Errors loading a configuration file
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file '{path}' does not exist")]
    FileMissing { path: String },

    #[error("unsupported configuration file extension '{extension}' (expected yaml, yml, or json)")]
    UnsupportedExtension { extension: String },

    #[error("failed to parse configuration from '{path}': {message}")]
    Parse { path: String, message: String },
}

/// Load a `VmConfig` from a YAML or JSON file
///
/// # Errors
///
/// Returns an error when the file is missing, has an unsupported extension,
/// or does not decode into a `VmConfig`.
pub fn load_vm_config(path: &Path) -> Result<VmConfig, ConfigLoadError> {
    if !path.exists() {
        return Err(ConfigLoadError::FileMissing {
            path: path.display().to_string(),
        });
    }

    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    let figment = match extension.as_str() {
        "yaml" | "yml" => Figment::from(Yaml::file(path)),
        "json" => Figment::from(Json::file(path)),
        other => {
            return Err(ConfigLoadError::UnsupportedExtension {
                extension: other.to_string(),
            })
        }
    };

    figment.extract().map_err(|e| ConfigLoadError::Parse {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
