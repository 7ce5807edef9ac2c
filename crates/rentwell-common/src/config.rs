//! Layered configuration loading
//!
//! Every Rentwell binary resolves its configuration in the same order:
//! 1. Compiled defaults (`Default` impl of the config struct)
//! 2. A TOML file (explicit path, or the binary's default file name)
//! 3. Environment variables with the binary's prefix, nested keys split on `__`

use crate::error::ConfigurationError;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};

pub trait ConfigLoader<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    /// Default file consulted when no explicit path is given
    const DEFAULT_FILE: &'static str;

    /// Environment prefix, including the trailing separator
    const ENV_PREFIX: &'static str;

    fn load(path: Option<PathBuf>) -> Result<T, ConfigurationError> {
        let path = path.unwrap_or_else(|| PathBuf::from(Self::DEFAULT_FILE));
        Self::figment(&path)
            .extract()
            .map_err(|e| ConfigurationError::ParseError {
                details: e.to_string(),
            })
    }

    /// Like [`ConfigLoader::load`] but the file must exist
    fn load_from_file(path: &Path) -> Result<T, ConfigurationError> {
        if !path.exists() {
            return Err(ConfigurationError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        Self::figment(path)
            .extract()
            .map_err(|e| ConfigurationError::ParseError {
                details: e.to_string(),
            })
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(T::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(Self::ENV_PREFIX).split("__"))
    }

    fn generate_example() -> Result<String, ConfigurationError> {
        toml::to_string_pretty(&T::default()).map_err(|e| ConfigurationError::ParseError {
            details: format!("Failed to serialize config: {e}"),
        })
    }
}
