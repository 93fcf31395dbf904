//! Process-wide configuration values, one slot per type.
//!
//! Readers get an [`Arc`] snapshot. Replacing the value never affects snapshots already
//! handed out, so a reader sees either the old or the new configuration in full.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fs;
use std::marker::PhantomData;
use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, PoisonError, RwLock};

use tracing::debug;

use crate::error::{Error, Result};
use crate::json::JsonRecord;
use crate::toml::{TomlRecord, document_to_mapping};
use crate::value::{Mapping, Value};
use crate::Record;

type Slot = Arc<dyn Any + Send + Sync>;

static CONFIGS: LazyLock<RwLock<HashMap<TypeId, Slot>>> =
    LazyLock::new(|| RwLock::new(HashMap::new()));

fn swap_slot<T: Config>(value: Option<Arc<T>>) -> Option<Arc<T>> {
    let mut configs = CONFIGS.write().unwrap_or_else(PoisonError::into_inner);
    let previous = match value {
        Some(value) => configs.insert(TypeId::of::<T>(), value),
        None => configs.remove(&TypeId::of::<T>()),
    };
    previous.and_then(|slot| slot.downcast::<T>().ok())
}

/// A type with one global instance.
///
/// Opt in with an empty impl:
///
/// ```ignore
/// impl Config for Settings {}
///
/// Settings { verbose: true }.update_config();
/// assert!(Settings::get_config().is_some_and(|settings| settings.verbose));
/// ```
pub trait Config: Sized + Send + Sync + 'static {
    /// Snapshot of the current global value, if one is installed.
    fn get_config() -> Option<Arc<Self>> {
        let configs = CONFIGS.read().unwrap_or_else(PoisonError::into_inner);
        configs
            .get(&TypeId::of::<Self>())
            .cloned()
            .and_then(|slot| slot.downcast::<Self>().ok())
    }

    /// Installs `self` as the global value and returns it.
    fn update_config(self) -> Arc<Self> {
        let value = Arc::new(self);
        swap_slot(Some(Arc::clone(&value)));
        value
    }

    fn clear_config() {
        swap_slot::<Self>(None);
    }

    /// Installs `self` until the returned guard is dropped, then puts back whatever was
    /// installed before.
    fn as_config(self) -> ConfigGuard<Self> {
        let current = Arc::new(self);
        let previous = swap_slot(Some(Arc::clone(&current)));
        ConfigGuard {
            current,
            previous,
            _not_send: PhantomData,
        }
    }
}

/// Scope of a temporarily installed configuration; see [`Config::as_config`].
#[must_use = "the configuration is restored as soon as the guard is dropped"]
pub struct ConfigGuard<T: Config> {
    current: Arc<T>,
    previous: Option<Arc<T>>,
    _not_send: PhantomData<*const ()>,
}

impl<T: Config> Deref for ConfigGuard<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.current
    }
}

impl<T: Config> Drop for ConfigGuard<T> {
    fn drop(&mut self) {
        swap_slot(self.previous.take());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileFormat {
    Json,
    Toml,
}

impl FileFormat {
    fn of(path: &Path) -> Result<Self> {
        let Some(extension) = path.extension().and_then(|ext| ext.to_str()) else {
            return Err(Error::ConfigFormat {
                path: path.to_path_buf(),
                message: "file name has no extension".to_string(),
            });
        };
        match extension.to_ascii_lowercase().as_str() {
            "json" => Ok(FileFormat::Json),
            "toml" => Ok(FileFormat::Toml),
            other => Err(Error::ConfigFormat {
                path: path.to_path_buf(),
                message: format!("unknown extension `.{other}`; expected `.json` or `.toml`"),
            }),
        }
    }
}

fn read_text(path: &Path) -> Result<(FileFormat, String)> {
    let format = FileFormat::of(path)?;
    let text = fs::read_to_string(path)?;
    debug!(path = %path.display(), ?format, bytes = text.len(), "configuration file read");
    Ok((format, text))
}

/// Configuration records loaded from JSON or TOML files, chosen by extension.
pub trait FileConfig: Record + Config {
    /// Parses the file without installing it.
    fn read_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let (format, text) = read_text(path.as_ref())?;
        match format {
            FileFormat::Json => Self::from_json_str(&text),
            FileFormat::Toml => Self::from_toml_str(&text),
        }
    }

    /// Parses the file and installs it as the global configuration.
    fn load_config(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Ok(Self::read_config_file(path)?.update_config())
    }
}

impl<T: Record + Config> FileConfig for T {}

/// Untyped configuration: whatever mapping the file holds.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MappingConfig(pub Mapping);

impl Config for MappingConfig {}

impl MappingConfig {
    pub fn read_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (format, text) = read_text(path)?;
        let mapping = match format {
            FileFormat::Json => match Value::from(serde_json::from_str::<serde_json::Value>(&text)?) {
                Value::Map(mapping) => mapping,
                other => {
                    return Err(Error::ConfigFormat {
                        path: PathBuf::from(path),
                        message: format!("top level is a {}, not an object", other.kind()),
                    });
                }
            },
            FileFormat::Toml => document_to_mapping(&text.parse()?),
        };
        Ok(Self(mapping))
    }

    pub fn load_config(path: impl AsRef<Path>) -> Result<Arc<Self>> {
        Ok(Self::read_config_file(path)?.update_config())
    }
}

impl Deref for MappingConfig {
    type Target = Mapping;

    fn deref(&self) -> &Mapping {
        &self.0
    }
}
