use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use serde_json::{Map, Value};
use tracing::warn;

use super::errors::{map_err_with_context, Error, Result};

/// Storage key under which [`ConfigStore`] keeps its items.
pub const CONFIG_KEY: &str = ".compiler.config";

/// Persistent string key/value store provided by the host environment.
pub trait Storage: Send {
  fn get(&self, key: &str) -> Result<Option<String>>;
  fn set(&mut self, key: &str, value: &str) -> Result<()>;
}

#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
  entries: BTreeMap<String, String>,
}

impl Storage for MemoryStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    Ok(self.entries.get(key).cloned())
  }

  fn set(&mut self, key: &str, value: &str) -> Result<()> {
    self.entries.insert(key.to_owned(), value.to_owned());
    Ok(())
  }
}

/// One file per key inside `root`.
#[derive(Clone, Debug)]
pub struct FileStorage {
  root: PathBuf,
}

impl FileStorage {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  fn path_for(&self, key: &str) -> Result<PathBuf> {
    if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
      return Err(Error::Storage(format!("invalid storage key \"{key}\"")));
    }
    Ok(self.root.join(key))
  }
}

impl Storage for FileStorage {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let path = self.path_for(key)?;
    match fs::read_to_string(&path) {
      Ok(content) => Ok(Some(content)),
      Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
      Err(err) => Err(err.into()),
    }
  }

  fn set(&mut self, key: &str, value: &str) -> Result<()> {
    let path = self.path_for(key)?;
    map_err_with_context(fs::create_dir_all(&self.root), "Failed to create storage root")?;
    map_err_with_context(fs::write(path, value), "Failed to write storage entry")
  }
}

/// Editor settings persisted as one JSON object under [`CONFIG_KEY`].
pub struct ConfigStore<S: Storage> {
  storage: S,
  items: Map<String, Value>,
}

impl<S: Storage> ConfigStore<S> {
  /// Load existing items. Unreadable or malformed content starts from an empty set.
  pub fn new(storage: S) -> Self {
    let items = match storage.get(CONFIG_KEY) {
      Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
        Ok(Value::Object(items)) => items,
        Ok(_) => {
          warn!(key = CONFIG_KEY, "persisted config is not an object, ignoring");
          Map::new()
        }
        Err(err) => {
          warn!(key = CONFIG_KEY, error = %err, "failed to parse persisted config");
          Map::new()
        }
      },
      Ok(None) => Map::new(),
      Err(err) => {
        warn!(key = CONFIG_KEY, error = %err, "failed to read persisted config");
        Map::new()
      }
    };
    Self { storage, items }
  }

  pub fn exists(&self, key: &str) -> bool {
    self.items.contains_key(key)
  }

  pub fn get(&mut self, key: &str) -> Option<&Value> {
    self.ensure_storage_updated(key);
    self.items.get(key)
  }

  pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Result<()> {
    self.items.insert(key.into(), value.into());
    let serialised = serde_json::to_string(&self.items)?;
    self.storage.set(CONFIG_KEY, &serialised)
  }

  // Older sessions stored the current file without its provider prefix.
  fn ensure_storage_updated(&mut self, key: &str) {
    if key != "currentFile" {
      return;
    }
    if let Some(Value::String(path)) = self.items.get_mut(key) {
      if !path.is_empty() && !path.starts_with("browser/") && !path.starts_with("localhost/") {
        path.insert_str(0, "browser/");
      }
    }
  }
}
