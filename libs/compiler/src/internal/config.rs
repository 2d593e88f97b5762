use std::collections::BTreeMap;

use serde_json::Value;

use super::storage::{ConfigStore, Storage};

pub const DEFAULT_OPTIMIZER_RUNS: u32 = 200;

/// Library addresses keyed by source file, then by library name.
pub type Libraries = BTreeMap<String, BTreeMap<String, String>>;

/// Settings applied to every bundle handed to the backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerConfig {
  pub optimize: bool,
  pub optimizer_runs: u32,
  pub libraries: Libraries,
}

impl Default for CompilerConfig {
  fn default() -> Self {
    CompilerConfig {
      optimize: false,
      optimizer_runs: DEFAULT_OPTIMIZER_RUNS,
      libraries: Libraries::new(),
    }
  }
}

impl CompilerConfig {
  pub fn from_options(options: Option<CompilerConfigOptions>) -> Self {
    match options {
      Some(overrides) => CompilerConfig::default().merged(&overrides),
      None => CompilerConfig::default(),
    }
  }

  pub fn merged(&self, overrides: &CompilerConfigOptions) -> Self {
    let mut config = self.clone();
    if let Some(optimize) = overrides.optimize {
      config.optimize = optimize;
    }
    if let Some(runs) = overrides.optimizer_runs {
      config.optimizer_runs = runs;
    }
    if let Some(libraries) = overrides.libraries.as_ref() {
      config.libraries = libraries.clone();
    }
    config
  }
}

/// Optional overrides that can be merged into a [`CompilerConfig`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompilerConfigOptions {
  pub optimize: Option<bool>,
  pub optimizer_runs: Option<u32>,
  pub libraries: Option<Libraries>,
}

impl CompilerConfigOptions {
  /// Read the persisted `optimize` / `optimizerRuns` settings. Values of the wrong type are
  /// ignored.
  pub fn from_store<S: Storage>(store: &mut ConfigStore<S>) -> Self {
    let optimize = store.get("optimize").and_then(|value| match value {
      Value::Bool(flag) => Some(*flag),
      Value::Number(number) => number.as_u64().map(|n| n != 0),
      _ => None,
    });
    let optimizer_runs = store
      .get("optimizerRuns")
      .and_then(Value::as_u64)
      .and_then(|runs| u32::try_from(runs).ok());
    CompilerConfigOptions {
      optimize,
      optimizer_runs,
      libraries: None,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::internal::storage::MemoryStorage;

  #[test]
  fn overrides_are_applied_on_top_of_defaults() {
    let config = CompilerConfig::from_options(Some(CompilerConfigOptions {
      optimize: Some(true),
      ..Default::default()
    }));
    assert!(config.optimize);
    assert_eq!(config.optimizer_runs, DEFAULT_OPTIMIZER_RUNS);

    let merged = config.merged(&CompilerConfigOptions {
      optimizer_runs: Some(1_000),
      ..Default::default()
    });
    assert!(merged.optimize);
    assert_eq!(merged.optimizer_runs, 1_000);
  }

  #[test]
  fn reads_persisted_settings() {
    let mut store = ConfigStore::new(MemoryStorage::default());
    store.set("optimize", 1).expect("set");
    store.set("optimizerRuns", 500).expect("set");
    let options = CompilerConfigOptions::from_store(&mut store);
    assert_eq!(options.optimize, Some(true));
    assert_eq!(options.optimizer_runs, Some(500));

    store.set("optimize", "yes").expect("set");
    assert_eq!(CompilerConfigOptions::from_store(&mut store).optimize, None);
  }
}
