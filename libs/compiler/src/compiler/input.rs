use std::collections::BTreeMap;

use serde::Serialize;

use crate::internal::config::{CompilerConfig, Libraries};
use crate::internal::errors::{map_err_with_context, Result};
use crate::types::FileSet;

const FILE_OUTPUTS: &[&str] = &["legacyAST"];

const CONTRACT_OUTPUTS: &[&str] = &[
  "abi",
  "metadata",
  "devdoc",
  "userdoc",
  "evm.legacyAssembly",
  "evm.bytecode",
  "evm.deployedBytecode",
  "evm.methodIdentifiers",
  "evm.gasEstimates",
];

#[derive(Serialize)]
struct StandardInput<'a> {
  language: &'static str,
  sources: BTreeMap<&'a str, InputSource<'a>>,
  settings: InputSettings<'a>,
}

#[derive(Serialize)]
struct InputSource<'a> {
  content: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InputSettings<'a> {
  optimizer: Optimizer,
  #[serde(skip_serializing_if = "no_libraries")]
  libraries: &'a Libraries,
  output_selection: BTreeMap<&'static str, BTreeMap<&'static str, &'static [&'static str]>>,
}

#[derive(Serialize)]
struct Optimizer {
  enabled: bool,
  runs: u32,
}

fn no_libraries(libraries: &&Libraries) -> bool {
  libraries.is_empty()
}

fn output_selection() -> BTreeMap<&'static str, BTreeMap<&'static str, &'static [&'static str]>> {
  let per_file = BTreeMap::from([("", FILE_OUTPUTS), ("*", CONTRACT_OUTPUTS)]);
  BTreeMap::from([("*", per_file)])
}

/// Serialise `files` into the standard-JSON bundle handed to the backend.
pub fn standard_json(files: &FileSet, config: &CompilerConfig) -> Result<String> {
  let input = StandardInput {
    language: "Solidity",
    sources: files
      .iter()
      .map(|file| {
        (
          file.path.as_str(),
          InputSource {
            content: file.content.as_str(),
          },
        )
      })
      .collect(),
    settings: InputSettings {
      optimizer: Optimizer {
        enabled: config.optimize,
        runs: config.optimizer_runs,
      },
      libraries: &config.libraries,
      output_selection: output_selection(),
    },
  };
  map_err_with_context(serde_json::to_string(&input), "Failed to serialise compiler input")
}

#[cfg(test)]
mod tests {
  use serde_json::Value;

  use super::*;

  #[test]
  fn bundles_sources_and_optimizer_flag() {
    let files = FileSet::from_iter([("a.sol", "contract A {}"), ("lib/b.sol", "contract B {}")]);
    let config = CompilerConfig {
      optimize: true,
      ..Default::default()
    };

    let value: Value =
      serde_json::from_str(&standard_json(&files, &config).expect("input")).expect("json");

    assert_eq!(value["language"], "Solidity");
    assert_eq!(value["sources"]["lib/b.sol"]["content"], "contract B {}");
    assert_eq!(value["settings"]["optimizer"]["enabled"], true);
    assert_eq!(value["settings"]["optimizer"]["runs"], 200);
    assert_eq!(value["settings"]["outputSelection"]["*"][""][0], "legacyAST");
    assert_eq!(value["settings"]["outputSelection"]["*"]["*"][0], "abi");
    assert!(value["settings"].get("libraries").is_none());
  }

  #[test]
  fn includes_linked_libraries() {
    let mut config = CompilerConfig::default();
    config.libraries.insert(
      "a.sol".into(),
      BTreeMap::from([("Math".to_string(), "0x1234".to_string())]),
    );

    let value: Value = serde_json::from_str(
      &standard_json(&FileSet::from_iter([("a.sol", "")]), &config).expect("input"),
    )
    .expect("json");

    assert_eq!(value["settings"]["libraries"]["a.sol"]["Math"], "0x1234");
    assert_eq!(value["settings"]["optimizer"]["enabled"], false);
  }
}
