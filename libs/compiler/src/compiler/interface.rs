//! Rewrites contract interfaces (ABI listings) produced by older compilers into the shape
//! current compilers emit, so consumers only ever see one layout.

use semver::Version;
use serde_json::{json, Map, Value};

fn older_than(version: &Version, major: u64, minor: u64, patch: u64) -> bool {
  *version < Version::new(major, minor, patch)
}

fn flag(entry: &Map<String, Value>, key: &str) -> bool {
  entry.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Bring `abi`, as produced by compiler `version`, up to the canonical layout.
pub fn update_interface(version: &Version, abi: &mut Vec<Value>) {
  let mut has_constructor = false;
  let mut has_fallback = false;

  for entry in abi.iter_mut().filter_map(Value::as_object_mut) {
    let kind = entry
      .get("type")
      .and_then(Value::as_str)
      .unwrap_or("function")
      .to_owned();

    match kind.as_str() {
      "constructor" => {
        has_constructor = true;
        // Constructors were implicitly payable before 0.4.5.
        if older_than(version, 0, 4, 5) {
          entry.insert("payable".into(), Value::Bool(true));
        }
      }
      "fallback" => has_fallback = true,
      _ => {}
    }

    if kind == "event" {
      continue;
    }
    if !flag(entry, "constant") && older_than(version, 0, 4, 0) {
      entry.insert("payable".into(), Value::Bool(true));
    }
    if older_than(version, 0, 4, 16) {
      let mutability = if flag(entry, "payable") {
        "payable"
      } else if flag(entry, "constant") {
        "view"
      } else {
        "nonpayable"
      };
      entry.insert("stateMutability".into(), Value::from(mutability));
    }
  }

  if !has_constructor && older_than(version, 0, 1, 2) {
    abi.push(json!({
      "type": "constructor",
      "payable": true,
      "stateMutability": "payable",
      "inputs": [],
    }));
  }
  if !has_fallback && older_than(version, 0, 4, 0) {
    abi.push(json!({
      "type": "fallback",
      "payable": true,
      "stateMutability": "payable",
    }));
  }
}
