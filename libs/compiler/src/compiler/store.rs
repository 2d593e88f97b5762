use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::sync::{Arc, PoisonError, RwLock};

use serde_json::Value;

use crate::types::{CompilationResult, FileSet, SourceContext, SourceFile};

/// A compiled contract inside [`LastCompilation`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ContractRef<'a> {
  pub name: &'a str,
  pub file: &'a str,
  pub artifact: &'a Value,
}

/// The most recent successful compilation and the sources it was built from.
#[derive(Clone, Debug, PartialEq)]
pub struct LastCompilation {
  pub result: CompilationResult,
  pub source: SourceContext,
}

impl LastCompilation {
  /// First contract called `name`, searching files in path order.
  pub fn contract(&self, name: &str) -> Option<ContractRef<'_>> {
    self
      .visit_contracts(|contract| {
        if contract.name == name {
          ControlFlow::Break(contract)
        } else {
          ControlFlow::Continue(())
        }
      })
  }

  /// Visit every contract until `visit` breaks, returning the break value.
  pub fn visit_contracts<'a, B>(
    &'a self,
    mut visit: impl FnMut(ContractRef<'a>) -> ControlFlow<B>,
  ) -> Option<B> {
    for (file, contracts) in &self.result.contracts {
      for (name, artifact) in contracts {
        if let ControlFlow::Break(found) = visit(ContractRef {
          name,
          file,
          artifact,
        }) {
          return Some(found);
        }
      }
    }
    None
  }

  pub fn contracts(&self) -> &BTreeMap<String, BTreeMap<String, Value>> {
    &self.result.contracts
  }

  pub fn sources(&self) -> &FileSet {
    &self.source.sources
  }

  pub fn source(&self, path: &str) -> Option<&SourceFile> {
    self.source.sources.get(path)
  }

  /// Path of the source the backend numbered `index`, falling back to position in path order
  /// when the backend did not report ids.
  pub fn source_name(&self, index: usize) -> Option<&str> {
    let by_id = self.result.sources.iter().find(|(_, meta)| {
      meta
        .get("id")
        .and_then(Value::as_u64)
        .is_some_and(|id| id == index as u64)
    });
    by_id
      .or_else(|| self.result.sources.iter().nth(index))
      .map(|(path, _)| path.as_str())
  }
}

/// Shared handle to the last-known-good compilation. Writers swap the whole snapshot, so readers
/// never observe a partially updated result.
#[derive(Clone, Debug, Default)]
pub struct ResultStore {
  current: Arc<RwLock<Option<Arc<LastCompilation>>>>,
}

impl ResultStore {
  pub fn get(&self) -> Option<Arc<LastCompilation>> {
    self
      .current
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  pub(crate) fn replace(&self, compilation: LastCompilation) {
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(compilation));
  }

  pub(crate) fn clear(&self) {
    *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn compilation() -> LastCompilation {
    LastCompilation {
      result: serde_json::from_value(json!({
        "contracts": {
          "a.sol": { "A": { "abi": [] }, "Shared": { "abi": [] } },
          "b.sol": { "B": { "abi": [] }, "Shared": { "abi": [1] } },
        },
        "sources": { "a.sol": { "id": 1 }, "b.sol": { "id": 0 } },
      }))
      .expect("result"),
      source: SourceContext {
        sources: FileSet::from_iter([("a.sol", "contract A {}"), ("b.sol", "contract B {}")]),
        target: "a.sol".into(),
      },
    }
  }

  #[test]
  fn finds_first_contract_by_name() {
    let last = compilation();
    let shared = last.contract("Shared").expect("contract");
    assert_eq!(shared.file, "a.sol");
    assert!(last.contract("Missing").is_none());
  }

  #[test]
  fn visiting_stops_on_break() {
    let last = compilation();
    let mut seen = Vec::new();
    let stopped = last.visit_contracts(|contract| {
      seen.push(format!("{}:{}", contract.file, contract.name));
      if contract.name == "B" {
        ControlFlow::Break(contract.file)
      } else {
        ControlFlow::Continue(())
      }
    });
    assert_eq!(stopped, Some("b.sol"));
    assert_eq!(seen, vec!["a.sol:A", "a.sol:Shared", "b.sol:B"]);
  }

  #[test]
  fn source_names_follow_backend_ids() {
    let last = compilation();
    assert_eq!(last.source_name(0), Some("b.sol"));
    assert_eq!(last.source_name(1), Some("a.sol"));
    assert_eq!(last.source_name(7), None);
    assert_eq!(last.source("b.sol").map(|file| file.content.as_str()), Some("contract B {}"));
  }

  #[test]
  fn store_swaps_whole_snapshots() {
    let store = ResultStore::default();
    let reader = store.clone();
    assert!(reader.get().is_none());

    store.replace(compilation());
    let snapshot = reader.get().expect("snapshot");
    store.clear();

    assert!(reader.get().is_none());
    assert_eq!(snapshot.contracts().len(), 2);
  }
}
