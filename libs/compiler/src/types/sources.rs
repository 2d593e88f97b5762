use std::collections::btree_map::{self, BTreeMap};

/// A single source unit as supplied by the caller or fetched by the import resolver.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFile {
  pub path: String,
  pub content: String,
}

impl SourceFile {
  pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      content: content.into(),
    }
  }
}

/// Path-keyed collection of sources. Entries can be added but existing content is never
/// replaced, so a retry always sees every import resolved by earlier passes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileSet {
  files: BTreeMap<String, SourceFile>,
}

impl FileSet {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert `content` under `path` unless the path is already present. Returns whether the
  /// set grew.
  pub fn insert(&mut self, path: impl Into<String>, content: impl Into<String>) -> bool {
    let path = path.into();
    match self.files.entry(path) {
      btree_map::Entry::Occupied(_) => false,
      btree_map::Entry::Vacant(slot) => {
        let file = SourceFile::new(slot.key().clone(), content);
        slot.insert(file);
        true
      }
    }
  }

  pub fn contains(&self, path: &str) -> bool {
    self.files.contains_key(path)
  }

  pub fn get(&self, path: &str) -> Option<&SourceFile> {
    self.files.get(path)
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn paths(&self) -> impl Iterator<Item = &str> {
    self.files.keys().map(String::as_str)
  }

  pub fn iter(&self) -> impl Iterator<Item = &SourceFile> {
    self.files.values()
  }
}

impl<P, C> FromIterator<(P, C)> for FileSet
where
  P: Into<String>,
  C: Into<String>,
{
  fn from_iter<I: IntoIterator<Item = (P, C)>>(iter: I) -> Self {
    let mut set = FileSet::new();
    for (path, content) in iter {
      set.insert(path, content);
    }
    set
  }
}

impl<'a> IntoIterator for &'a FileSet {
  type Item = &'a SourceFile;
  type IntoIter = btree_map::Values<'a, String, SourceFile>;

  fn into_iter(self) -> Self::IntoIter {
    self.files.values()
  }
}

/// One top-level compile request as it moves through resolution, dispatch and retries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationJob {
  pub sources: FileSet,
  pub target: String,
  /// Import paths the backend reported as unresolved on the previous pass.
  pub missing_inputs: Vec<String>,
}

impl CompilationJob {
  pub fn new(sources: FileSet, target: impl Into<String>) -> Self {
    Self {
      sources,
      target: target.into(),
      missing_inputs: Vec::new(),
    }
  }

  /// Reuse the same file set for another pass, hinted with what the backend could not find.
  pub fn retry_with(mut self, missing_inputs: Vec<String>) -> Self {
    self.missing_inputs = missing_inputs;
    self
  }

  pub fn into_context(self) -> SourceContext {
    SourceContext {
      sources: self.sources,
      target: self.target,
    }
  }
}

/// The `{ sources, target }` pair reported alongside a terminal compilation event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SourceContext {
  pub sources: FileSet,
  pub target: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn insert_never_replaces_existing_content() {
    let mut files = FileSet::from_iter([("a.sol", "contract A {}")]);
    assert!(!files.insert("a.sol", "contract Changed {}"));
    assert!(files.insert("b.sol", "contract B {}"));
    assert_eq!(files.get("a.sol").unwrap().content, "contract A {}");
    assert_eq!(files.get("b.sol").unwrap().path, "b.sol");
    assert_eq!(files.paths().collect::<Vec<_>>(), vec!["a.sol", "b.sol"]);
  }

  #[test]
  fn retry_keeps_sources_and_replaces_hints() {
    let job = CompilationJob::new(FileSet::from_iter([("a.sol", "")]), "a.sol")
      .retry_with(vec!["b.sol".into()]);
    let again = job.clone().retry_with(vec!["c.sol".into()]);
    assert_eq!(again.missing_inputs, vec!["c.sol".to_string()]);
    assert_eq!(again.sources, job.sources);
    assert_eq!(again.into_context().target, "a.sol");
  }
}
