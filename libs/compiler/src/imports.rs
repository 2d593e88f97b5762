//! On-demand resolution of cross-file imports.
//!
//! Detection is a textual scan for `import "path";` statements that start a line. Imports that
//! share a line with other code are left for the backend to report as missing inputs, which
//! feeds them back into [`ImportResolver::resolve`] as hints.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::internal::errors::{BoxError, Error, Result};
use crate::types::FileSet;

static IMPORT_STATEMENT: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?m)^[ \t]*import[ \t]*['"]([^'"]+)['"];"#).expect("valid import pattern")
});

/// Host callback that turns an import path into source text.
pub trait ImportFetcher: Send + Sync {
  fn fetch(&self, path: &str) -> BoxFuture<'static, std::result::Result<String, BoxError>>;
}

impl<F, Fut> ImportFetcher for F
where
  F: Fn(String) -> Fut + Send + Sync,
  Fut: Future<Output = std::result::Result<String, BoxError>> + Send + 'static,
{
  fn fetch(&self, path: &str) -> BoxFuture<'static, std::result::Result<String, BoxError>> {
    Box::pin(self(path.to_owned()))
  }
}

/// Rewrite a raw import so it is relative to the directory of `target`. Only `./` prefixes are
/// rewritten; anything else is taken as already rooted.
pub fn normalize_import(raw: &str, target: &str) -> String {
  match raw.strip_prefix("./") {
    Some(rest) => match target.rfind('/') {
      Some(index) => format!("{}{}", &target[..=index], rest),
      None => rest.to_owned(),
    },
    None => raw.to_owned(),
  }
}

/// Every import path named at the start of a line in `content`, normalised against `target`.
pub fn scan_imports(content: &str, target: &str) -> Vec<String> {
  IMPORT_STATEMENT
    .captures_iter(content)
    .filter_map(|captures| captures.get(1))
    .map(|raw| normalize_import(raw.as_str(), target))
    .collect()
}

/// Deduplicated stack of paths still to be looked at.
#[derive(Debug, Default)]
struct Worklist {
  pending: Vec<String>,
}

impl Worklist {
  fn extend(&mut self, paths: impl IntoIterator<Item = String>) {
    for path in paths {
      if !self.pending.contains(&path) {
        self.pending.push(path);
      }
    }
  }

  fn pop(&mut self) -> Option<String> {
    self.pending.pop()
  }
}

#[derive(Clone)]
pub struct ImportResolver {
  fetcher: Arc<dyn ImportFetcher>,
}

impl ImportResolver {
  pub fn new(fetcher: Arc<dyn ImportFetcher>) -> Self {
    Self { fetcher }
  }

  /// Fetch every import reachable from `files` (plus `hints`) that is not already present,
  /// adding each to `files`. Each absent path is fetched at most once; the first fetch failure
  /// aborts the whole resolution. Returns the number of files added.
  pub async fn resolve(
    &self,
    files: &mut FileSet,
    target: &str,
    hints: impl IntoIterator<Item = String>,
  ) -> Result<usize> {
    let mut worklist = Worklist::default();
    worklist.extend(hints);
    for file in files.iter() {
      worklist.extend(scan_imports(&file.content, target));
    }

    let mut added = 0;
    while let Some(path) = worklist.pop() {
      if files.contains(&path) {
        continue;
      }
      debug!(path = %path, entry = %target, "fetching import");
      let content = self
        .fetcher
        .fetch(&path)
        .await
        .map_err(|err| Error::ImportFetch {
          path: path.clone(),
          message: err.to_string(),
        })?;
      let discovered = scan_imports(&content, target);
      files.insert(path, content);
      worklist.extend(discovered);
      added += 1;
    }
    Ok(added)
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;
  use std::sync::Mutex;

  use super::*;

  /// Serves fixed contents and records every requested path.
  struct MapFetcher {
    contents: BTreeMap<String, String>,
    requests: Mutex<Vec<String>>,
  }

  impl MapFetcher {
    fn new<const N: usize>(entries: [(&str, &str); N]) -> Arc<Self> {
      Arc::new(Self {
        contents: entries
          .into_iter()
          .map(|(path, content)| (path.to_owned(), content.to_owned()))
          .collect(),
        requests: Mutex::new(Vec::new()),
      })
    }

    fn requests(&self) -> Vec<String> {
      self.requests.lock().unwrap().clone()
    }
  }

  impl ImportFetcher for MapFetcher {
    fn fetch(&self, path: &str) -> BoxFuture<'static, std::result::Result<String, BoxError>> {
      self.requests.lock().unwrap().push(path.to_owned());
      let found = self.contents.get(path).cloned();
      let path = path.to_owned();
      Box::pin(async move { found.ok_or_else(|| BoxError::from(format!("{path} not found"))) })
    }
  }

  #[test]
  fn normalises_relative_imports_against_target_directory() {
    assert_eq!(normalize_import("./b.sol", "a.sol"), "b.sol");
    assert_eq!(normalize_import("./b.sol", "browser/a.sol"), "browser/b.sol");
    assert_eq!(normalize_import("./lib/c.sol", "x/y/a.sol"), "x/y/lib/c.sol");
    assert_eq!(normalize_import("github.com/x/y.sol", "a.sol"), "github.com/x/y.sol");
  }

  #[test]
  fn only_line_leading_imports_are_detected() {
    let source = "pragma solidity ^0.4.0; import \"skipped.sol\";\nimport './b.sol';\n  import \"c.sol\";\n";
    assert_eq!(scan_imports(source, "dir/a.sol"), vec!["dir/b.sol", "c.sol"]);
  }

  #[tokio::test]
  async fn file_set_without_imports_is_unchanged() {
    let fetcher = MapFetcher::new([]);
    let resolver = ImportResolver::new(fetcher.clone());
    let mut files = FileSet::from_iter([("a.sol", "contract A {}")]);
    let before = files.clone();

    let added = resolver.resolve(&mut files, "a.sol", Vec::new()).await.expect("resolve");

    assert_eq!(added, 0);
    assert_eq!(files, before);
    assert!(fetcher.requests().is_empty());
  }

  #[tokio::test]
  async fn fetches_relative_import() {
    let fetcher = MapFetcher::new([("b.sol", "contract B{}")]);
    let resolver = ImportResolver::new(fetcher.clone());
    let mut files = FileSet::from_iter([("a.sol", "import './b.sol';")]);

    resolver.resolve(&mut files, "a.sol", Vec::new()).await.expect("resolve");

    assert_eq!(files.paths().collect::<Vec<_>>(), vec!["a.sol", "b.sol"]);
    assert_eq!(files.get("b.sol").unwrap().content, "contract B{}");
    assert_eq!(fetcher.requests(), vec!["b.sol"]);
  }

  #[tokio::test]
  async fn cyclic_imports_terminate() {
    let fetcher = MapFetcher::new([("b.sol", "import \"a.sol\";\ncontract B {}")]);
    let resolver = ImportResolver::new(fetcher.clone());
    let mut files = FileSet::from_iter([("a.sol", "import \"b.sol\";\ncontract A {}")]);

    let added = resolver.resolve(&mut files, "a.sol", Vec::new()).await.expect("resolve");

    assert_eq!(added, 1);
    assert_eq!(files.len(), 2);
    assert_eq!(fetcher.requests(), vec!["b.sol"]);
  }

  #[tokio::test]
  async fn follows_transitive_imports_and_hints() {
    let fetcher = MapFetcher::new([
      ("b.sol", "import \"c.sol\";"),
      ("c.sol", "contract C {}"),
      ("hinted.sol", "contract H {}"),
    ]);
    let resolver = ImportResolver::new(fetcher.clone());
    let mut files = FileSet::from_iter([("a.sol", "import \"b.sol\";")]);

    let added = resolver
      .resolve(&mut files, "a.sol", vec!["hinted.sol".to_string()])
      .await
      .expect("resolve");

    assert_eq!(added, 3);
    assert!(files.contains("c.sol"));
    assert!(files.contains("hinted.sol"));
  }

  #[tokio::test]
  async fn first_fetch_failure_aborts_resolution() {
    let fetcher = MapFetcher::new([("ok.sol", "contract Ok {}")]);
    let resolver = ImportResolver::new(fetcher.clone());
    let mut files = FileSet::from_iter([("a.sol", "import \"ok.sol\";\nimport \"gone.sol\";")]);

    let err = resolver
      .resolve(&mut files, "a.sol", Vec::new())
      .await
      .expect_err("missing import");

    assert!(matches!(err, Error::ImportFetch { ref path, .. } if path == "gone.sol"));
    assert_eq!(fetcher.requests(), vec!["gone.sol"]);
    assert!(!files.contains("ok.sol"));
  }

  #[tokio::test]
  async fn closures_can_serve_imports() {
    let fetcher = |path: String| async move { Ok::<_, BoxError>(format!("// {path}")) };
    let resolver = ImportResolver::new(Arc::new(fetcher));
    let mut files = FileSet::new();

    resolver
      .resolve(&mut files, "a.sol", vec!["x.sol".to_string()])
      .await
      .expect("resolve");

    assert_eq!(files.get("x.sol").unwrap().content, "// x.sol");
  }
}
