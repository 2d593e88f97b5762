use std::fmt::Display;

use thiserror::Error;

use crate::types::Diagnostic;

/// Boxed failure reported by a collaborator (import fetcher, backend loader, backend).
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error type used across the orchestration pipeline.
#[derive(Debug, Error)]
pub enum Error {
  #[error("Failed to fetch import \"{path}\": {message}")]
  ImportFetch { path: String, message: String },
  #[error("Compiler not yet loaded.")]
  BackendNotReady,
  #[error("Invalid JSON output from the compiler: {0}")]
  MalformedResponse(String),
  #[error("Worker error: {0}")]
  Transport(String),
  #[error("Failed to load compiler from {url}: {message}")]
  Load { url: String, message: String },
  #[error("Unable to resolve imports: {}", .0.join(", "))]
  UnresolvedImports(Vec<String>),
  #[error("{context}: {message}")]
  Context { context: String, message: String },
  #[error("Storage error: {0}")]
  Storage(String),
  #[error(transparent)]
  Json(#[from] serde_json::Error),
  #[error(transparent)]
  Io(#[from] std::io::Error),
}

impl Error {
  pub fn with_context(context: impl AsRef<str>, cause: impl Display) -> Self {
    Error::Context {
      context: context.as_ref().trim_end_matches(':').to_owned(),
      message: cause.to_string(),
    }
  }

  /// The single fatal diagnostic reported to listeners when this error ends a compilation.
  pub fn to_diagnostic(&self) -> Diagnostic {
    Diagnostic::error(self.to_string())
  }
}

/// Result alias bound to [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Annotate an error from `result` with `context`, returning the shared [`Result`] type.
pub fn map_err_with_context<T, E>(
  result: std::result::Result<T, E>,
  context: impl AsRef<str>,
) -> Result<T>
where
  E: Display,
{
  result.map_err(|err| Error::with_context(context, err))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::Severity;

  #[test]
  fn context_is_prefixed_once() {
    let err = map_err_with_context::<(), _>(Err("disk full"), "Failed to persist config:")
      .expect_err("error");
    assert_eq!(err.to_string(), "Failed to persist config: disk full");
  }

  #[test]
  fn diagnostics_are_fatal() {
    let diagnostic = Error::UnresolvedImports(vec!["a.sol".into(), "b.sol".into()]).to_diagnostic();
    assert_eq!(diagnostic.severity, Severity::Error);
    assert_eq!(diagnostic.message, "Unable to resolve imports: a.sol, b.sol");
    assert!(diagnostic.is_fatal());
  }
}
