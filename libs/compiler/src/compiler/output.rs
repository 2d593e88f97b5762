//! Classification and normalisation of backend results.

use serde_json::Value;
use tracing::debug;

use super::interface::update_interface;
use crate::backend::DeferredImport;
use crate::internal::errors::Error;
use crate::internal::version::parse_version;
use crate::types::{CompilationResult, Diagnostic, DiagnosticKind};

/// Outcome of [`classify`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Classification {
  pub is_fatal: bool,
  pub fatal_count: usize,
}

/// Parse a backend payload. Unparseable output becomes a single fatal diagnostic.
pub fn parse_response(data: &str) -> CompilationResult {
  match serde_json::from_str(data) {
    Ok(result) => result,
    Err(err) => {
      CompilationResult::from_error(Error::MalformedResponse(err.to_string()).to_diagnostic())
    }
  }
}

/// Tag the placeholders the backend produced for `missing_inputs`. Without missing inputs there
/// are no placeholders, so nothing is tagged and every error-severity diagnostic stays fatal.
pub fn mark_deferred_imports(result: &mut CompilationResult, missing_inputs: &[String]) {
  if missing_inputs.is_empty() {
    return;
  }
  for diagnostic in result.diagnostics_mut() {
    if is_placeholder(diagnostic) {
      diagnostic.kind = DiagnosticKind::DeferredImport;
    }
  }
}

fn is_placeholder(diagnostic: &Diagnostic) -> bool {
  std::iter::once(diagnostic.message.as_str())
    .chain(diagnostic.formatted_message.as_deref())
    .any(|text| text.contains(DeferredImport::MESSAGE))
}

/// A result is fatal when any diagnostic is an error that is not a deferred import placeholder.
pub fn classify(result: &CompilationResult) -> Classification {
  let fatal_count = result
    .diagnostics()
    .filter(|diagnostic| diagnostic.is_fatal())
    .count();
  Classification {
    is_fatal: fatal_count > 0,
    fatal_count,
  }
}

/// Rewrite every artifact interface into the canonical layout for backend `version`. Build
/// metadata in `version` is ignored; unparseable versions leave the result untouched.
pub fn normalize(mut result: CompilationResult, version: &str) -> CompilationResult {
  let parsed = match parse_version(version) {
    Ok(parsed) => parsed,
    Err(err) => {
      debug!(version = %version, error = %err, "skipping interface normalisation");
      return result;
    }
  };
  for artifact in result.contracts.values_mut().flat_map(|file| file.values_mut()) {
    if let Some(Value::Array(abi)) = artifact.get_mut("abi") {
      update_interface(&parsed, abi);
    }
  }
  result
}
