use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
  #[default]
  Error,
  Warning,
  Info,
}

impl Severity {
  fn parse(value: Option<&str>) -> Self {
    match value.map(str::to_ascii_lowercase).as_deref() {
      Some("warning") => Severity::Warning,
      Some("info") => Severity::Info,
      _ => Severity::Error,
    }
  }
}

/// Where a diagnostic came from. Deferred imports are placeholders produced while the backend
/// walks an import it could not open; they drive the missing-input retry and are never fatal.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DiagnosticKind {
  #[default]
  Compiler,
  DeferredImport,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "DiagnosticRepr")]
pub struct Diagnostic {
  pub message: String,
  pub severity: Severity,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub formatted_message: Option<String>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub error_type: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub component: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub source_location: Option<Value>,
  #[serde(skip)]
  pub kind: DiagnosticKind,
}

impl Diagnostic {
  /// A fatal diagnostic carrying only a message, used for every failure produced locally.
  pub fn error(message: impl Into<String>) -> Self {
    let message = message.into();
    Self {
      formatted_message: Some(message.clone()),
      message,
      ..Default::default()
    }
  }

  pub fn warning(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      severity: Severity::Warning,
      ..Default::default()
    }
  }

  pub fn is_deferred_import(&self) -> bool {
    self.kind == DiagnosticKind::DeferredImport
  }

  pub fn is_fatal(&self) -> bool {
    self.severity == Severity::Error && !self.is_deferred_import()
  }
}

// Backends report errors either as bare strings or as standard-JSON error objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum DiagnosticRepr {
  Text(String),
  Fields(DiagnosticFields),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagnosticFields {
  message: Option<String>,
  severity: Option<String>,
  formatted_message: Option<String>,
  #[serde(rename = "type")]
  error_type: Option<String>,
  component: Option<String>,
  source_location: Option<Value>,
}

impl From<DiagnosticRepr> for Diagnostic {
  fn from(repr: DiagnosticRepr) -> Self {
    match repr {
      DiagnosticRepr::Text(message) => Diagnostic {
        message,
        ..Default::default()
      },
      DiagnosticRepr::Fields(fields) => Diagnostic {
        message: fields
          .message
          .or_else(|| fields.formatted_message.clone())
          .unwrap_or_default(),
        severity: Severity::parse(fields.severity.as_deref()),
        formatted_message: fields.formatted_message,
        error_type: fields.error_type,
        component: fields.component,
        source_location: fields.source_location,
        kind: DiagnosticKind::Compiler,
      },
    }
  }
}

/// Parsed backend output. Either the artifact maps plus a diagnostic list, or a single
/// top-level `error` describing why nothing was produced.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CompilationResult {
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub contracts: BTreeMap<String, BTreeMap<String, Value>>,
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub sources: BTreeMap<String, Value>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub errors: Vec<Diagnostic>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub error: Option<Diagnostic>,
}

impl CompilationResult {
  pub fn from_error(error: Diagnostic) -> Self {
    Self {
      error: Some(error),
      ..Default::default()
    }
  }

  pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
    self.error.iter().chain(self.errors.iter())
  }

  pub fn diagnostics_mut(&mut self) -> impl Iterator<Item = &mut Diagnostic> {
    self.error.iter_mut().chain(self.errors.iter_mut())
  }
}
