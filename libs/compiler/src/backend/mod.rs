//! The pluggable compiler backend and the two ways of running it.
//!
//! A backend is loaded from a descriptor (usually a URL) by a host-supplied [`BackendLoader`]
//! and then either called directly ([`ExecutionMode::Inline`]) or from an isolated worker task
//! that talks to the orchestrator only through [`WorkerRequest`] / [`WorkerReply`] messages
//! ([`ExecutionMode::Worker`]).

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use crate::internal::errors::BoxError;

mod version;
mod worker;

pub use version::{BackendSignal, CompilerVersionHandle, VersionManager};
pub use worker::{JobId, WorkerReply, WorkerRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ExecutionMode {
  Inline,
  Worker,
}

impl ExecutionMode {
  pub fn is_worker(self) -> bool {
    matches!(self, ExecutionMode::Worker)
  }
}

/// Placeholder handed back to the backend for an import it asked for but that is not part of the
/// bundle yet. Backends echo [`DeferredImport::MESSAGE`] in the diagnostic they emit for it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeferredImport;

impl DeferredImport {
  pub const MESSAGE: &'static str = "Deferred import";
}

/// An opaque compiler: standard-JSON in, standard-JSON out.
pub trait CompilerBackend: Send + Sync {
  fn version(&self) -> String;

  /// Compile `input`. `on_missing` must be called for every import the bundle does not contain.
  fn compile(
    &self,
    input: &str,
    on_missing: &mut dyn FnMut(&str) -> DeferredImport,
  ) -> Result<String, BoxError>;
}

/// Host mechanism that turns a descriptor into a ready backend.
pub trait BackendLoader: Send + Sync {
  fn load(&self, url: &str) -> BoxFuture<'static, Result<Arc<dyn CompilerBackend>, BoxError>>;
}

impl<F, Fut> BackendLoader for F
where
  F: Fn(String) -> Fut + Send + Sync,
  Fut: Future<Output = Result<Arc<dyn CompilerBackend>, BoxError>> + Send + 'static,
{
  fn load(&self, url: &str) -> BoxFuture<'static, Result<Arc<dyn CompilerBackend>, BoxError>> {
    Box::pin(self(url.to_owned()))
  }
}

/// Raw backend reply: the JSON payload plus every import it could not find, in request order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendOutput {
  pub data: String,
  pub missing_inputs: Vec<String>,
}

pub(crate) fn error_payload(message: &str) -> String {
  json!({
    "error": {
      "message": message,
      "formattedMessage": message,
      "severity": "error",
    }
  })
  .to_string()
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
  payload
    .downcast_ref::<&str>()
    .copied()
    .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
    .unwrap_or("backend panicked")
}

/// Run one compilation, collecting missing inputs. A backend error or panic becomes a fatal
/// payload, so inline and worker execution report it identically.
pub(crate) fn invoke(backend: &dyn CompilerBackend, input: &str) -> BackendOutput {
  let mut missing_inputs: Vec<String> = Vec::new();
  let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
    backend.compile(input, &mut |path| {
      if !missing_inputs.iter().any(|known| known == path) {
        missing_inputs.push(path.to_owned());
      }
      DeferredImport
    })
  }));
  let data = match outcome {
    Ok(Ok(data)) => data,
    Ok(Err(err)) => error_payload(&format!("Uncaught exception:\n{err}")),
    Err(payload) => error_payload(&format!(
      "Uncaught exception:\n{}",
      panic_message(payload.as_ref())
    )),
  };
  BackendOutput {
    data,
    missing_inputs,
  }
}
