use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

use super::{error_payload, invoke, BackendLoader, CompilerBackend};
use crate::internal::errors::{Error, Result};

/// Correlates a posted compile request with its reply. Never reused while pending.
pub type JobId = u64;

/// Messages posted to the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerRequest {
  LoadVersion { url: String },
  Compile { job: JobId, input: String },
}

/// Messages posted back by the worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerReply {
  VersionLoaded {
    version: String,
  },
  Compiled {
    job: JobId,
    data: String,
    missing_inputs: Vec<String>,
  },
  /// Failure that is not tied to any job.
  Error {
    message: String,
  },
}

pub(crate) fn worker_gone() -> Error {
  Error::Transport("worker is no longer running".into())
}

/// Isolated execution context owning one backend. Dropping it terminates the worker; replies
/// for jobs still in flight are lost.
pub(crate) struct Worker {
  requests: UnboundedSender<WorkerRequest>,
  replies: UnboundedReceiver<WorkerReply>,
  task: JoinHandle<()>,
}

impl Worker {
  pub(crate) fn spawn(loader: Arc<dyn BackendLoader>) -> Self {
    let (requests, inbox) = mpsc::unbounded_channel();
    let (outbox, replies) = mpsc::unbounded_channel();
    let task = tokio::spawn(run(loader, inbox, outbox));
    Self {
      requests,
      replies,
      task,
    }
  }

  pub(crate) fn post(&self, request: WorkerRequest) -> Result<()> {
    self
      .requests
      .send(request)
      .map_err(|_| worker_gone())
  }

  pub(crate) async fn recv(&mut self) -> Option<WorkerReply> {
    self.replies.recv().await
  }
}

impl Drop for Worker {
  fn drop(&mut self) {
    self.task.abort();
  }
}

async fn run(
  loader: Arc<dyn BackendLoader>,
  mut inbox: UnboundedReceiver<WorkerRequest>,
  outbox: UnboundedSender<WorkerReply>,
) {
  let mut backend: Option<Arc<dyn CompilerBackend>> = None;
  while let Some(request) = inbox.recv().await {
    match request {
      WorkerRequest::LoadVersion { url } => {
        let reply = match loader.load(&url).await {
          Ok(loaded) => {
            let version = loaded.version();
            backend = Some(loaded);
            WorkerReply::VersionLoaded { version }
          }
          Err(err) => WorkerReply::Error {
            message: format!("failed to load {url}: {err}"),
          },
        };
        if outbox.send(reply).is_err() {
          break;
        }
      }
      WorkerRequest::Compile { job, input } => {
        let Some(active) = backend.clone() else {
          let reply = WorkerReply::Compiled {
            job,
            data: error_payload(&Error::BackendNotReady.to_string()),
            missing_inputs: Vec::new(),
          };
          if outbox.send(reply).is_err() {
            break;
          }
          continue;
        };
        debug!(job, "worker compiling");
        // Jobs run side by side, so replies come back in completion order.
        let outbox = outbox.clone();
        tokio::spawn(async move {
          let compiled = tokio::task::spawn_blocking(move || invoke(active.as_ref(), &input));
          let reply = match compiled.await {
            Ok(output) => WorkerReply::Compiled {
              job,
              data: output.data,
              missing_inputs: output.missing_inputs,
            },
            Err(err) => WorkerReply::Compiled {
              job,
              data: error_payload(&format!("Worker error: {err}")),
              missing_inputs: Vec::new(),
            },
          };
          // The receiver is gone once the worker has been terminated.
          let _ = outbox.send(reply);
        });
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::backend::DeferredImport;
  use crate::internal::errors::BoxError;

  struct Fixed;

  impl CompilerBackend for Fixed {
    fn version(&self) -> String {
      "0.4.24".into()
    }

    fn compile(
      &self,
      input: &str,
      _on_missing: &mut dyn FnMut(&str) -> DeferredImport,
    ) -> std::result::Result<String, BoxError> {
      Ok(format!("{{\"echo\":{}}}", input.len()))
    }
  }

  fn loader() -> Arc<dyn BackendLoader> {
    Arc::new(|url: String| async move {
      if url == "missing" {
        return Err::<Arc<dyn CompilerBackend>, BoxError>("404".into());
      }
      Ok::<Arc<dyn CompilerBackend>, BoxError>(Arc::new(Fixed))
    })
  }

  #[tokio::test]
  async fn loads_then_compiles() {
    let mut worker = Worker::spawn(loader());
    worker
      .post(WorkerRequest::LoadVersion { url: "soljson.js".into() })
      .expect("post");
    worker
      .post(WorkerRequest::Compile {
        job: 3,
        input: "abc".into(),
      })
      .expect("post");

    assert_eq!(
      worker.recv().await,
      Some(WorkerReply::VersionLoaded {
        version: "0.4.24".into()
      })
    );
    assert_eq!(
      worker.recv().await,
      Some(WorkerReply::Compiled {
        job: 3,
        data: "{\"echo\":3}".into(),
        missing_inputs: Vec::new(),
      })
    );
  }

  #[tokio::test]
  async fn compile_before_load_reports_not_ready() {
    let mut worker = Worker::spawn(loader());
    worker
      .post(WorkerRequest::Compile {
        job: 0,
        input: "{}".into(),
      })
      .expect("post");
    let Some(WorkerReply::Compiled { job, data, .. }) = worker.recv().await else {
      panic!("expected a compiled reply");
    };
    assert_eq!(job, 0);
    assert!(data.contains("Compiler not yet loaded."));
  }

  #[tokio::test]
  async fn load_failure_is_reported_without_job() {
    let mut worker = Worker::spawn(loader());
    worker
      .post(WorkerRequest::LoadVersion { url: "missing".into() })
      .expect("post");
    assert_eq!(
      worker.recv().await,
      Some(WorkerReply::Error {
        message: "failed to load missing: 404".into()
      })
    );
  }
}
