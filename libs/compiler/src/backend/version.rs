use std::sync::Arc;

use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::worker::{worker_gone, JobId, Worker, WorkerReply, WorkerRequest};
use super::{invoke, BackendLoader, BackendOutput, CompilerBackend, ExecutionMode};
use crate::internal::errors::{BoxError, Error, Result};

/// Identity of the backend currently able to take compile requests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilerVersionHandle {
  version: String,
  mode: ExecutionMode,
}

impl CompilerVersionHandle {
  pub fn version(&self) -> &str {
    &self.version
  }

  pub fn mode(&self) -> ExecutionMode {
    self.mode
  }
}

/// Something the active backend reported outside of a synchronous call.
#[derive(Debug)]
pub enum BackendSignal {
  Loaded { version: String },
  Compiled { job: JobId, output: BackendOutput },
  /// Load failure or worker transport failure; neither belongs to a job.
  Failed(Error),
  /// The worker stopped while a load or jobs were outstanding. No reply will arrive for any of
  /// them and the backend is unloaded.
  Terminated(Error),
}

type LoadOutcome = std::result::Result<Arc<dyn CompilerBackend>, BoxError>;

struct PendingLoad {
  url: String,
  ready: oneshot::Receiver<LoadOutcome>,
  task: JoinHandle<()>,
}

impl Drop for PendingLoad {
  fn drop(&mut self) {
    self.task.abort();
  }
}

enum Strategy {
  Unloaded,
  Inline {
    backend: Option<Arc<dyn CompilerBackend>>,
    pending: Option<PendingLoad>,
  },
  Worker {
    worker: Worker,
    awaiting_version: bool,
  },
}

/// Owns the single active backend and the strategy used to reach it. Loading a new descriptor
/// drops the previous strategy, which cancels an in-flight load and terminates a worker.
pub struct VersionManager {
  loader: Arc<dyn BackendLoader>,
  strategy: Strategy,
  active: Option<CompilerVersionHandle>,
}

impl VersionManager {
  pub fn new(loader: Arc<dyn BackendLoader>) -> Self {
    Self {
      loader,
      strategy: Strategy::Unloaded,
      active: None,
    }
  }

  /// Start loading `url`. Must be called from within a Tokio runtime.
  pub fn load(&mut self, url: &str, mode: ExecutionMode) -> Result<()> {
    self.active = None;
    self.strategy = Strategy::Unloaded;
    match mode {
      ExecutionMode::Inline => {
        let (resolve, ready) = oneshot::channel();
        let loading = self.loader.load(url);
        let task = tokio::spawn(async move {
          // Nobody is listening once a newer load superseded this one.
          let _ = resolve.send(loading.await);
        });
        self.strategy = Strategy::Inline {
          backend: None,
          pending: Some(PendingLoad {
            url: url.to_owned(),
            ready,
            task,
          }),
        };
      }
      ExecutionMode::Worker => {
        let worker = Worker::spawn(Arc::clone(&self.loader));
        worker.post(WorkerRequest::LoadVersion {
          url: url.to_owned(),
        })?;
        self.strategy = Strategy::Worker {
          worker,
          awaiting_version: true,
        };
      }
    }
    Ok(())
  }

  pub fn active(&self) -> Option<&CompilerVersionHandle> {
    self.active.as_ref()
  }

  pub fn version(&self) -> Option<&str> {
    self.active.as_ref().map(CompilerVersionHandle::version)
  }

  pub fn mode(&self) -> Option<ExecutionMode> {
    match self.strategy {
      Strategy::Unloaded => None,
      Strategy::Inline { .. } => Some(ExecutionMode::Inline),
      Strategy::Worker { .. } => Some(ExecutionMode::Worker),
    }
  }

  pub fn is_loading(&self) -> bool {
    match &self.strategy {
      Strategy::Unloaded => false,
      Strategy::Inline { pending, .. } => pending.is_some(),
      Strategy::Worker {
        awaiting_version, ..
      } => *awaiting_version,
    }
  }

  /// Install an inline backend whose load already completed, without waiting. Returns the new
  /// version, or the load failure.
  pub fn poll_ready(&mut self) -> Option<Result<String>> {
    let (url, outcome) = match &mut self.strategy {
      Strategy::Inline {
        pending: Some(load),
        ..
      } => match load.ready.try_recv() {
        Err(TryRecvError::Empty) => return None,
        Ok(outcome) => (load.url.clone(), outcome.map_err(|err| err.to_string())),
        Err(TryRecvError::Closed) => (load.url.clone(), Err(abandoned())),
      },
      _ => return None,
    };
    Some(self.settle_inline(url, outcome))
  }

  /// Call the inline backend directly. `None` while no inline backend is installed.
  pub(crate) fn invoke_inline(&self, input: &str) -> Option<BackendOutput> {
    match &self.strategy {
      Strategy::Inline {
        backend: Some(backend),
        ..
      } => Some(invoke(backend.as_ref(), input)),
      _ => None,
    }
  }

  pub(crate) fn post_compile(&self, job: JobId, input: String) -> Result<()> {
    match &self.strategy {
      Strategy::Worker { worker, .. } => worker.post(WorkerRequest::Compile { job, input }),
      _ => Err(Error::BackendNotReady),
    }
  }

  /// Wait for the next backend signal. Returns `None` when nothing is outstanding: no inline
  /// load in flight, and a worker that is neither loading nor holding `pending_jobs`. A worker
  /// that stops while something is outstanding yields [`BackendSignal::Terminated`].
  pub async fn next_signal(&mut self, pending_jobs: usize) -> Option<BackendSignal> {
    if let Strategy::Inline {
      pending: Some(load),
      ..
    } = &mut self.strategy
    {
      let url = load.url.clone();
      let outcome = match (&mut load.ready).await {
        Ok(outcome) => outcome.map_err(|err| err.to_string()),
        Err(_) => Err(abandoned()),
      };
      return Some(match self.settle_inline(url, outcome) {
        Ok(version) => BackendSignal::Loaded { version },
        Err(err) => BackendSignal::Failed(err),
      });
    }

    let Strategy::Worker {
      worker,
      awaiting_version,
    } = &mut self.strategy
    else {
      return None;
    };
    if !*awaiting_version && pending_jobs == 0 {
      return None;
    }
    let Some(reply) = worker.recv().await else {
      warn!("worker stopped with work outstanding");
      self.strategy = Strategy::Unloaded;
      self.active = None;
      return Some(BackendSignal::Terminated(worker_gone()));
    };
    match reply {
      WorkerReply::VersionLoaded { version } => {
        *awaiting_version = false;
        info!(version = %version, mode = "worker", "compiler loaded");
        self.active = Some(CompilerVersionHandle {
          version: version.clone(),
          mode: ExecutionMode::Worker,
        });
        Some(BackendSignal::Loaded { version })
      }
      WorkerReply::Compiled {
        job,
        data,
        missing_inputs,
      } => Some(BackendSignal::Compiled {
        job,
        output: BackendOutput {
          data,
          missing_inputs,
        },
      }),
      WorkerReply::Error { message } => {
        *awaiting_version = false;
        Some(BackendSignal::Failed(Error::Transport(message)))
      }
    }
  }

  fn settle_inline(
    &mut self,
    url: String,
    outcome: std::result::Result<Arc<dyn CompilerBackend>, String>,
  ) -> Result<String> {
    match outcome {
      Ok(backend) => {
        let version = backend.version();
        info!(version = %version, mode = "inline", "compiler loaded");
        self.active = Some(CompilerVersionHandle {
          version: version.clone(),
          mode: ExecutionMode::Inline,
        });
        self.strategy = Strategy::Inline {
          backend: Some(backend),
          pending: None,
        };
        Ok(version)
      }
      Err(message) => {
        self.strategy = Strategy::Unloaded;
        Err(Error::Load { url, message })
      }
    }
  }
}

fn abandoned() -> String {
  "loader finished without producing a backend".to_owned()
}
