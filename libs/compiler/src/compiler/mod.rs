use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::backend::{BackendLoader, BackendOutput, BackendSignal, ExecutionMode, VersionManager};
use crate::events::{CompilerEvent, EventBus, SubscriptionId};
use crate::imports::{ImportFetcher, ImportResolver};
use crate::internal::config::CompilerConfig;
use crate::internal::errors::{Error, Result};
use crate::types::{CompilationJob, CompilationResult, Diagnostic, FileSet, SourceContext};
use registry::{JobRegistry, PendingJob};
pub use store::{ContractRef, LastCompilation, ResultStore};

pub mod input;
pub mod interface;
pub mod output;
mod registry;
mod store;


#[derive(Clone, Copy, Debug, PartialEq, Eq, strum::Display)]
pub enum LifecycleState {
  Idle,
  LoadingBackend,
  BackendReady,
  Compiling,
}

/// Orchestration context for one editor session: the active backend, the worker job registry,
/// the import resolver and the lifecycle event bus. Everything runs on the caller's task;
/// worker replies and inline load completion are processed by [`Compiler::handle_next`].
pub struct Compiler {
  events: EventBus<CompilerEvent>,
  resolver: ImportResolver,
  versions: VersionManager,
  registry: JobRegistry,
  results: ResultStore,
  config: CompilerConfig,
}

impl Compiler {
  pub fn new(
    loader: Arc<dyn BackendLoader>,
    fetcher: Arc<dyn ImportFetcher>,
    config: CompilerConfig,
  ) -> Self {
    Self {
      events: EventBus::new(),
      resolver: ImportResolver::new(fetcher),
      versions: VersionManager::new(loader),
      registry: JobRegistry::default(),
      results: ResultStore::default(),
      config,
    }
  }

  pub fn subscribe(
    &mut self,
    listener: impl FnMut(&CompilerEvent) + Send + 'static,
  ) -> SubscriptionId {
    self.events.subscribe(listener)
  }

  pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
    self.events.unsubscribe(id)
  }

  pub fn config(&self) -> &CompilerConfig {
    &self.config
  }

  pub fn set_optimize(&mut self, optimize: bool) {
    self.config.optimize = optimize;
  }

  /// Handle to the last-known-good compilation, readable independently of this context.
  pub fn results(&self) -> ResultStore {
    self.results.clone()
  }

  pub fn version(&self) -> Option<&str> {
    self.versions.version()
  }

  pub fn pending_jobs(&self) -> usize {
    self.registry.len()
  }

  pub fn state(&self) -> LifecycleState {
    if self.versions.is_loading() {
      LifecycleState::LoadingBackend
    } else if self.versions.active().is_none() {
      LifecycleState::Idle
    } else if !self.registry.is_empty() {
      LifecycleState::Compiling
    } else {
      LifecycleState::BackendReady
    }
  }

  /// Load the backend at `url`, superseding the current one. Jobs pending on a previous worker
  /// are dropped without any terminal event. Must be called from within a Tokio runtime.
  pub fn load_version(&mut self, url: &str, mode: ExecutionMode) {
    info!(url = %url, mode = %mode, "loading compiler");
    self.events.emit(&CompilerEvent::LoadingCompiler {
      url: url.to_owned(),
      mode,
    });
    let dropped = self.registry.clear();
    if dropped > 0 {
      debug!(dropped, "discarding jobs of the previous backend");
    }
    if let Err(err) = self.versions.load(url, mode) {
      self.report_detached(err);
    }
  }

  /// Compile `files` for `target`. Emits `CompilationStarted` now and exactly one
  /// `CompilationFinished` later: before returning in inline mode, from
  /// [`Compiler::handle_next`] in worker mode.
  pub async fn compile(&mut self, files: FileSet, target: impl Into<String>) {
    let job = CompilationJob::new(files, target);
    debug!(entry = %job.target, files = job.sources.len(), "compilation started");
    self.events.emit(&CompilerEvent::CompilationStarted);
    self.submit(job, Some(Instant::now())).await;
  }

  /// Process the next backend signal. Returns `false` when nothing is outstanding.
  pub async fn handle_next(&mut self) -> bool {
    let Some(signal) = self.versions.next_signal(self.registry.len()).await else {
      return false;
    };
    match signal {
      BackendSignal::Loaded { version } => {
        self.events.emit(&CompilerEvent::CompilerLoaded { version });
      }
      BackendSignal::Failed(err) => self.report_detached(err),
      BackendSignal::Terminated(err) => self.abandon_pending(err),
      BackendSignal::Compiled { job: id, output } => match self.registry.take(id) {
        Some(PendingJob { job, started_at }) => {
          if let Some(retry) = self.complete(job, started_at, output) {
            self.submit(retry, started_at).await;
          }
        }
        None => warn!(job = id, "discarding reply for unknown job"),
      },
    }
    true
  }

  /// Keep processing signals until nothing is outstanding.
  pub async fn run_until_idle(&mut self) {
    while self.handle_next().await {}
  }

  /// Resolve imports and hand the job to the backend, looping while an inline backend keeps
  /// asking for missing inputs.
  async fn submit(&mut self, mut job: CompilationJob, started_at: Option<Instant>) {
    loop {
      let hints = std::mem::take(&mut job.missing_inputs);
      if !hints.is_empty() && hints.iter().all(|path| job.sources.contains(path)) {
        let err = Error::UnresolvedImports(hints);
        return self.fail(err.to_diagnostic(), Some(job.into_context()), started_at);
      }
      if let Err(err) = self
        .resolver
        .resolve(&mut job.sources, &job.target, hints)
        .await
      {
        return self.fail(err.to_diagnostic(), Some(job.into_context()), started_at);
      }
      let input = match input::standard_json(&job.sources, &self.config) {
        Ok(input) => input,
        Err(err) => return self.fail(err.to_diagnostic(), Some(job.into_context()), started_at),
      };

      if let Some(outcome) = self.versions.poll_ready() {
        self.on_inline_ready(outcome);
      }

      if self.versions.mode() == Some(ExecutionMode::Worker) {
        let id = self.registry.register(PendingJob { job, started_at });
        match self.versions.post_compile(id, input) {
          Ok(()) => debug!(job = id, "posted compile request"),
          Err(err) => {
            if let Some(PendingJob { job, started_at }) = self.registry.take(id) {
              self.fail(err.to_diagnostic(), Some(job.into_context()), started_at);
            }
          }
        }
        return;
      }

      let Some(output) = self.versions.invoke_inline(&input) else {
        let err = Error::BackendNotReady;
        return self.fail(err.to_diagnostic(), Some(job.into_context()), started_at);
      };
      match self.complete(job, started_at, output) {
        Some(retry) => job = retry,
        None => return,
      }
    }
  }

  /// Settle a backend reply. Returns the job to resubmit when the backend reported missing
  /// inputs; otherwise emits the terminal events.
  fn complete(
    &mut self,
    job: CompilationJob,
    started_at: Option<Instant>,
    output: BackendOutput,
  ) -> Option<CompilationJob> {
    let mut result = output::parse_response(&output.data);
    if !output.missing_inputs.is_empty() {
      // Placeholders for the missing inputs are expected on this pass.
      output::mark_deferred_imports(&mut result, &output.missing_inputs);
      let outcome = output::classify(&result);
      if outcome.is_fatal {
        debug!(
          entry = %job.target,
          fatal = outcome.fatal_count,
          "retrying despite errors unrelated to missing inputs"
        );
      }
      debug!(
        entry = %job.target,
        missing = ?output.missing_inputs,
        "backend requested missing inputs"
      );
      return Some(job.retry_with(output.missing_inputs));
    }

    let source = job.into_context();
    if output::classify(&result).is_fatal {
      self.results.clear();
      self.finish(false, result, Some(source), started_at);
      return None;
    }
    let result = match self.versions.version() {
      Some(version) => output::normalize(result, version),
      None => result,
    };
    self.results.replace(LastCompilation {
      result: result.clone(),
      source: source.clone(),
    });
    self.finish(true, result, Some(source), started_at);
    None
  }

  fn on_inline_ready(&mut self, outcome: Result<String>) {
    match outcome {
      Ok(version) => self.events.emit(&CompilerEvent::CompilerLoaded { version }),
      Err(err) => self.report_detached(err),
    }
  }

  /// A failure that belongs to no compile request, such as a worker transport error.
  fn report_detached(&mut self, err: Error) {
    warn!(error = %err, "compiler backend failure");
    self.results.clear();
    self.finish(false, CompilationResult::from_error(err.to_diagnostic()), None, None);
  }

  /// The worker is gone: every job still waiting on it fails with `err`. With nothing pending
  /// the failure is reported on its own.
  fn abandon_pending(&mut self, err: Error) {
    let pending = self.registry.drain();
    if pending.is_empty() {
      return self.report_detached(err);
    }
    warn!(error = %err, jobs = pending.len(), "worker stopped with jobs in flight");
    for PendingJob { job, started_at } in pending {
      self.fail(err.to_diagnostic(), Some(job.into_context()), started_at);
    }
  }

  fn fail(
    &mut self,
    diagnostic: Diagnostic,
    source: Option<SourceContext>,
    started_at: Option<Instant>,
  ) {
    self.results.clear();
    self.finish(false, CompilationResult::from_error(diagnostic), source, started_at);
  }

  fn finish(
    &mut self,
    success: bool,
    result: CompilationResult,
    source: Option<SourceContext>,
    started_at: Option<Instant>,
  ) {
    info!(
      success,
      entry = source.as_ref().map(|source| source.target.as_str()).unwrap_or(""),
      diagnostics = result.diagnostics().count(),
      "compilation finished"
    );
    self.events.emit(&CompilerEvent::CompilationFinished {
      success,
      result,
      source,
    });
    if let Some(started_at) = started_at {
      let elapsed_ms = u64::try_from(started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
      self.events.emit(&CompilerEvent::CompilationDuration { elapsed_ms });
    }
  }
}
