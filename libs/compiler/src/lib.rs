//! Orchestrates compilation of interdependent Solidity sources against a dynamically loaded
//! solc backend.
//!
//! A [`Compiler`] owns one active backend, run either inline or inside an isolated worker task,
//! resolves imports on demand through a host [`ImportFetcher`], re-runs the backend when it
//! reports missing inputs, and publishes the lifecycle on an [`EventBus`].

pub mod backend;
pub mod compiler;
pub mod events;
pub mod imports;
mod internal;
pub mod types;

pub use backend::{
  BackendLoader, BackendOutput, CompilerBackend, CompilerVersionHandle, DeferredImport,
  ExecutionMode, JobId, WorkerReply, WorkerRequest,
};
pub use compiler::{Compiler, ContractRef, LastCompilation, LifecycleState, ResultStore};
pub use events::{CompilerEvent, EventBus, SubscriptionId};
pub use imports::{ImportFetcher, ImportResolver};
pub use internal::config::{
  CompilerConfig, CompilerConfigOptions, Libraries, DEFAULT_OPTIMIZER_RUNS,
};
pub use internal::errors::{BoxError, Error, Result};
pub use internal::storage::{ConfigStore, FileStorage, MemoryStorage, Storage, CONFIG_KEY};
pub use internal::version::{parse_version, truncate_version};
pub use types::{
  CompilationJob, CompilationResult, Diagnostic, DiagnosticKind, FileSet, Severity,
  SourceContext, SourceFile,
};
