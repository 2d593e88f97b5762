mod output;
mod sources;

pub use output::{CompilationResult, Diagnostic, DiagnosticKind, Severity};
pub use sources::{CompilationJob, FileSet, SourceContext, SourceFile};
