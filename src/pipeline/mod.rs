pub mod analysis;
pub mod archive;
pub mod backend;
pub mod extract;
pub mod prompt;
pub mod retry;

pub use analysis::{AnalysisPipeline, BatchOutcome};
pub use archive::{FileArchiver, NullArchiver, RawOutputSink};
pub use backend::{build_backend, BackendConfig, BackendError, BackendKind, LlmBackend};
pub use extract::{extract_records, is_error_record};
pub use prompt::compile_prompt;
pub use retry::{invoke_with_retry, RetryPolicy};
