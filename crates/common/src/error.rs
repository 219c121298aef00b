use thiserror::Error;

/// Error taxonomy for the pipeline and its adapters.
///
/// Transient external failures and LLM semantic failures are handled
/// inside each stage — logged, item skipped, stage degrades to a
/// fallback — and never reach this type. `PipelineError` is reserved
/// for what should actually surface: bad configuration or a blown
/// deadline.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("pipeline processing timeout exceeded")]
    Timeout,
}
