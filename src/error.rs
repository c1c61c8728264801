/// Errors surfaced by trainer construction and per-batch calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Images and messages disagree on the batch dimension, or a message
    /// vector does not match the configured message length.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// A required configuration key is missing or a value is degenerate.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested compute device is not available on this backend.
    #[error("compute device unavailable: {0}")]
    Device(String),
}
