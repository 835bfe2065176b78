use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for the event-driven engine.
///
/// Invalid inputs are rejected at the component that receives them and never
/// reach the scheduler. Stale queue entries are not errors at all; they are
/// discarded silently during popping.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid user or API parameter.
    #[error("invalid parameter: {0}")]
    InvalidParam(String),

    /// Numerical pathology (e.g., degenerate contact normal).
    #[error("numerical error: {0}")]
    MathError(String),

    /// Hard-core overlap: the configuration's potential energy is infinite.
    /// Fatal for the current configuration; the caller must supply a
    /// corrected one before resetting again.
    #[error("hard-core overlap in box '{label}': configuration rejected")]
    Overlap { label: String },
}

impl Error {
    /// True for the fatal overlap fault.
    pub fn is_overlap(&self) -> bool {
        matches!(self, Error::Overlap { .. })
    }
}
