use std::fmt;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrajError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("unsupported: {0}")]
    Unsupported(String),
    #[error("property not available: {0}")]
    NotAvailable(String),
    #[error("trajectory arrays not materialized; call load_arrays() first")]
    NotMaterialized,
}

pub type TrajResult<T> = Result<T, TrajError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarningKind {
    MalformedShape,
    TypeRedefinition,
    RowCountMismatch,
    TruncatedMetadata,
    UnterminatedFrame,
    SiteConflict,
}

/// Non-fatal decode diagnostic. The decode that produced it still succeeded.
#[derive(Clone, Debug, PartialEq)]
pub struct ParseWarning {
    pub kind: WarningKind,
    pub message: String,
}

impl ParseWarning {
    /// Builds the warning and emits it through `tracing`.
    pub fn emit(kind: WarningKind, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::warn!(kind = ?kind, "{message}");
        Self { kind, message }
    }
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}
