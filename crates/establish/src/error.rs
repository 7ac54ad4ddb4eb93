use std::fmt;

use crdready_kubehub::StoreError;

/// Why a single definition did not become established.
#[derive(Debug, thiserror::Error)]
pub enum EstablishError {
    /// `NamesAccepted=False`; waiting longer cannot help.
    #[error("Due to the naming conflict {reason}, the CustomResourceDefinition {name} will never become established")]
    Conflict { name: String, reason: String },
    #[error("CustomResourceDefinition {name} was not established within a reasonable amount of time.")]
    Timeout { name: String },
    #[error("failed to fetch CustomResourceDefinition {name}: {source}")]
    Fetch {
        name: String,
        #[source]
        source: StoreError,
    },
    #[error("waiting for CustomResourceDefinition {name} was cancelled")]
    Cancelled { name: String },
}

impl EstablishError {
    /// Name of the definition this error is about.
    pub fn name(&self) -> &str {
        match self {
            EstablishError::Conflict { name, .. }
            | EstablishError::Timeout { name }
            | EstablishError::Fetch { name, .. }
            | EstablishError::Cancelled { name } => name,
        }
    }

    /// Metric label for the outcome.
    pub(crate) fn outcome(&self) -> &'static str {
        match self {
            EstablishError::Conflict { .. } => "rejected",
            EstablishError::Timeout { .. } => "timeout",
            EstablishError::Fetch { .. } => "fetch_error",
            EstablishError::Cancelled { .. } => "cancelled",
        }
    }
}

/// Every failure of a batch, ordered by definition name.
///
/// Renders one wrapped message per line. Even a single failure is wrapped.
#[derive(Debug)]
pub struct AggregateError {
    errors: Vec<EstablishError>,
}

impl AggregateError {
    /// Sorts by name; failures for the same name keep their relative order.
    pub fn new(mut errors: Vec<EstablishError>) -> Self {
        errors.sort_by(|a, b| a.name().cmp(b.name()));
        Self { errors }
    }

    pub fn errors(&self) -> &[EstablishError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<EstablishError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}
