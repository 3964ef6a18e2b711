//! Error types for the clique operator

use thiserror::Error;

/// Reconcile sub-steps that can fail and abort a pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReconcileStep {
    ValidateSpec,
    ListPods,
    BuildSelector,
    UpdateStatus,
    ListCliques,
}

impl std::fmt::Display for ReconcileStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileStep::ValidateSpec => write!(f, "validate spec"),
            ReconcileStep::ListPods => write!(f, "list pods"),
            ReconcileStep::BuildSelector => write!(f, "build selector"),
            ReconcileStep::UpdateStatus => write!(f, "update status"),
            ReconcileStep::ListCliques => write!(f, "list cliques"),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error outside of a reconcile step
    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    /// Operator or resource misconfiguration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Spec failed validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Label selector could not be built from the given labels
    #[error("Invalid label selector: {0}")]
    InvalidSelector(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// A reconcile sub-step failed for a specific target
    #[error("failed to {step} for {target}: {source}")]
    Step {
        step: ReconcileStep,
        target: String,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error with the failed step and the target it was running against.
    pub fn at_step(step: ReconcileStep, target: impl Into<String>, source: impl Into<Error>) -> Self {
        Error::Step {
            step,
            target: target.into(),
            source: Box::new(source.into()),
        }
    }

    /// Errors that may resolve on their own without a change to any spec
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::KubeError(_) => true,
            Error::Step { source, .. } => source.is_retriable(),
            Error::ConfigError(_)
            | Error::ValidationError(_)
            | Error::InvalidSelector(_)
            | Error::SerializationError(_) => false,
        }
    }

    /// Errors that need an external correction of a resource spec
    pub fn is_config_error(&self) -> bool {
        match self {
            Error::ConfigError(_) | Error::ValidationError(_) | Error::InvalidSelector(_) => true,
            Error::Step { source, .. } => source.is_config_error(),
            Error::KubeError(_) | Error::SerializationError(_) => false,
        }
    }

    /// Short category used for metric labels
    pub fn kind(&self) -> &'static str {
        match self {
            Error::KubeError(_) => "kube",
            Error::ConfigError(_) => "config",
            Error::ValidationError(_) => "validation",
            Error::InvalidSelector(_) => "selector",
            Error::SerializationError(_) => "serialization",
            Error::Step { source, .. } => source.kind(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
