//! Typed error hierarchy for the coordination core.
//!
//! Four enums cover the closed error-kind set of the design:
//! - `ArtifactError` — artifact store persistence failures
//! - `ProviderError` — provider registry / rotation failures
//! - `StageError` — per-stage orchestration failures
//! - `CoreError` — top-level error returned by the pipeline orchestrator

use thiserror::Error;

/// Errors from the artifact store.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("failed to create directory at {path}: {source}")]
    DirCreateFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write artifact at {path}: {source}")]
    WriteFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read artifact at {path}: {source}")]
    ReadFailed {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no artifact found for session {session} sub-stage {sub_stage}")]
    NotFound { session: String, sub_stage: String },

    #[error("failed to read session directory at {path}: {source}")]
    SessionDirUnreadable {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Errors from the provider registry and rotation manager.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no provider available for capability class {class}")]
    NoProviderAvailable { class: String },

    #[error("no provider available for service type {service_type}")]
    NoServiceAvailable { service_type: String },

    #[error("provider {name} ({class}) hit a transient error: {message}")]
    Transient {
        class: String,
        name: String,
        message: String,
    },

    #[error("provider {name} ({class}) failed fatally: {message}")]
    Fatal {
        class: String,
        name: String,
        message: String,
    },
}

/// Errors from a single pipeline stage.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("stage {stage} requires an artifact from a prior stage that is missing: {detail}")]
    StageInputMissing { stage: u8, detail: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Top-level error returned by the master pipeline orchestrator and the CLI.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("required configuration missing: {0}")]
    ConfigMissing(String),

    #[error(transparent)]
    Stage(#[from] StageError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_error_no_provider_available_carries_class() {
        let err = ProviderError::NoProviderAvailable {
            class: "exa".to_string(),
        };
        assert!(err.to_string().contains("exa"));
    }

    #[test]
    fn stage_error_converts_from_provider_error() {
        let inner = ProviderError::NoProviderAvailable {
            class: "serper".to_string(),
        };
        let stage_err: StageError = inner.into();
        match &stage_err {
            StageError::Provider(ProviderError::NoProviderAvailable { class }) => {
                assert_eq!(class, "serper");
            }
            _ => panic!("expected StageError::Provider(NoProviderAvailable)"),
        }
    }

    #[test]
    fn core_error_converts_from_stage_error() {
        let stage_err = StageError::StageInputMissing {
            stage: 2,
            detail: "no collection artifact".to_string(),
        };
        let core_err: CoreError = stage_err.into();
        assert!(matches!(core_err, CoreError::Stage(_)));
        assert!(core_err.to_string().contains("stage 2"));
    }

    #[test]
    fn error_variants_are_distinct() {
        let a = ProviderError::NoProviderAvailable {
            class: "x".into(),
        };
        let b = ProviderError::NoServiceAvailable {
            service_type: "x".into(),
        };
        assert!(!matches!(a, ProviderError::NoServiceAvailable { .. }));
        assert!(matches!(b, ProviderError::NoServiceAvailable { .. }));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&ArtifactError::NotFound {
            session: "s".into(),
            sub_stage: "t".into(),
        });
        assert_std_error(&ProviderError::NoProviderAvailable { class: "x".into() });
        assert_std_error(&StageError::Cancelled);
        assert_std_error(&CoreError::ConfigMissing("x".into()));
    }
}
