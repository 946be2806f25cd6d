use thiserror::Error;

use crate::secrets::SecretError;

/// Failures that abort an invocation outright. Anything surfaced through this
/// type indicates misconfiguration or an unavailable collaborator rather than a
/// problem with the inbound event itself.
#[derive(Debug, Error)]
pub enum ApplicationError {
    #[error(transparent)]
    Secret(#[from] SecretError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

impl ApplicationError {
    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Secret(SecretError::MissingCredential { .. }) => "missing_credential",
            Self::Secret(_) => "secret_unavailable",
            Self::Persistence(_) => "persistence",
            Self::Integration(_) => "integration",
            Self::Configuration(_) => "configuration",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::ApplicationError;
    use crate::secrets::SecretError;

    #[test]
    fn missing_credential_has_distinct_class() {
        let error = ApplicationError::from(SecretError::MissingCredential {
            secret: "prod/brave".to_owned(),
            field: "BraveAPIKey",
        });

        assert_eq!(error.error_class(), "missing_credential");
        assert!(error.to_string().contains("BraveAPIKey"));
    }

    #[test]
    fn unavailable_secret_maps_to_secret_unavailable() {
        let error = ApplicationError::from(SecretError::Unavailable {
            secret: "prod/slack".to_owned(),
            reason: "not found".to_owned(),
        });

        assert_eq!(error.error_class(), "secret_unavailable");
    }

    #[test]
    fn persistence_error_keeps_detail() {
        let error = ApplicationError::Persistence("database is locked".to_owned());
        assert_eq!(error.error_class(), "persistence");
        assert_eq!(error.to_string(), "persistence failure: database is locked");
    }
}
