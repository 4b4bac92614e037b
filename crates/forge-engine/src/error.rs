use forge_contracts::character::DraftSchemaError;

/// Failure of a single generation call.
///
/// The session collapses every variant into the fixed message of the action that
/// failed; the variants exist for diagnostics and the event log.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    #[error("GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set")]
    MissingCredential,
    #[error("generation request failed: {0}")]
    Transport(String),
    #[error("generation request failed ({code}): {body}")]
    Status { code: u16, body: String },
    #[error("generation service returned no content")]
    EmptyResponse,
    #[error("generation service returned a malformed payload: {0}")]
    MalformedPayload(String),
    #[error("no image data found in response")]
    NoImage,
    #[error("no character to generate for")]
    NoSubject,
    #[error("unknown generation provider '{0}'")]
    UnknownProvider(String),
}

impl GenerationError {
    /// The service answered but said nothing usable, as opposed to a refused or
    /// broken request.
    pub fn is_service_silent(&self) -> bool {
        matches!(self, Self::EmptyResponse | Self::NoImage)
    }

    /// Short machine-readable tag for the event log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "missing_credential",
            Self::Transport(_) => "transport",
            Self::Status { .. } => "status",
            Self::EmptyResponse => "empty_response",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::NoImage => "no_image",
            Self::NoSubject => "no_subject",
            Self::UnknownProvider(_) => "unknown_provider",
        }
    }
}

impl From<DraftSchemaError> for GenerationError {
    fn from(err: DraftSchemaError) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use forge_contracts::character::DraftSchemaError;

    use super::GenerationError;

    #[test]
    fn silent_service_is_distinguished_from_broken_requests() {
        assert!(GenerationError::EmptyResponse.is_service_silent());
        assert!(GenerationError::NoImage.is_service_silent());
        assert!(!GenerationError::MissingCredential.is_service_silent());
        assert!(!GenerationError::Transport("timed out".to_string()).is_service_silent());
        assert!(!GenerationError::Status {
            code: 403,
            body: "denied".to_string()
        }
        .is_service_silent());
    }

    #[test]
    fn schema_errors_become_malformed_payloads() {
        let err = GenerationError::from(DraftSchemaError::MissingField("bio"));
        assert_eq!(
            err,
            GenerationError::MalformedPayload("draft payload is missing field 'bio'".to_string())
        );
        assert_eq!(err.code(), "malformed_payload");
    }
}
