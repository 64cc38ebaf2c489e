use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ComprobanteError>;

/// Errors that can occur while building, encoding or submitting a comprobante.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComprobanteError {
    /// Malformed input to the modulo-11 checksum (empty or non-digit).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Malformed identity fields, invalid line amounts or an empty line list.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A required field is missing or a numeric field is out of range at encode time.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The canonical XML could not be parsed back into a document.
    #[error("decoding error: {0}")]
    Decoding(String),

    /// The external signer reported a failure.
    #[error("signing failed: {0}")]
    Signing(String),

    /// Network or I/O failure while calling the authority. Retryable.
    #[error("transport error: {0}")]
    Transport(String),

    /// Structured business rejection from the authority. Terminal.
    #[error("{stage} rejected by the authority: {}", join_messages(.messages))]
    AuthorityRejection {
        stage: RejectionStage,
        messages: Vec<AuthorityMessage>,
    },

    /// The operation is not allowed from the document's current lifecycle state.
    #[error("cannot {operation} a document in state {state}")]
    State {
        state: String,
        operation: &'static str,
    },

    /// Sequential number allocation error.
    #[error("numbering error: {0}")]
    Numbering(String),

    /// Configuration could not be loaded or failed boundary validation.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Which of the two remote phases produced an [`ComprobanteError::AuthorityRejection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum RejectionStage {
    /// Reception answered DEVUELTA.
    Reception,
    /// Authorization answered NO AUTORIZADO (or any non-authorized state).
    Authorization,
}

impl std::fmt::Display for RejectionStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reception => f.write_str("reception"),
            Self::Authorization => f.write_str("authorization"),
        }
    }
}

/// One message returned by the authority (`mensaje` element).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AuthorityMessage {
    /// Numeric message identifier, e.g. "35" or "43".
    pub identifier: String,
    /// Human-readable message text.
    pub message: String,
    /// Message kind, usually "ERROR" or "ADVERTENCIA".
    pub kind: String,
    /// Additional detail, if the authority supplied any.
    pub additional_info: Option<String>,
}

impl AuthorityMessage {
    pub fn error(identifier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            message: message.into(),
            kind: "ERROR".into(),
            additional_info: None,
        }
    }

    pub fn with_info(mut self, info: impl Into<String>) -> Self {
        self.additional_info = Some(info.into());
        self
    }
}

impl std::fmt::Display for AuthorityMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.identifier, self.kind, self.message)?;
        if let Some(info) = &self.additional_info {
            write!(f, " ({info})")?;
        }
        Ok(())
    }
}

fn join_messages(messages: &[AuthorityMessage]) -> String {
    if messages.is_empty() {
        return "no messages".into();
    }
    messages
        .iter()
        .map(|m| m.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// A single boundary-validation finding with field path and message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dot-separated path to the invalid field (e.g. "issuer.ruc").
    pub field: String,
    /// Human-readable error description.
    pub message: String,
    /// Authority rule reference if applicable.
    pub rule: Option<String>,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(rule) = &self.rule {
            write!(f, "[{}] {}: {}", rule, self.field, self.message)
        } else {
            write!(f, "{}: {}", self.field, self.message)
        }
    }
}

impl ValidationError {
    /// Create a finding without a rule reference.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: None,
        }
    }

    /// Create a finding with a rule reference.
    pub fn with_rule(
        field: impl Into<String>,
        message: impl Into<String>,
        rule: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            rule: Some(rule.into()),
        }
    }
}
