use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::{AccessKey, AuthorityMessage};

/// Error type returned by remote collaborators.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// Produces the XAdES-BES signed bytes of an unsigned document.
#[async_trait]
pub trait Signer: Send + Sync {
    async fn sign(&self, unsigned: &[u8]) -> Result<Vec<u8>, CollaboratorError>;
}

/// The tax authority's reception and authorization services.
///
/// An `Err` means the call itself failed (network, timeout, malformed
/// reply) and is retried. Business answers, including rejections, come
/// back as `Ok`.
#[async_trait]
pub trait Authority: Send + Sync {
    async fn receive(&self, signed: &[u8]) -> Result<ReceptionAck, CollaboratorError>;

    async fn authorization(&self, key: &AccessKey)
    -> Result<AuthorizationResponse, CollaboratorError>;
}

/// Reception verdict (`estado` of `respuestaSolicitud`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceptionStatus {
    /// RECIBIDA
    Received,
    /// DEVUELTA
    Returned,
}

impl ReceptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "RECIBIDA",
            Self::Returned => "DEVUELTA",
        }
    }

    pub fn from_authority(status: &str) -> Option<Self> {
        match status.trim() {
            "RECIBIDA" => Some(Self::Received),
            "DEVUELTA" => Some(Self::Returned),
            _ => None,
        }
    }
}

/// Acknowledgment from the reception service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionAck {
    pub status: ReceptionStatus,
    #[serde(default)]
    pub messages: Vec<AuthorityMessage>,
}

impl ReceptionAck {
    pub fn received() -> Self {
        Self {
            status: ReceptionStatus::Received,
            messages: Vec::new(),
        }
    }

    pub fn returned(messages: Vec<AuthorityMessage>) -> Self {
        Self {
            status: ReceptionStatus::Returned,
            messages,
        }
    }
}

/// `estado` the authorization service reports for authorized documents.
pub const AUTHORIZED_STATUS: &str = "AUTORIZADO";

/// `estado` while the authority is still processing the document.
pub const IN_PROCESS_STATUS: &str = "EN PROCESO";

/// Reply of the authorization query.
///
/// `status` is `None` when the authority has no authorization on record
/// yet (an empty `autorizaciones` list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResponse {
    pub status: Option<String>,
    pub authorization_number: Option<String>,
    pub authorized_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub messages: Vec<AuthorityMessage>,
}

impl AuthorizationResponse {
    pub fn authorized(number: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            status: Some(AUTHORIZED_STATUS.into()),
            authorization_number: Some(number.into()),
            authorized_at: Some(at),
            messages: Vec::new(),
        }
    }

    pub fn pending() -> Self {
        Self::default()
    }

    pub fn not_authorized(messages: Vec<AuthorityMessage>) -> Self {
        Self {
            status: Some("NO AUTORIZADO".into()),
            messages,
            ..Self::default()
        }
    }

    pub fn verdict(&self) -> AuthorizationVerdict {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some(IN_PROCESS_STATUS) => AuthorizationVerdict::Pending,
            Some(AUTHORIZED_STATUS) => AuthorizationVerdict::Authorized,
            Some(_) => AuthorizationVerdict::Rejected,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorizationVerdict {
    Authorized,
    Pending,
    Rejected,
}

/// Cached result of the reception phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceptionResult {
    pub status: ReceptionStatus,
    pub messages: Vec<AuthorityMessage>,
    pub received_at: DateTime<Utc>,
}

impl ReceptionResult {
    pub fn is_received(&self) -> bool {
        self.status == ReceptionStatus::Received
    }
}

/// Authorization data of an authorized document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    pub number: String,
    pub authorized_at: DateTime<Utc>,
    pub messages: Vec<AuthorityMessage>,
}

/// Answer of [`Submission::check_authorization`](super::Submission::check_authorization).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationOutcome {
    Authorized(Authorization),
    /// Not decided yet; ask again later.
    Pending,
    Rejected(Vec<AuthorityMessage>),
}

impl AuthorizationOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdicts() {
        assert_eq!(
            AuthorizationResponse::authorized("123", Utc::now()).verdict(),
            AuthorizationVerdict::Authorized
        );
        assert_eq!(
            AuthorizationResponse::pending().verdict(),
            AuthorizationVerdict::Pending
        );
        let in_process = AuthorizationResponse {
            status: Some("EN PROCESO".into()),
            ..Default::default()
        };
        assert_eq!(in_process.verdict(), AuthorizationVerdict::Pending);
        assert_eq!(
            AuthorizationResponse::not_authorized(vec![]).verdict(),
            AuthorizationVerdict::Rejected
        );
        let unknown = AuthorizationResponse {
            status: Some("CADUCADO".into()),
            ..Default::default()
        };
        assert_eq!(unknown.verdict(), AuthorizationVerdict::Rejected);
    }

    #[test]
    fn reception_status_codes() {
        assert_eq!(
            ReceptionStatus::from_authority("RECIBIDA"),
            Some(ReceptionStatus::Received)
        );
        assert_eq!(
            ReceptionStatus::from_authority(" DEVUELTA "),
            Some(ReceptionStatus::Returned)
        );
        assert_eq!(ReceptionStatus::from_authority("OTRO"), None);
        assert_eq!(ReceptionStatus::Returned.as_str(), "DEVUELTA");
    }
}
