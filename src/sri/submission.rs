use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep, timeout_at};
use tracing::{debug, info, warn};

use super::collaborators::{
    Authority, Authorization, AuthorizationOutcome, AuthorizationVerdict, ReceptionResult, Signer,
};
use super::retry::{PollPolicy, RetryPolicy, retry_transport};
use super::state::{Event, LifecycleState, transition};
use crate::core::error::Result;
use crate::core::{
    AccessKey, AuthorityMessage, ComprobanteError, Document, DocumentIdentity, DocumentTotals,
    RejectionStage,
};
use crate::factura::{EncodedDocument, to_xml};

#[derive(Debug, Clone)]
struct SignedArtifacts {
    encoded: EncodedDocument,
    signed: Vec<u8>,
}

#[derive(Debug, Clone)]
struct ReceivedArtifacts {
    signed: SignedArtifacts,
    reception: ReceptionResult,
}

/// Lifecycle stage together with everything produced so far.
#[derive(Debug, Clone)]
enum Stage {
    Draft,
    Encoded(EncodedDocument),
    Signed(SignedArtifacts),
    Received(ReceivedArtifacts),
    Returned(ReceivedArtifacts),
    Authorized(ReceivedArtifacts, Authorization),
    Rejected(ReceivedArtifacts, Vec<AuthorityMessage>),
}

impl Stage {
    fn state(&self) -> LifecycleState {
        match self {
            Self::Draft => LifecycleState::Draft,
            Self::Encoded(_) => LifecycleState::Encoded,
            Self::Signed(_) => LifecycleState::Signed,
            Self::Received(_) => LifecycleState::Received,
            Self::Returned(_) => LifecycleState::Returned,
            Self::Authorized(..) => LifecycleState::Authorized,
            Self::Rejected(..) => LifecycleState::Rejected,
        }
    }

    fn encoded(&self) -> Option<&EncodedDocument> {
        match self {
            Self::Draft => None,
            Self::Encoded(encoded) => Some(encoded),
            _ => self.signed().map(|s| &s.encoded),
        }
    }

    fn signed(&self) -> Option<&SignedArtifacts> {
        match self {
            Self::Draft | Self::Encoded(_) => None,
            Self::Signed(signed) => Some(signed),
            _ => self.received().map(|r| &r.signed),
        }
    }

    fn received(&self) -> Option<&ReceivedArtifacts> {
        match self {
            Self::Received(r) | Self::Returned(r) | Self::Authorized(r, _) | Self::Rejected(r, _) => {
                Some(r)
            }
            _ => None,
        }
    }

    fn authorization(&self) -> Option<&Authorization> {
        match self {
            Self::Authorized(_, authorization) => Some(authorization),
            _ => None,
        }
    }

    fn rejection(&self) -> Option<&[AuthorityMessage]> {
        match self {
            Self::Rejected(_, messages) => Some(messages),
            _ => None,
        }
    }
}

/// One applied state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LifecycleState,
    pub to: LifecycleState,
    pub at: DateTime<Utc>,
}

/// Read-only view of a submission for presentation and storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionSnapshot {
    pub access_key: AccessKey,
    pub document_number: String,
    pub identity: DocumentIdentity,
    pub totals: DocumentTotals,
    pub state: LifecycleState,
    pub encoded_xml: Option<String>,
    pub reception: Option<ReceptionResult>,
    pub authorization: Option<Authorization>,
    pub rejection: Vec<AuthorityMessage>,
    pub history: Vec<TransitionRecord>,
}

impl SubmissionSnapshot {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ComprobanteError::Encoding(format!("snapshot serialization: {e}")))
    }
}

/// Drives one document through encoding, signing, reception and
/// authorization.
///
/// Every operation takes `&mut self`, so a submission has a single writer.
/// State only changes after the remote answer has arrived; dropping an
/// in-flight future leaves the submission where it was.
#[derive(Debug, Clone)]
pub struct Submission {
    document: Document,
    access_key: AccessKey,
    stage: Stage,
    history: Vec<TransitionRecord>,
    retry: RetryPolicy,
    poll: PollPolicy,
}

impl Submission {
    pub fn new(document: Document) -> Self {
        Self::with_policies(document, RetryPolicy::default(), PollPolicy::default())
    }

    pub fn with_policies(document: Document, retry: RetryPolicy, poll: PollPolicy) -> Self {
        let access_key = document.access_key();
        Self {
            document,
            access_key,
            stage: Stage::Draft,
            history: Vec::new(),
            retry,
            poll,
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn access_key(&self) -> &AccessKey {
        &self.access_key
    }

    pub fn state(&self) -> LifecycleState {
        self.stage.state()
    }

    pub fn history(&self) -> &[TransitionRecord] {
        &self.history
    }

    pub fn encoded(&self) -> Option<&EncodedDocument> {
        self.stage.encoded()
    }

    pub fn signed_bytes(&self) -> Option<&[u8]> {
        self.stage.signed().map(|s| s.signed.as_slice())
    }

    pub fn reception(&self) -> Option<&ReceptionResult> {
        self.stage.received().map(|r| &r.reception)
    }

    pub fn authorization(&self) -> Option<&Authorization> {
        self.stage.authorization()
    }

    /// Encode the document. Later states return the cached encoding.
    pub fn encode(&mut self) -> Result<&EncodedDocument> {
        if self.state() == LifecycleState::Draft {
            let encoded = to_xml(&self.document)?;
            self.advance(&[Event::Encode], |_| Stage::Encoded(encoded))?;
        }
        self.stage
            .encoded()
            .ok_or_else(|| self.state_error("encode"))
    }

    /// Have the signer sign the encoded document.
    ///
    /// A signer failure leaves the submission ENCODED so signing can be
    /// retried. Later states return the cached signed bytes.
    pub async fn sign<S>(&mut self, signer: &S) -> Result<&[u8]>
    where
        S: Signer + ?Sized,
    {
        if let Stage::Encoded(encoded) = &self.stage {
            let outcome = signer.sign(encoded.as_bytes()).await;
            match outcome {
                Ok(signed) if !signed.is_empty() => {
                    self.advance(&[Event::SignSucceeded], |stage| match stage {
                        Stage::Encoded(encoded) => Stage::Signed(SignedArtifacts { encoded, signed }),
                        other => other,
                    })?;
                }
                outcome => {
                    let reason = match outcome {
                        Err(err) => err.to_string(),
                        Ok(_) => "signer returned no bytes".to_string(),
                    };
                    transition(self.state(), Event::SignFailed)?;
                    warn!(
                        access_key = %self.access_key,
                        error = %reason,
                        "signing failed, document stays ENCODED"
                    );
                    return Err(ComprobanteError::Signing(reason));
                }
            }
        }
        self.signed_bytes().ok_or_else(|| self.state_error("sign"))
    }

    /// Send the signed document to the reception service.
    ///
    /// Transport failures are retried per the retry policy; when they run
    /// out the submission stays SIGNED. Once an acknowledgment is on record
    /// it is returned without contacting the authority again.
    pub async fn submit<A>(&mut self, authority: &A) -> Result<&ReceptionResult>
    where
        A: Authority + ?Sized,
    {
        if let Stage::Signed(artifacts) = &self.stage {
            let signed = artifacts.signed.as_slice();
            let ack = retry_transport(&self.retry, "receive", || authority.receive(signed)).await?;

            let reception = ReceptionResult {
                status: ack.status,
                messages: ack.messages,
                received_at: Utc::now(),
            };
            let accepted = reception.is_received();
            let events = if accepted {
                [Event::Send, Event::ReceptionAccepted]
            } else {
                [Event::Send, Event::ReceptionReturned]
            };
            self.advance(&events, |stage| match stage {
                Stage::Signed(signed) => {
                    let artifacts = ReceivedArtifacts { signed, reception };
                    if accepted {
                        Stage::Received(artifacts)
                    } else {
                        Stage::Returned(artifacts)
                    }
                }
                other => other,
            })?;
        }
        self.reception().ok_or_else(|| self.state_error("submit"))
    }

    /// Ask the authorization service once for a decision.
    ///
    /// A pending answer leaves the submission RECEIVED. Terminal answers
    /// are cached and replayed on later calls.
    pub async fn check_authorization<A>(&mut self, authority: &A) -> Result<AuthorizationOutcome>
    where
        A: Authority + ?Sized,
    {
        match &self.stage {
            Stage::Draft | Stage::Encoded(_) | Stage::Signed(_) => {
                return Err(self.state_error("check authorization of"));
            }
            Stage::Returned(artifacts) => {
                return Err(ComprobanteError::AuthorityRejection {
                    stage: RejectionStage::Reception,
                    messages: artifacts.reception.messages.clone(),
                });
            }
            Stage::Authorized(_, authorization) => {
                return Ok(AuthorizationOutcome::Authorized(authorization.clone()));
            }
            Stage::Rejected(_, messages) => {
                return Ok(AuthorizationOutcome::Rejected(messages.clone()));
            }
            Stage::Received(_) => {}
        }

        let key = &self.access_key;
        let response =
            retry_transport(&self.retry, "authorization", || authority.authorization(key)).await?;

        match response.verdict() {
            AuthorizationVerdict::Pending => {
                transition(self.state(), Event::AuthorizationPending)?;
                debug!(access_key = %self.access_key, "authorization still pending");
                Ok(AuthorizationOutcome::Pending)
            }
            AuthorizationVerdict::Authorized => {
                let authorization = Authorization {
                    number: response
                        .authorization_number
                        .unwrap_or_else(|| self.access_key.to_string()),
                    authorized_at: response.authorized_at.unwrap_or_else(Utc::now),
                    messages: response.messages,
                };
                let outcome = AuthorizationOutcome::Authorized(authorization.clone());
                self.advance(&[Event::Authorized], |stage| match stage {
                    Stage::Received(artifacts) => Stage::Authorized(artifacts, authorization),
                    other => other,
                })?;
                Ok(outcome)
            }
            AuthorizationVerdict::Rejected => {
                let messages = response.messages;
                let outcome = AuthorizationOutcome::Rejected(messages.clone());
                self.advance(&[Event::AuthorizationRejected], |stage| match stage {
                    Stage::Received(artifacts) => Stage::Rejected(artifacts, messages),
                    other => other,
                })?;
                Ok(outcome)
            }
        }
    }

    /// Poll [`check_authorization`](Self::check_authorization) until a
    /// decision arrives or the poll timeout runs out.
    ///
    /// On timeout the outcome is `Pending` and the submission stays
    /// RECEIVED; a timeout never implies rejection.
    pub async fn await_authorization<A>(&mut self, authority: &A) -> Result<AuthorizationOutcome>
    where
        A: Authority + ?Sized,
    {
        let deadline = Instant::now() + self.poll.timeout;
        let interval = self.poll.interval;

        loop {
            let outcome = match timeout_at(deadline, self.check_authorization(authority)).await {
                Ok(outcome) => outcome?,
                Err(_) => break,
            };
            if !outcome.is_pending() {
                return Ok(outcome);
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            sleep(interval.min(deadline - now)).await;
        }

        info!(
            access_key = %self.access_key,
            timeout_ms = self.poll.timeout.as_millis() as u64,
            "authorization still pending after poll timeout"
        );
        Ok(AuthorizationOutcome::Pending)
    }

    pub fn snapshot(&self) -> SubmissionSnapshot {
        SubmissionSnapshot {
            access_key: self.access_key.clone(),
            document_number: self.document.identity.document_number(),
            identity: self.document.identity.clone(),
            totals: self.document.totals.clone(),
            state: self.state(),
            encoded_xml: self.encoded().map(|e| e.xml.clone()),
            reception: self.reception().cloned(),
            authorization: self.authorization().cloned(),
            rejection: self.stage.rejection().map(<[_]>::to_vec).unwrap_or_default(),
            history: self.history.clone(),
        }
    }

    fn state_error(&self, operation: &'static str) -> ComprobanteError {
        ComprobanteError::State {
            state: self.state().to_string(),
            operation,
        }
    }

    /// Apply `events` in order, then swap in the next stage.
    fn advance(&mut self, events: &[Event], next: impl FnOnce(Stage) -> Stage) -> Result<()> {
        let mut steps = Vec::with_capacity(events.len());
        let mut state = self.state();
        for event in events {
            let to = transition(state, *event)?;
            steps.push((state, to));
            state = to;
        }

        let current = std::mem::replace(&mut self.stage, Stage::Draft);
        self.stage = next(current);

        let at = Utc::now();
        for (from, to) in steps {
            info!(
                access_key = %self.access_key,
                from = %from,
                to = %to,
                "lifecycle transition"
            );
            self.history.push(TransitionRecord { from, to, at });
        }
        Ok(())
    }
}
