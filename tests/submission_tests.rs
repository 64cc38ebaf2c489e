#![cfg(feature = "sri")]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use comprobante::core::*;
use comprobante::sri::*;
use rust_decimal_macros::dec;

fn issuer() -> Issuer {
    Issuer {
        ruc: "1790012345001".into(),
        legal_name: "TRONCALINN S.A.".into(),
        trade_name: Some("TRONCALINN".into()),
        head_office_address: "Av. Principal 123, Quito".into(),
        establishment_address: None,
        special_taxpayer: None,
        keeps_accounts: true,
        establishment: "001".into(),
        emission_point: "001".into(),
        environment: Environment::Test,
    }
}

fn document(sequential: &str) -> Document {
    let issuer = issuer();
    DocumentBuilder::new(&issuer, NaiveDate::from_ymd_opt(2023, 11, 15).unwrap())
        .sequential(sequential)
        .numeric_code("12345678")
        .customer(Customer::final_consumer())
        .add_line(LineItemBuilder::new("HAB-001", "Habitación doble", dec!(2), dec!(80)).build())
        .build()
        .unwrap()
}

// ---------------------------------------------------------------------------
// Scripted collaborators
// ---------------------------------------------------------------------------

#[derive(Default)]
struct ScriptedSigner {
    failures: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedSigner {
    fn failing_once(reason: &str) -> Self {
        let signer = Self::default();
        signer.failures.lock().unwrap().push_back(reason.into());
        signer
    }
}

#[async_trait]
impl Signer for ScriptedSigner {
    async fn sign(&self, unsigned: &[u8]) -> Result<Vec<u8>, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failure = self.failures.lock().unwrap().pop_front();
        match failure {
            Some(reason) => Err(reason.into()),
            None => Ok([b"<!-- signed -->".as_slice(), unsigned].concat()),
        }
    }
}

/// Answers from a script; once the script runs out, receptions succeed and
/// authorizations stay pending.
#[derive(Default)]
struct ScriptedAuthority {
    receptions: Mutex<VecDeque<Result<ReceptionAck, String>>>,
    authorizations: Mutex<VecDeque<Result<AuthorizationResponse, String>>>,
    receive_calls: AtomicUsize,
    authorization_calls: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedAuthority {
    fn reception(self, answer: Result<ReceptionAck, &str>) -> Self {
        self.receptions
            .lock()
            .unwrap()
            .push_back(answer.map_err(str::to_string));
        self
    }

    fn authorization(self, answer: Result<AuthorizationResponse, &str>) -> Self {
        self.authorizations
            .lock()
            .unwrap()
            .push_back(answer.map_err(str::to_string));
        self
    }

    fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    fn authorization_calls(&self) -> usize {
        self.authorization_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Authority for ScriptedAuthority {
    async fn receive(&self, signed: &[u8]) -> Result<ReceptionAck, CollaboratorError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        assert!(signed.starts_with(b"<!-- signed -->"));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.receptions.lock().unwrap().pop_front();
        match next {
            Some(Ok(ack)) => Ok(ack),
            Some(Err(e)) => Err(e.into()),
            None => Ok(ReceptionAck::received()),
        }
    }

    async fn authorization(
        &self,
        _key: &AccessKey,
    ) -> Result<AuthorizationResponse, CollaboratorError> {
        self.authorization_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.authorizations.lock().unwrap().pop_front();
        match next {
            Some(Ok(response)) => Ok(response),
            Some(Err(e)) => Err(e.into()),
            None => Ok(AuthorizationResponse::pending()),
        }
    }
}

fn authorized_at() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 11, 15, 14, 30, 0).unwrap()
}

async fn received(authority: &ScriptedAuthority) -> Submission {
    let mut submission = Submission::new(document("000000001"));
    submission.encode().unwrap();
    submission.sign(&ScriptedSigner::default()).await.unwrap();
    submission.submit(authority).await.unwrap();
    submission
}

// ---------------------------------------------------------------------------
// Happy path
// ---------------------------------------------------------------------------

#[tokio::test]
async fn full_lifecycle_to_authorized() {
    let authority = ScriptedAuthority::default().authorization(Ok(
        AuthorizationResponse::authorized(
            "1511202301179001234500110010010000000011234567811",
            authorized_at(),
        ),
    ));
    let signer = ScriptedSigner::default();
    let mut submission = Submission::new(document("000000001"));
    assert_eq!(submission.state(), LifecycleState::Draft);

    let encoded = submission.encode().unwrap().clone();
    assert_eq!(submission.state(), LifecycleState::Encoded);
    assert!(encoded.as_str().contains("<claveAcceso>"));

    let signed = submission.sign(&signer).await.unwrap().to_vec();
    assert!(signed.ends_with(encoded.as_bytes()));
    assert_eq!(submission.state(), LifecycleState::Signed);

    let reception = submission.submit(&authority).await.unwrap().clone();
    assert!(reception.is_received());
    assert_eq!(submission.state(), LifecycleState::Received);

    let outcome = submission.check_authorization(&authority).await.unwrap();
    match outcome {
        AuthorizationOutcome::Authorized(auth) => {
            assert_eq!(auth.authorized_at, authorized_at());
            assert_eq!(auth.number.len(), 49);
        }
        other => panic!("expected authorization, got {other:?}"),
    }
    assert_eq!(submission.state(), LifecycleState::Authorized);

    let path: Vec<_> = submission
        .history()
        .iter()
        .map(|t| (t.from, t.to))
        .collect();
    assert_eq!(
        path,
        vec![
            (LifecycleState::Draft, LifecycleState::Encoded),
            (LifecycleState::Encoded, LifecycleState::Signed),
            (LifecycleState::Signed, LifecycleState::Sent),
            (LifecycleState::Sent, LifecycleState::Received),
            (LifecycleState::Received, LifecycleState::Authorized),
        ]
    );
}

#[tokio::test]
async fn cached_results_are_replayed() {
    let authority = ScriptedAuthority::default()
        .authorization(Ok(AuthorizationResponse::authorized("AUT-1", authorized_at())));
    let signer = ScriptedSigner::default();
    let mut submission = Submission::new(document("000000001"));

    let first = submission.encode().unwrap().clone();
    submission.sign(&signer).await.unwrap();
    submission.submit(&authority).await.unwrap();
    submission.check_authorization(&authority).await.unwrap();

    assert_eq!(submission.encode().unwrap(), &first);
    submission.sign(&signer).await.unwrap();
    submission.submit(&authority).await.unwrap();
    let replay = submission.check_authorization(&authority).await.unwrap();

    assert!(matches!(replay, AuthorizationOutcome::Authorized(a) if a.number == "AUT-1"));
    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(authority.receive_calls(), 1);
    assert_eq!(authority.authorization_calls(), 1);
    assert_eq!(submission.history().len(), 5);
}

#[tokio::test]
async fn submit_twice_sends_once() {
    let authority = ScriptedAuthority::default();
    let mut submission = received(&authority).await;
    submission.submit(&authority).await.unwrap();
    submission.submit(&authority).await.unwrap();
    assert_eq!(authority.receive_calls(), 1);
    assert_eq!(submission.state(), LifecycleState::Received);
}

// ---------------------------------------------------------------------------
// Preconditions
// ---------------------------------------------------------------------------

#[tokio::test]
async fn operations_out_of_order_fail() {
    let authority = ScriptedAuthority::default();
    let signer = ScriptedSigner::default();
    let mut submission = Submission::new(document("000000001"));

    let err = submission.sign(&signer).await.unwrap_err();
    assert!(matches!(err, ComprobanteError::State { .. }));
    assert!(matches!(
        submission.submit(&authority).await,
        Err(ComprobanteError::State { .. })
    ));
    assert!(matches!(
        submission.check_authorization(&authority).await,
        Err(ComprobanteError::State { .. })
    ));

    submission.encode().unwrap();
    assert!(matches!(
        submission.submit(&authority).await,
        Err(ComprobanteError::State { .. })
    ));
    assert!(submission.check_authorization(&authority).await.is_err());

    submission.sign(&signer).await.unwrap();
    let err = submission.check_authorization(&authority).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "cannot check authorization of a document in state SIGNED"
    );

    assert_eq!(signer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(authority.receive_calls(), 0);
    assert_eq!(authority.authorization_calls(), 0);
}

#[tokio::test]
async fn invalid_document_does_not_leave_draft() {
    let mut doc = document("000000001");
    doc.issuer.legal_name.clear();
    let mut submission = Submission::new(doc);
    assert!(matches!(
        submission.encode(),
        Err(ComprobanteError::Encoding(_))
    ));
    assert_eq!(submission.state(), LifecycleState::Draft);
    assert!(submission.history().is_empty());
}

// ---------------------------------------------------------------------------
// Signing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn signing_failure_is_retryable() {
    let signer = ScriptedSigner::failing_once("certificate locked");
    let mut submission = Submission::new(document("000000001"));
    submission.encode().unwrap();

    let err = submission.sign(&signer).await.unwrap_err();
    assert!(matches!(err, ComprobanteError::Signing(ref m) if m.contains("certificate locked")));
    assert_eq!(submission.state(), LifecycleState::Encoded);
    assert!(submission.signed_bytes().is_none());

    submission.sign(&signer).await.unwrap();
    assert_eq!(submission.state(), LifecycleState::Signed);
    assert_eq!(signer.calls.load(Ordering::SeqCst), 2);
}

// ---------------------------------------------------------------------------
// Reception
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn transport_failures_are_retried() {
    let authority = ScriptedAuthority::default()
        .reception(Err("connection reset"))
        .reception(Err("503 Service Unavailable"))
        .reception(Ok(ReceptionAck::received()));
    let submission = received(&authority).await;
    assert_eq!(submission.state(), LifecycleState::Received);
    assert_eq!(authority.receive_calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_stay_signed() {
    let authority = ScriptedAuthority::default()
        .reception(Err("timeout"))
        .reception(Err("timeout"))
        .reception(Err("timeout"))
        .reception(Err("timeout"));
    let mut submission = Submission::new(document("000000001"));
    submission.encode().unwrap();
    submission.sign(&ScriptedSigner::default()).await.unwrap();

    let err = submission.submit(&authority).await.unwrap_err();
    assert!(matches!(err, ComprobanteError::Transport(_)));
    assert_eq!(submission.state(), LifecycleState::Signed);
    assert_eq!(authority.receive_calls(), 4);

    // script exhausted: the next attempt is accepted
    submission.submit(&authority).await.unwrap();
    assert_eq!(submission.state(), LifecycleState::Received);
}

#[tokio::test]
async fn returned_document_is_terminal() {
    let messages = vec![
        AuthorityMessage::error("35", "ARCHIVO NO CUMPLE ESTRUCTURA XML")
            .with_info("Elemento inesperado: totalImpuesto"),
    ];
    let authority =
        ScriptedAuthority::default().reception(Ok(ReceptionAck::returned(messages.clone())));
    let mut submission = Submission::new(document("000000001"));
    submission.encode().unwrap();
    submission.sign(&ScriptedSigner::default()).await.unwrap();

    let reception = submission.submit(&authority).await.unwrap();
    assert_eq!(reception.status, ReceptionStatus::Returned);
    assert_eq!(reception.messages, messages);
    assert_eq!(submission.state(), LifecycleState::Returned);

    let err = submission.check_authorization(&authority).await.unwrap_err();
    match err {
        ComprobanteError::AuthorityRejection { stage, messages: m } => {
            assert_eq!(stage, RejectionStage::Reception);
            assert_eq!(m, messages);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(authority.authorization_calls(), 0);

    let last = submission.history().last().unwrap();
    assert_eq!((last.from, last.to), (LifecycleState::Sent, LifecycleState::Returned));
}

#[tokio::test(start_paused = true)]
async fn cancelled_submit_leaves_state_untouched() {
    let authority = ScriptedAuthority {
        delay: Some(Duration::from_secs(30)),
        ..Default::default()
    };
    let mut submission = Submission::new(document("000000001"));
    submission.encode().unwrap();
    submission.sign(&ScriptedSigner::default()).await.unwrap();

    let attempt = tokio::time::timeout(Duration::from_secs(1), submission.submit(&authority)).await;
    assert!(attempt.is_err());
    assert_eq!(submission.state(), LifecycleState::Signed);
    assert_eq!(submission.history().len(), 2);
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

#[tokio::test]
async fn pending_checks_do_not_mutate() {
    let authority = ScriptedAuthority::default()
        .authorization(Ok(AuthorizationResponse::pending()))
        .authorization(Ok(AuthorizationResponse {
            status: Some("EN PROCESO".into()),
            ..Default::default()
        }));
    let mut submission = received(&authority).await;
    let before = submission.history().len();

    for _ in 0..3 {
        let outcome = submission.check_authorization(&authority).await.unwrap();
        assert!(outcome.is_pending());
        assert_eq!(submission.state(), LifecycleState::Received);
    }
    assert_eq!(submission.history().len(), before);
    assert_eq!(authority.authorization_calls(), 3);
}

#[tokio::test]
async fn not_authorized_is_rejected() {
    let messages = vec![AuthorityMessage::error("56", "ESTABLECIMIENTO CERRADO")];
    let authority = ScriptedAuthority::default()
        .authorization(Ok(AuthorizationResponse::not_authorized(messages.clone())));
    let mut submission = received(&authority).await;

    let outcome = submission.check_authorization(&authority).await.unwrap();
    assert_eq!(outcome, AuthorizationOutcome::Rejected(messages.clone()));
    assert_eq!(submission.state(), LifecycleState::Rejected);

    let replay = submission.check_authorization(&authority).await.unwrap();
    assert_eq!(replay, AuthorizationOutcome::Rejected(messages));
    assert_eq!(authority.authorization_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn await_authorization_polls_until_decided() {
    let authority = ScriptedAuthority::default()
        .authorization(Ok(AuthorizationResponse::pending()))
        .authorization(Err("connection refused"))
        .authorization(Ok(AuthorizationResponse::pending()))
        .authorization(Ok(AuthorizationResponse::authorized("AUT-9", authorized_at())));
    let mut submission = received(&authority).await;

    let outcome = submission.await_authorization(&authority).await.unwrap();
    assert!(matches!(outcome, AuthorizationOutcome::Authorized(ref a) if a.number == "AUT-9"));
    assert_eq!(submission.state(), LifecycleState::Authorized);
    assert_eq!(authority.authorization_calls(), 4);
}

#[tokio::test(start_paused = true)]
async fn await_authorization_times_out_as_pending() {
    let authority = ScriptedAuthority::default();
    let mut submission = Submission::with_policies(
        document("000000001"),
        RetryPolicy::default(),
        PollPolicy {
            interval: Duration::from_secs(1),
            timeout: Duration::from_secs(5),
        },
    );
    submission.encode().unwrap();
    submission.sign(&ScriptedSigner::default()).await.unwrap();
    submission.submit(&authority).await.unwrap();

    let started = tokio::time::Instant::now();
    let outcome = submission.await_authorization(&authority).await.unwrap();
    assert_eq!(outcome, AuthorizationOutcome::Pending);
    assert_eq!(submission.state(), LifecycleState::Received);
    assert!(authority.authorization_calls() >= 5);
    assert!(started.elapsed() >= Duration::from_secs(5));
}

// ---------------------------------------------------------------------------
// Snapshot and desk
// ---------------------------------------------------------------------------

#[tokio::test]
async fn snapshot_serializes() {
    let authority = ScriptedAuthority::default()
        .authorization(Ok(AuthorizationResponse::authorized("AUT-1", authorized_at())));
    let mut submission = received(&authority).await;
    submission.check_authorization(&authority).await.unwrap();

    let snapshot = submission.snapshot();
    assert_eq!(snapshot.state, LifecycleState::Authorized);
    assert_eq!(snapshot.document_number, "001-001-000000001");
    assert_eq!(snapshot.totals.grand_total, dec!(184.00));
    assert!(snapshot.encoded_xml.as_deref().unwrap().contains("<factura"));
    assert_eq!(snapshot.authorization.as_ref().unwrap().number, "AUT-1");

    let json = snapshot.to_json().unwrap();
    assert!(json.contains("\"AUTHORIZED\""));
    let back: SubmissionSnapshot = serde_json::from_str(&json).unwrap();
    assert_eq!(back, snapshot);
}

#[tokio::test]
async fn desk_is_idempotent_by_access_key() {
    let desk = SubmissionDesk::new();
    let a = desk.open(document("000000001"));
    let b = desk.open(document("000000001"));
    let c = desk.open(document("000000002"));
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert_eq!(desk.len(), 2);

    let key = a.lock().await.access_key().clone();
    assert!(desk.get(&key).is_some());
    assert!(desk.remove(&key).is_some());
    assert_eq!(desk.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn desk_runs_submissions_in_parallel() {
    let desk = SubmissionDesk::new();
    let authority = Arc::new(ScriptedAuthority::default());
    let signer = Arc::new(ScriptedSigner::default());

    let mut tasks = Vec::new();
    for n in 1..=8u32 {
        let handle = desk.open(document(&format!("{n:09}")));
        let authority = Arc::clone(&authority);
        let signer = Arc::clone(&signer);
        tasks.push(tokio::spawn(async move {
            let mut submission = handle.lock().await;
            submission.encode()?;
            submission.sign(signer.as_ref()).await?;
            submission.submit(authority.as_ref()).await?;
            Ok::<_, ComprobanteError>(submission.state())
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), LifecycleState::Received);
    }

    assert_eq!(authority.receive_calls(), 8);
    let snapshots = desk.snapshots().await;
    assert_eq!(snapshots.len(), 8);
    assert!(snapshots.windows(2).all(|w| w[0].access_key < w[1].access_key));
}
