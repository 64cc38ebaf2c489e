use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use comprobante::core::*;
use comprobante::sri::*;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

/// Wraps the unsigned XML in a marker instead of a real XAdES signature.
struct DemoSigner;

#[async_trait]
impl Signer for DemoSigner {
    async fn sign(&self, unsigned: &[u8]) -> Result<Vec<u8>, CollaboratorError> {
        Ok([b"<!-- signed -->\n".as_slice(), unsigned].concat())
    }
}

/// Drops the first reception call and keeps documents "EN PROCESO" for two polls.
#[derive(Default)]
struct DemoAuthority {
    receptions: AtomicUsize,
    polls: AtomicUsize,
}

#[async_trait]
impl Authority for DemoAuthority {
    async fn receive(&self, _signed: &[u8]) -> Result<ReceptionAck, CollaboratorError> {
        if self.receptions.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err("connection reset by peer".into());
        }
        Ok(ReceptionAck::received())
    }

    async fn authorization(&self, key: &AccessKey) -> Result<AuthorizationResponse, CollaboratorError> {
        if self.polls.fetch_add(1, Ordering::SeqCst) < 2 {
            return Ok(AuthorizationResponse::pending());
        }
        Ok(AuthorizationResponse::authorized(key.as_str(), Utc::now()))
    }
}

fn issuer() -> Issuer {
    Issuer {
        ruc: "1790012345001".into(),
        legal_name: "HOTEL TRONCAL S.A.".into(),
        trade_name: None,
        head_office_address: "Av. Amazonas N34-120, Quito".into(),
        establishment_address: None,
        special_taxpayer: None,
        keeps_accounts: true,
        establishment: "001".into(),
        emission_point: "001".into(),
        environment: Environment::Test,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let issuer = issuer();
    let mut sequences = InMemorySequences::new();
    let doc = DocumentBuilder::new(&issuer, NaiveDate::from_ymd_opt(2024, 3, 8).unwrap())
        .sequential(sequences.next_sequential(&issuer)?)
        .numeric_code("10293847")
        .customer(Customer::final_consumer())
        .add_line(LineItemBuilder::new("HAB", "Habitación simple", dec!(1), dec!(45)).build())
        .build()?;

    let desk = SubmissionDesk::with_policies(
        RetryPolicy {
            initial_backoff: Duration::from_millis(100),
            ..RetryPolicy::default()
        },
        PollPolicy {
            interval: Duration::from_millis(250),
            timeout: Duration::from_secs(5),
        },
    );
    let authority = DemoAuthority::default();

    let shared = desk.open(doc);
    let mut submission = shared.lock().await;
    submission.encode()?;
    submission.sign(&DemoSigner).await?;
    let reception = submission.submit(&authority).await?;
    println!("Reception: {}", reception.status.as_str());

    match submission.await_authorization(&authority).await? {
        AuthorizationOutcome::Authorized(auth) => {
            println!("Authorized: {} at {}", auth.number, auth.authorized_at)
        }
        AuthorizationOutcome::Pending => println!("Still pending, try again later"),
        AuthorizationOutcome::Rejected(messages) => {
            for m in messages {
                println!("Rejected: {m}");
            }
        }
    }

    println!("{}", submission.snapshot().to_json()?);
    Ok(())
}
