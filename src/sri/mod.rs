//! Submission lifecycle against the SRI reception and authorization services.
//!
//! A [`Submission`] owns one [`Document`](crate::core::Document) and moves it
//! through `DRAFT → ENCODED → SIGNED → SENT → RECEIVED → AUTHORIZED`, with
//! `RETURNED` and `REJECTED` as terminal failures. Signing and the remote
//! services are reached through the [`Signer`] and [`Authority`] traits.
//!
//! ```no_run
//! # async fn run(
//! #     document: comprobante::core::Document,
//! #     signer: &dyn comprobante::sri::Signer,
//! #     authority: &dyn comprobante::sri::Authority,
//! # ) -> Result<(), comprobante::core::ComprobanteError> {
//! use comprobante::sri::{AuthorizationOutcome, Submission};
//!
//! let mut submission = Submission::new(document);
//! submission.encode()?;
//! submission.sign(signer).await?;
//! submission.submit(authority).await?;
//! match submission.await_authorization(authority).await? {
//!     AuthorizationOutcome::Authorized(auth) => println!("authorized: {}", auth.number),
//!     AuthorizationOutcome::Pending => println!("ask again later"),
//!     AuthorizationOutcome::Rejected(messages) => println!("rejected: {messages:?}"),
//! }
//! # Ok(())
//! # }
//! ```

mod collaborators;
mod desk;
mod retry;
mod state;
mod submission;

pub use collaborators::*;
pub use desk::{SharedSubmission, SubmissionDesk};
pub use retry::{PollPolicy, RetryPolicy, retry_transport};
pub use state::{Event, LifecycleState, transition};
pub use submission::{Submission, SubmissionSnapshot, TransitionRecord};
