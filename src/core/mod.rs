//! Core document types, access keys, tax aggregation and numbering.
//!
//! Everything in this module is synchronous and free of shared mutable
//! state, so it can be called from any number of threads at once.

mod access_key;
mod builder;
mod checksum;
pub(crate) mod error;
mod numbering;
mod totals;
mod types;
mod validation;

pub use access_key::*;
pub use builder::*;
pub use checksum::mod11_check_digit;
pub use error::{AuthorityMessage, ComprobanteError, RejectionStage, ValidationError};
pub use numbering::*;
pub use totals::aggregate;
pub use types::*;
pub use validation::*;
