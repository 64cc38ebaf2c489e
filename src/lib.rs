//! # comprobante
//!
//! Core of an Ecuadorian SRI electronic invoicing system: the 49-digit
//! access key, IVA subtotal aggregation, the canonical *factura* XML
//! (schema 2.1.0), and the reception/authorization submission lifecycle.
//!
//! All monetary values use [`rust_decimal::Decimal`] — never floating point.
//!
//! ## Quick Start
//!
//! ```rust
//! use chrono::NaiveDate;
//! use comprobante::core::*;
//! use rust_decimal_macros::dec;
//!
//! let issuer = Issuer {
//!     ruc: "1790012345001".into(),
//!     legal_name: "TRONCALINN S.A.".into(),
//!     trade_name: Some("TRONCALINN".into()),
//!     head_office_address: "Av. Principal 123, Quito".into(),
//!     establishment_address: None,
//!     special_taxpayer: None,
//!     keeps_accounts: true,
//!     establishment: "001".into(),
//!     emission_point: "001".into(),
//!     environment: Environment::Test,
//! };
//! assert!(validate_issuer(&issuer).is_empty());
//!
//! let doc = DocumentBuilder::new(&issuer, NaiveDate::from_ymd_opt(2023, 11, 15).unwrap())
//!     .sequential("000000001")
//!     .numeric_code("12345678")
//!     .customer(Customer::final_consumer())
//!     .add_line(LineItemBuilder::new("HAB-001", "Habitación doble", dec!(2), dec!(80))
//!         .tax_rate(TaxRate::Fifteen).build())
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(doc.access_key().as_str(), "1511202301179001234500110010010000000011234567811");
//! assert_eq!(doc.totals.grand_total, dec!(184.00));
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Description |
//! |---------|-------------|
//! | `core` (default) | Types, checksum, access key, totals, numbering, boundary validation |
//! | `xml` | Factura 2.1.0 XML encoding and decoding |
//! | `sri` | Submission state machine, signer/authority traits, retry and polling |
//! | `settings` | Issuer and submission configuration loading |
//! | `all` | Everything |

#[cfg(feature = "core")]
pub mod core;

#[cfg(feature = "xml")]
pub mod factura;

#[cfg(feature = "sri")]
pub mod sri;

#[cfg(feature = "settings")]
pub mod settings;

// Re-export core types at crate root for convenience
#[cfg(feature = "core")]
pub use crate::core::*;
