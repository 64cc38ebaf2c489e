//! Factura XML encoding and decoding (SRI schema 2.1.0).
//!
//! The encoder is canonical: the same [`Document`](crate::core::Document)
//! always produces byte-identical output, with a fixed element order,
//! two-space indentation, money at 2 fractional digits and quantities and
//! unit prices at 6.
//!
//! # Example
//!
//! ```no_run
//! use comprobante::core::*;
//! use comprobante::factura;
//!
//! let document: Document = todo!(); // build via DocumentBuilder
//! let encoded = factura::to_xml(&document).unwrap();
//! let decoded = factura::from_xml(encoded.as_str()).unwrap();
//! assert_eq!(decoded.access_key(), document.access_key());
//! ```

mod encode;
mod parse;
pub(crate) mod writer;

use serde::{Deserialize, Serialize};

use crate::core::AccessKey;

pub use encode::to_xml;
pub use parse::from_xml;
pub use writer::{format_money, format_precise};

/// Factura schema version written in the root `version` attribute.
pub const SCHEMA_VERSION: &str = "2.1.0";

/// `moneda` value; the authority only accepts US dollars.
pub const CURRENCY: &str = "DOLAR";

/// `campoAdicional` names filled from the customer record.
pub const RESERVED_FIELDS: [&str; 3] = ["Email", "Direccion", "Telefono"];

/// Canonical unsigned XML of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedDocument {
    pub access_key: AccessKey,
    pub xml: String,
}

impl EncodedDocument {
    pub fn schema_version(&self) -> &'static str {
        SCHEMA_VERSION
    }

    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.xml.as_bytes()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.xml.into_bytes()
    }
}
