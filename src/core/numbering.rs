use std::collections::HashMap;

use super::error::{ComprobanteError, Result};
use super::types::Issuer;

/// Highest sequential number an emission point can issue.
pub const MAX_SEQUENTIAL: u64 = 999_999_999;

/// Source of sequential numbers for one (RUC, establishment, emission point).
///
/// The system of record for sequentials lives outside this crate; this is
/// the interface the core expects from it.
pub trait SequenceSource {
    /// Allocate the next 9-digit, zero-padded sequential number.
    fn next_sequential(&mut self, issuer: &Issuer) -> Result<String>;
}

/// Gapless per-emission-point counter held in memory.
///
/// Numbers are formatted as 9 zero-padded digits, e.g. "000000001".
#[derive(Debug, Clone, Default)]
pub struct InMemorySequences {
    next: HashMap<(String, String, String), u64>,
}

impl InMemorySequences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue an emission point's sequence from a given number.
    pub fn starting_at(
        mut self,
        ruc: impl Into<String>,
        establishment: impl Into<String>,
        emission_point: impl Into<String>,
        next_number: u64,
    ) -> Self {
        self.next.insert(
            (ruc.into(), establishment.into(), emission_point.into()),
            next_number,
        );
        self
    }

    /// Preview the next number without consuming it.
    pub fn peek(&self, issuer: &Issuer) -> Option<String> {
        let n = self.next.get(&key(issuer)).copied().unwrap_or(1);
        (n <= MAX_SEQUENTIAL).then(|| format_sequential(n))
    }
}

fn key(issuer: &Issuer) -> (String, String, String) {
    (
        issuer.ruc.clone(),
        issuer.establishment.clone(),
        issuer.emission_point.clone(),
    )
}

/// Zero-pad a sequential number to 9 digits.
pub fn format_sequential(n: u64) -> String {
    format!("{n:0>9}")
}

impl SequenceSource for InMemorySequences {
    fn next_sequential(&mut self, issuer: &Issuer) -> Result<String> {
        let slot = self.next.entry(key(issuer)).or_insert(1);
        let n = *slot;
        if n == 0 || n > MAX_SEQUENTIAL {
            return Err(ComprobanteError::Numbering(format!(
                "sequence for {}-{} of {} is exhausted",
                issuer.establishment, issuer.emission_point, issuer.ruc
            )));
        }
        *slot += 1;
        Ok(format_sequential(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Environment;

    fn issuer(point: &str) -> Issuer {
        Issuer {
            ruc: "1790012345001".into(),
            legal_name: "ACME".into(),
            trade_name: None,
            head_office_address: "Quito".into(),
            establishment_address: None,
            special_taxpayer: None,
            keeps_accounts: false,
            establishment: "001".into(),
            emission_point: point.into(),
            environment: Environment::Test,
        }
    }

    #[test]
    fn sequential_numbering() {
        let mut seq = InMemorySequences::new();
        assert_eq!(seq.next_sequential(&issuer("001")).unwrap(), "000000001");
        assert_eq!(seq.next_sequential(&issuer("001")).unwrap(), "000000002");
    }

    #[test]
    fn emission_points_are_independent() {
        let mut seq = InMemorySequences::new();
        seq.next_sequential(&issuer("001")).unwrap();
        assert_eq!(seq.next_sequential(&issuer("002")).unwrap(), "000000001");
    }

    #[test]
    fn peek_does_not_consume() {
        let mut seq = InMemorySequences::new().starting_at("1790012345001", "001", "001", 42);
        assert_eq!(seq.peek(&issuer("001")).as_deref(), Some("000000042"));
        assert_eq!(seq.next_sequential(&issuer("001")).unwrap(), "000000042");
        assert_eq!(seq.peek(&issuer("001")).as_deref(), Some("000000043"));
    }

    #[test]
    fn exhausts_at_max() {
        let mut seq =
            InMemorySequences::new().starting_at("1790012345001", "001", "001", MAX_SEQUENTIAL);
        assert_eq!(seq.next_sequential(&issuer("001")).unwrap(), "999999999");
        assert!(seq.peek(&issuer("001")).is_none());
        assert!(matches!(
            seq.next_sequential(&issuer("001")),
            Err(ComprobanteError::Numbering(_))
        ));
    }
}
