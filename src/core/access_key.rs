use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::checksum::mod11_check_digit;
use super::error::{ComprobanteError, Result};
use super::types::{DocumentIdentity, DocumentType, EmissionType, Environment};

/// Length of the access key payload (everything except the check digit).
pub const PAYLOAD_LEN: usize = 48;
/// Length of the full access key.
pub const ACCESS_KEY_LEN: usize = 49;

/// Identity fields that feed the access key. Widths are validated, never padded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyFields {
    pub issue_date: NaiveDate,
    pub document_type: DocumentType,
    pub issuer_ruc: String,
    pub environment: Environment,
    pub establishment: String,
    pub emission_point: String,
    pub sequential: String,
    pub numeric_code: String,
    pub emission_type: EmissionType,
}

impl KeyFields {
    fn validate(&self) -> Result<()> {
        require_digits("issuer_ruc", &self.issuer_ruc, 13)?;
        require_digits("establishment", &self.establishment, 3)?;
        require_digits("emission_point", &self.emission_point, 3)?;
        require_digits("sequential", &self.sequential, 9)?;
        require_digits("numeric_code", &self.numeric_code, 8)?;
        Ok(())
    }

    /// The 48-digit payload in schema order.
    fn payload(&self) -> String {
        let mut s = String::with_capacity(PAYLOAD_LEN);
        s.push_str(&self.issue_date.format("%d%m%Y").to_string());
        s.push_str(self.document_type.code());
        s.push_str(&self.issuer_ruc);
        s.push_str(self.environment.code());
        s.push_str(&self.establishment);
        s.push_str(&self.emission_point);
        s.push_str(&self.sequential);
        s.push_str(&self.numeric_code);
        s.push_str(self.emission_type.code());
        s
    }
}

fn require_digits(field: &str, value: &str, width: usize) -> Result<()> {
    if value.len() != width || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ComprobanteError::Validation(format!(
            "{field} must be exactly {width} digits, got '{value}'"
        )));
    }
    Ok(())
}

/// Validate the key fields and compute the check digit.
///
/// Identical inputs always yield identical identities; nothing but the
/// caller-supplied fields feeds the key.
pub fn generate_access_key(fields: &KeyFields) -> Result<DocumentIdentity> {
    fields.validate()?;
    let payload = fields.payload();
    if payload.len() != PAYLOAD_LEN {
        // Only reachable with a year outside 1000..=9999.
        return Err(ComprobanteError::Validation(format!(
            "access key payload must be {PAYLOAD_LEN} digits, got {}",
            payload.len()
        )));
    }
    let check_digit = mod11_check_digit(&payload)?;

    Ok(DocumentIdentity {
        issue_date: fields.issue_date,
        document_type: fields.document_type,
        issuer_ruc: fields.issuer_ruc.clone(),
        environment: fields.environment,
        establishment: fields.establishment.clone(),
        emission_point: fields.emission_point.clone(),
        sequential: fields.sequential.clone(),
        numeric_code: fields.numeric_code.clone(),
        emission_type: fields.emission_type,
        check_digit,
    })
}

/// A validated 49-digit access key (clave de acceso).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AccessKey(String);

impl AccessKey {
    pub(crate) fn from_identity(identity: &DocumentIdentity) -> Self {
        let mut s = String::with_capacity(ACCESS_KEY_LEN);
        s.push_str(&identity.issue_date.format("%d%m%Y").to_string());
        s.push_str(identity.document_type.code());
        s.push_str(&identity.issuer_ruc);
        s.push_str(identity.environment.code());
        s.push_str(&identity.establishment);
        s.push_str(&identity.emission_point);
        s.push_str(&identity.sequential);
        s.push_str(&identity.numeric_code);
        s.push_str(identity.emission_type.code());
        s.push(char::from(b'0' + identity.check_digit));
        Self(s)
    }

    /// Parse and verify an access key, including its check digit.
    pub fn parse(key: &str) -> Result<Self> {
        Self::decompose(key)?;
        Ok(Self(key.to_string()))
    }

    /// Split a key back into its identity fields.
    pub fn decompose(key: &str) -> Result<DocumentIdentity> {
        if key.len() != ACCESS_KEY_LEN || !key.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ComprobanteError::Validation(format!(
                "access key must be {ACCESS_KEY_LEN} digits, got '{key}'"
            )));
        }
        let (payload, check) = key.split_at(PAYLOAD_LEN);
        let expected = mod11_check_digit(payload)?;
        let check_digit = check.as_bytes()[0] - b'0';
        if check_digit != expected {
            return Err(ComprobanteError::Validation(format!(
                "access key check digit is {check_digit}, expected {expected}"
            )));
        }

        let issue_date = NaiveDate::parse_from_str(&key[0..8], "%d%m%Y").map_err(|e| {
            ComprobanteError::Validation(format!("access key date '{}': {e}", &key[0..8]))
        })?;
        let document_type = DocumentType::from_code(&key[8..10]).ok_or_else(|| {
            ComprobanteError::Validation(format!("unknown document type '{}'", &key[8..10]))
        })?;
        let environment = Environment::from_code(&key[23..24]).ok_or_else(|| {
            ComprobanteError::Validation(format!("unknown environment '{}'", &key[23..24]))
        })?;
        let emission_type = EmissionType::from_code(&key[47..48]).ok_or_else(|| {
            ComprobanteError::Validation(format!("unknown emission type '{}'", &key[47..48]))
        })?;

        Ok(DocumentIdentity {
            issue_date,
            document_type,
            issuer_ruc: key[10..23].to_string(),
            environment,
            establishment: key[24..27].to_string(),
            emission_point: key[27..30].to_string(),
            sequential: key[30..39].to_string(),
            numeric_code: key[39..47].to_string(),
            emission_type,
            check_digit,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccessKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for AccessKey {
    type Error = ComprobanteError;

    fn try_from(value: String) -> Result<Self> {
        Self::decompose(&value)?;
        Ok(Self(value))
    }
}

impl From<AccessKey> for String {
    fn from(key: AccessKey) -> Self {
        key.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> KeyFields {
        KeyFields {
            issue_date: NaiveDate::from_ymd_opt(2023, 11, 15).unwrap(),
            document_type: DocumentType::Invoice,
            issuer_ruc: "1790012345001".into(),
            environment: Environment::Test,
            establishment: "001".into(),
            emission_point: "001".into(),
            sequential: "000000001".into(),
            numeric_code: "12345678".into(),
            emission_type: EmissionType::Normal,
        }
    }

    #[test]
    fn generates_known_key() {
        let id = generate_access_key(&fields()).unwrap();
        assert_eq!(id.check_digit, 1);
        assert_eq!(
            id.access_key().as_str(),
            "1511202301179001234500110010010000000011234567811"
        );
        assert_eq!(id.access_key().as_str().len(), ACCESS_KEY_LEN);
    }

    #[test]
    fn generation_is_deterministic() {
        let a = generate_access_key(&fields()).unwrap();
        let b = generate_access_key(&fields()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.access_key(), b.access_key());
    }

    #[test]
    fn second_vector() {
        let f = KeyFields {
            issue_date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            environment: Environment::Production,
            establishment: "002".into(),
            emission_point: "010".into(),
            sequential: "000000042".into(),
            numeric_code: "87654321".into(),
            ..fields()
        };
        let key = generate_access_key(&f).unwrap().access_key();
        assert_eq!(key.as_str(), "0201202401179001234500120020100000000428765432115");
    }

    #[test]
    fn rejects_unpadded_fields() {
        let cases: Vec<KeyFields> = vec![
            KeyFields { establishment: "1".into(), ..fields() },
            KeyFields { emission_point: "0001".into(), ..fields() },
            KeyFields { sequential: "1".into(), ..fields() },
            KeyFields { numeric_code: "1234567".into(), ..fields() },
            KeyFields { issuer_ruc: "179001234500".into(), ..fields() },
            KeyFields { issuer_ruc: "17900123450AB".into(), ..fields() },
        ];
        for f in cases {
            assert!(matches!(
                generate_access_key(&f),
                Err(ComprobanteError::Validation(_))
            ));
        }
    }

    #[test]
    fn parse_round_trips_identity() {
        let id = generate_access_key(&fields()).unwrap();
        let back = AccessKey::decompose(id.access_key().as_str()).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_rejects_wrong_check_digit() {
        let err = AccessKey::parse("1511202301179001234500110010010000000011234567812").unwrap_err();
        assert!(err.to_string().contains("check digit"));
        assert!(AccessKey::parse("123").is_err());
    }

    #[test]
    fn serde_validates() {
        let key: AccessKey =
            serde_json::from_str("\"1511202301179001234500110010010000000011234567811\"").unwrap();
        assert_eq!(key.as_str().len(), 49);
        assert!(serde_json::from_str::<AccessKey>("\"1511\"").is_err());
    }
}
