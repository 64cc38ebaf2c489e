use super::error::ValidationError;
use super::types::*;

/// Province codes accepted in the first two digits of a cédula or RUC.
fn is_valid_province(code: u32) -> bool {
    (1..=24).contains(&code) || code == 30
}

fn all_digits(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

/// Validate issuer configuration at the boundary.
/// Returns all findings (not just the first).
pub fn validate_issuer(issuer: &Issuer) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if let Err(msg) = check_ruc(&issuer.ruc) {
        errors.push(ValidationError::with_rule("issuer.ruc", msg, "RUC"));
    }

    if issuer.legal_name.trim().is_empty() {
        errors.push(ValidationError::new(
            "issuer.legal_name",
            "razonSocial must not be empty",
        ));
    }
    if issuer.head_office_address.trim().is_empty() {
        errors.push(ValidationError::new(
            "issuer.head_office_address",
            "dirMatriz must not be empty",
        ));
    }

    if issuer.establishment.len() != 3 || !all_digits(&issuer.establishment) {
        errors.push(ValidationError::new(
            "issuer.establishment",
            "establishment code must be 3 digits",
        ));
    } else if issuer.establishment == "000" {
        errors.push(ValidationError::new(
            "issuer.establishment",
            "establishment code 000 is not assignable",
        ));
    }
    if issuer.emission_point.len() != 3 || !all_digits(&issuer.emission_point) {
        errors.push(ValidationError::new(
            "issuer.emission_point",
            "emission point code must be 3 digits",
        ));
    }

    if let Some(special) = &issuer.special_taxpayer {
        // Resolution numbers are 3 to 13 digits.
        if !(3..=13).contains(&special.len()) || !all_digits(special) {
            errors.push(ValidationError::new(
                "issuer.special_taxpayer",
                "contribuyenteEspecial must be 3 to 13 digits",
            ));
        }
    }

    errors
}

/// Validate buyer data at the boundary.
pub fn validate_customer(customer: &Customer) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let id = customer.identification.trim();

    let id_check = match customer.id_type {
        IdentificationType::Ruc => check_ruc(id),
        IdentificationType::Cedula => check_cedula(id),
        IdentificationType::FinalConsumer => {
            if id == FINAL_CONSUMER_ID {
                Ok(())
            } else {
                Err(format!("final consumer identification must be {FINAL_CONSUMER_ID}"))
            }
        }
        IdentificationType::Passport | IdentificationType::Foreign => {
            if id.is_empty() || id.len() > 20 {
                Err("identification must be 1 to 20 characters".into())
            } else {
                Ok(())
            }
        }
    };
    if let Err(msg) = id_check {
        errors.push(ValidationError::with_rule(
            "customer.identification",
            msg,
            format!("ID-{}", customer.id_type.code()),
        ));
    }

    if customer.name.trim().is_empty() {
        errors.push(ValidationError::new(
            "customer.name",
            "razonSocialComprador must not be empty",
        ));
    }

    if !customer.email.is_empty() && !looks_like_email(&customer.email) {
        errors.push(ValidationError::new(
            "customer.email",
            format!("'{}' is not a valid email address", customer.email),
        ));
    }

    errors
}

fn looks_like_email(s: &str) -> bool {
    match s.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !s.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// Structural RUC check: 13 digits, valid province, known taxpayer class
/// in the third digit, and an establishment suffix other than 000.
pub fn check_ruc(ruc: &str) -> Result<(), String> {
    if ruc.len() != 13 || !all_digits(ruc) {
        return Err(format!("RUC must be 13 digits, got '{ruc}'"));
    }
    let province: u32 = ruc[0..2].parse().unwrap_or(0);
    if !is_valid_province(province) {
        return Err(format!("RUC province code {:02} is invalid", province));
    }
    let class = ruc.as_bytes()[2] - b'0';
    match class {
        0..=5 => check_cedula(&ruc[..10])?,
        6 | 9 => {}
        _ => return Err(format!("RUC third digit {class} is not a taxpayer class")),
    }
    if &ruc[10..] == "000" {
        return Err("RUC establishment suffix must not be 000".into());
    }
    Ok(())
}

/// Cédula check: 10 digits, valid province, third digit below 6 and a
/// modulo-10 check digit with coefficients 2, 1, 2, 1, ….
pub fn check_cedula(cedula: &str) -> Result<(), String> {
    if cedula.len() != 10 || !all_digits(cedula) {
        return Err(format!("cédula must be 10 digits, got '{cedula}'"));
    }
    let digits: Vec<u32> = cedula.bytes().map(|b| u32::from(b - b'0')).collect();
    let province = digits[0] * 10 + digits[1];
    if !is_valid_province(province) {
        return Err(format!("cédula province code {province:02} is invalid"));
    }
    if digits[2] >= 6 {
        return Err("cédula third digit must be below 6".into());
    }

    let sum: u32 = digits[..9]
        .iter()
        .enumerate()
        .map(|(i, d)| {
            let v = if i % 2 == 0 { d * 2 } else { *d };
            if v > 9 { v - 9 } else { v }
        })
        .sum();
    let expected = (10 - sum % 10) % 10;
    if digits[9] != expected {
        return Err(format!(
            "cédula check digit is {}, expected {expected}",
            digits[9]
        ));
    }
    Ok(())
}

/// Check the internal arithmetic of a document's totals.
pub fn validate_arithmetic(document: &Document) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let totals = &document.totals;

    match totals.buckets.total_base() {
        Some(bucket_base) if bucket_base != totals.total_without_tax => {
            errors.push(ValidationError::new(
                "totals.total_without_tax",
                format!(
                    "totalSinImpuestos {} does not match sum of bucket bases {}",
                    totals.total_without_tax, bucket_base
                ),
            ));
        }
        Some(_) => {}
        None => errors.push(ValidationError::new(
            "totals.buckets",
            "sum of bucket bases overflows",
        )),
    }

    match totals.buckets.total_tax() {
        Some(bucket_tax) if bucket_tax != totals.total_tax => {
            errors.push(ValidationError::new(
                "totals.total_tax",
                format!(
                    "tax total {} does not match sum of bucket taxes {}",
                    totals.total_tax, bucket_tax
                ),
            ));
        }
        Some(_) => {}
        None => errors.push(ValidationError::new(
            "totals.buckets",
            "sum of bucket taxes overflows",
        )),
    }

    let expected = totals
        .total_without_tax
        .checked_add(totals.total_tax)
        .and_then(|sum| sum.checked_add(totals.tip));
    if expected != Some(totals.grand_total) {
        errors.push(ValidationError::new(
            "totals.grand_total",
            format!(
                "importeTotal {} does not match {} + {} + {}",
                totals.grand_total, totals.total_without_tax, totals.total_tax, totals.tip
            ),
        ));
    }

    for (i, line) in document.lines.iter().enumerate() {
        let Some(base) = line.checked_base().filter(|_| line.checked_tax().is_some()) else {
            errors.push(ValidationError::new(
                format!("lines[{i}]"),
                format!(
                    "amount overflows: {} x {} - {}",
                    line.quantity, line.unit_price, line.discount
                ),
            ));
            continue;
        };
        if totals.buckets.get(line.tax_rate) == BucketAmounts::default() && !base.is_zero() {
            errors.push(ValidationError::new(
                format!("lines[{i}].tax_rate"),
                format!(
                    "rate code {} has no subtotal although the line has a base",
                    line.tax_rate.code()
                ),
            ));
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

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

    #[test]
    fn valid_issuer_has_no_findings() {
        assert!(validate_issuer(&issuer()).is_empty());
    }

    #[test]
    fn issuer_findings_are_collected() {
        let bad = Issuer {
            ruc: "123".into(),
            legal_name: " ".into(),
            establishment: "1".into(),
            emission_point: "00a".into(),
            special_taxpayer: Some("12".into()),
            ..issuer()
        };
        let errors = validate_issuer(&bad);
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            [
                "issuer.ruc",
                "issuer.legal_name",
                "issuer.establishment",
                "issuer.emission_point",
                "issuer.special_taxpayer"
            ]
        );
    }

    #[test]
    fn cedula_check_digit() {
        assert!(check_cedula("1710034065").is_ok());
        assert!(check_cedula("0926687856").is_ok());
        assert!(check_cedula("1712345678").unwrap_err().contains("check digit"));
        assert!(check_cedula("9910034065").unwrap_err().contains("province"));
        assert!(check_cedula("17100340").is_err());
    }

    #[test]
    fn ruc_structure() {
        assert!(check_ruc("1790012345001").is_ok());
        // Natural person RUC = cédula + 001.
        assert!(check_ruc("1710034065001").is_ok());
        assert!(check_ruc("1712345678001").is_err());
        assert!(check_ruc("1790012345000").is_err());
        assert!(check_ruc("1770012345001").unwrap_err().contains("third digit"));
    }

    #[test]
    fn customer_identification_by_type() {
        let mut c = Customer {
            id_type: IdentificationType::Cedula,
            identification: "1710034065".into(),
            name: "Juan Pérez".into(),
            address: "Quito".into(),
            email: "juan@example.com".into(),
            phone: None,
        };
        assert!(validate_customer(&c).is_empty());

        c.identification = "1712345678".into();
        assert_eq!(validate_customer(&c)[0].rule.as_deref(), Some("ID-05"));

        assert!(validate_customer(&Customer::final_consumer()).is_empty());

        c.id_type = IdentificationType::Passport;
        c.identification = "AB123456".into();
        c.email = "not-an-email".into();
        let errors = validate_customer(&c);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "customer.email");
    }

    #[test]
    fn overflowing_amounts_are_findings() {
        use crate::core::{DocumentBuilder, LineItemBuilder};
        use rust_decimal::Decimal;
        use rust_decimal_macros::dec;

        let issuer = issuer();
        let mut doc = DocumentBuilder::new(&issuer, chrono::NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
            .sequential("000000001")
            .numeric_code("12345678")
            .customer(Customer::final_consumer())
            .add_line(LineItemBuilder::new("P1", "Item", dec!(1), dec!(10)).build())
            .build()
            .unwrap();
        assert!(validate_arithmetic(&doc).is_empty());

        doc.lines[0].quantity = Decimal::MAX;
        doc.lines[0].unit_price = dec!(2);
        let errors = validate_arithmetic(&doc);
        assert!(errors.iter().any(|e| e.field == "lines[0]" && e.message.contains("overflows")));

        doc.totals.total_without_tax = Decimal::MAX;
        doc.totals.tip = Decimal::MAX;
        let errors = validate_arithmetic(&doc);
        assert!(errors.iter().any(|e| e.field == "totals.grand_total"));
    }
}
