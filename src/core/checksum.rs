use super::error::{ComprobanteError, Result};

/// Modulo-11 check digit over a string of decimal digits.
///
/// Digits are weighted right to left with the cycle 2, 3, 4, 5, 6, 7, 2, …
/// and `11 - (sum mod 11)` is mapped so that 11 becomes 0 and 10 becomes 1.
///
/// ```
/// use comprobante::core::mod11_check_digit;
///
/// assert_eq!(mod11_check_digit("151120230117900123450011001001000000001123456781").unwrap(), 1);
/// assert!(mod11_check_digit("").is_err());
/// ```
pub fn mod11_check_digit(digits: &str) -> Result<u8> {
    if digits.is_empty() {
        return Err(ComprobanteError::InvalidInput(
            "checksum input must not be empty".into(),
        ));
    }

    let mut sum: u64 = 0;
    let mut weight: u64 = 2;
    for c in digits.chars().rev() {
        let d = c.to_digit(10).ok_or_else(|| {
            ComprobanteError::InvalidInput(format!(
                "checksum input must be decimal digits, found '{c}'"
            ))
        })?;
        sum += u64::from(d) * weight;
        weight = if weight == 7 { 2 } else { weight + 1 };
    }

    let check = match 11 - (sum % 11) {
        11 => 0,
        10 => 1,
        n => n,
    };
    Ok(check as u8)
}
