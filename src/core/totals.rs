use rust_decimal::Decimal;
use tracing::debug;

use super::error::{ComprobanteError, Result};
use super::types::{DocumentTotals, LineItem, TaxBuckets, round_money};

/// Aggregate line items into per-rate buckets and document totals.
///
/// Line bases and taxes are accumulated unrounded; each bucket is then
/// rounded half-up to cents, and the document totals are sums of the
/// rounded buckets. The discount total is rounded once, on the sum.
pub fn aggregate(lines: &[LineItem], tip: Decimal) -> Result<DocumentTotals> {
    if lines.is_empty() {
        return Err(ComprobanteError::Validation(
            "at least one line item is required".into(),
        ));
    }
    if tip.is_sign_negative() && !tip.is_zero() {
        return Err(ComprobanteError::Validation(format!(
            "tip must not be negative, got {tip}"
        )));
    }

    let mut buckets = TaxBuckets::default();
    let mut discount_sum = Decimal::ZERO;

    for (i, line) in lines.iter().enumerate() {
        let base = validate_line(line, i)?;
        let tax = line
            .checked_tax()
            .ok_or_else(|| overflow(&format!("lines[{i}] tax")))?;
        let bucket = buckets.entry_mut(line.tax_rate);
        bucket.base = add(bucket.base, base, "tax bucket base")?;
        bucket.tax = add(bucket.tax, tax, "tax bucket tax")?;
        discount_sum = add(discount_sum, line.discount, "discount total")?;
    }

    let mut total_without_tax = Decimal::ZERO;
    let mut total_tax = Decimal::ZERO;
    for rate in super::types::TaxRate::ALL {
        let bucket = buckets.entry_mut(rate);
        bucket.base = round_money(bucket.base);
        bucket.tax = round_money(bucket.tax);
        total_without_tax = add(total_without_tax, bucket.base, "totalSinImpuestos")?;
        total_tax = add(total_tax, bucket.tax, "tax total")?;
    }

    let tip = round_money(tip);
    let grand_total = add(add(total_without_tax, total_tax, "importeTotal")?, tip, "importeTotal")?;

    debug!(
        lines = lines.len(),
        %total_without_tax,
        %total_tax,
        %grand_total,
        "aggregated document totals"
    );

    Ok(DocumentTotals {
        buckets,
        total_discount: round_money(discount_sum),
        total_without_tax,
        total_tax,
        tip,
        grand_total,
    })
}

fn overflow(what: &str) -> ComprobanteError {
    ComprobanteError::Validation(format!("{what} does not fit a decimal amount"))
}

fn add(a: Decimal, b: Decimal, what: &str) -> Result<Decimal> {
    a.checked_add(b).ok_or_else(|| overflow(what))
}

/// Check a line's inputs and return its unrounded base.
fn validate_line(line: &LineItem, index: usize) -> Result<Decimal> {
    let negative = |d: Decimal| d.is_sign_negative() && !d.is_zero();
    if negative(line.quantity) {
        return Err(ComprobanteError::Validation(format!(
            "lines[{index}].quantity must not be negative, got {}",
            line.quantity
        )));
    }
    if negative(line.unit_price) {
        return Err(ComprobanteError::Validation(format!(
            "lines[{index}].unit_price must not be negative, got {}",
            line.unit_price
        )));
    }
    if negative(line.discount) {
        return Err(ComprobanteError::Validation(format!(
            "lines[{index}].discount must not be negative, got {}",
            line.discount
        )));
    }
    let base = line
        .checked_base()
        .ok_or_else(|| overflow(&format!("lines[{index}] quantity x unit_price")))?;
    if negative(base) {
        return Err(ComprobanteError::Validation(format!(
            "lines[{index}].discount {} exceeds line subtotal {}",
            line.discount,
            base + line.discount
        )));
    }
    Ok(base)
}
