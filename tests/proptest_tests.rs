//! Property-based tests for the comprobante crate.
//!
//! Run with: `cargo test --features all --test proptest_tests`

use chrono::NaiveDate;
use comprobante::core::*;
use proptest::prelude::*;
use rust_decimal::Decimal;

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

fn build(lines: Vec<LineItem>, tip: Decimal) -> Document {
    let issuer = issuer();
    let mut builder = DocumentBuilder::new(&issuer, NaiveDate::from_ymd_opt(2024, 6, 15).unwrap())
        .sequential("000000001")
        .numeric_code("12345678")
        .customer(Customer::final_consumer())
        .tip(tip);
    for line in lines {
        builder = builder.add_line(line);
    }
    builder.build().unwrap()
}

// ── Proptest Strategies ─────────────────────────────────────────────────────

/// Unit price with up to 6 decimals (0.000001 to 9999.999999).
fn arb_price() -> impl Strategy<Value = Decimal> {
    (1i64..10_000_000_000i64).prop_map(|micros| Decimal::new(micros, 6))
}

/// Quantity with up to 3 decimals (0.001 to 500).
fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (1i64..=500_000i64).prop_map(|millis| Decimal::new(millis, 3))
}

fn arb_rate() -> impl Strategy<Value = TaxRate> {
    prop::sample::select(TaxRate::ALL.to_vec())
}

/// A line with a whole-cent discount of at most the line subtotal.
fn arb_line() -> impl Strategy<Value = LineItem> {
    (arb_quantity(), arb_price(), arb_rate(), 0u32..=100u32).prop_map(
        |(qty, price, rate, discount_pct)| {
            let subtotal = qty * price;
            let discount = (subtotal * Decimal::from(discount_pct) / Decimal::ONE_HUNDRED)
                .round_dp_with_strategy(2, rust_decimal::RoundingStrategy::ToZero);
            LineItemBuilder::new("ITEM", "Item", qty, price)
                .discount(discount)
                .tax_rate(rate)
                .build()
        },
    )
}

fn arb_lines() -> impl Strategy<Value = Vec<LineItem>> {
    prop::collection::vec(arb_line(), 1..=8)
}

fn arb_tip() -> impl Strategy<Value = Decimal> {
    (0i64..10_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

/// Free text with XML specials and leading or trailing spaces.
#[cfg(feature = "xml")]
fn arb_text() -> impl Strategy<Value = String> {
    r#"[ A-Za-z0-9ñáÉ&<>'".,/-]{0,24}"#
}

/// Free text the encoder accepts where a value is required or optional.
#[cfg(feature = "xml")]
fn arb_filled_text() -> impl Strategy<Value = String> {
    arb_text().prop_filter("must not be blank", |s| !s.trim().is_empty())
}

#[cfg(feature = "xml")]
fn arb_field_name() -> impl Strategy<Value = String> {
    "[A-Za-z][A-Za-z0-9]{0,11}".prop_filter("reserved", |name| {
        !comprobante::factura::RESERVED_FIELDS
            .iter()
            .any(|r| r.eq_ignore_ascii_case(name))
    })
}

#[cfg(feature = "xml")]
#[derive(Debug, Clone)]
struct Texts {
    legal_name: String,
    trade_name: Option<String>,
    customer_name: String,
    address: String,
    email: String,
    phone: Option<String>,
    codes: Vec<(String, String, Option<String>)>,
}

#[cfg(feature = "xml")]
fn arb_texts() -> impl Strategy<Value = Texts> {
    (
        arb_filled_text(),
        prop::option::of(arb_filled_text()),
        arb_filled_text(),
        arb_text(),
        arb_text(),
        prop::option::of(arb_filled_text()),
        prop::collection::vec(
            (arb_filled_text(), arb_filled_text(), prop::option::of(arb_filled_text())),
            8,
        ),
    )
        .prop_map(
            |(legal_name, trade_name, customer_name, address, email, phone, codes)| Texts {
                legal_name,
                trade_name,
                customer_name,
                address,
                email,
                phone,
                codes,
            },
        )
}

/// Overwrite every free-text field of a built document.
#[cfg(feature = "xml")]
fn with_texts(mut doc: Document, texts: Texts, extra: Vec<(String, String)>) -> Document {
    doc.issuer.legal_name = texts.legal_name;
    doc.issuer.trade_name = texts.trade_name;
    doc.customer.name = texts.customer_name;
    doc.customer.address = texts.address;
    doc.customer.email = texts.email;
    doc.customer.phone = texts.phone;
    for (line, (main_code, description, auxiliary_code)) in doc.lines.iter_mut().zip(texts.codes) {
        line.main_code = main_code;
        line.description = description;
        line.auxiliary_code = auxiliary_code;
    }
    doc.additional_fields = extra
        .into_iter()
        .map(|(name, value)| AdditionalField { name, value })
        .collect();
    doc
}

// ── Property Tests ──────────────────────────────────────────────────────────

proptest! {
    /// The check digit is a single decimal digit and depends only on its input.
    #[test]
    fn checksum_is_a_digit(digits in "[0-9]{1,60}") {
        let a = mod11_check_digit(&digits).unwrap();
        let b = mod11_check_digit(&digits).unwrap();
        prop_assert!(a <= 9);
        prop_assert_eq!(a, b);
    }

    /// Anything that is not all ASCII digits is rejected.
    #[test]
    fn checksum_rejects_non_digits(prefix in "[0-9]{0,10}", bad in "[^0-9]", suffix in "[0-9]{0,10}") {
        let input = format!("{prefix}{bad}{suffix}");
        prop_assert!(mod11_check_digit(&input).is_err());
    }

    /// Generated keys always decompose back to the same identity.
    #[test]
    fn access_key_decomposes(seq in 1u64..=999_999_999u64, code in 0u32..=99_999_999u32) {
        let identity = generate_access_key(&KeyFields {
            issue_date: NaiveDate::from_ymd_opt(2024, 6, 15).unwrap(),
            document_type: DocumentType::Invoice,
            issuer_ruc: "1790012345001".into(),
            environment: Environment::Production,
            establishment: "001".into(),
            emission_point: "001".into(),
            sequential: format_sequential(seq),
            numeric_code: format!("{code:08}"),
            emission_type: EmissionType::Normal,
        }).unwrap();
        let key = identity.access_key();
        prop_assert_eq!(key.as_str().len(), ACCESS_KEY_LEN);
        prop_assert_eq!(AccessKey::decompose(key.as_str()).unwrap(), identity);
    }

    /// grandTotal == totalWithoutTax + totalTax + tip, exactly.
    #[test]
    fn grand_total_identity(lines in arb_lines(), tip in arb_tip()) {
        let totals = aggregate(&lines, tip).unwrap();
        prop_assert_eq!(
            totals.grand_total,
            totals.total_without_tax + totals.total_tax + totals.tip
        );
        prop_assert_eq!(totals.grand_total.round_dp(2), totals.grand_total);
    }

    /// Every rate has a bucket and the buckets add up to the totals.
    #[test]
    fn buckets_cover_every_rate(lines in arb_lines()) {
        let doc = build(lines, Decimal::ZERO);
        prop_assert_eq!(doc.totals.buckets.len(), TaxRate::ALL.len());
        let errors = validate_arithmetic(&doc);
        prop_assert!(errors.is_empty(), "arithmetic errors: {:?}", errors);
    }
}

#[cfg(feature = "xml")]
proptest! {
    /// Encoding is deterministic and decoding restores the document,
    /// free text included byte for byte.
    #[test]
    fn factura_round_trip(
        lines in arb_lines(),
        tip in arb_tip(),
        texts in arb_texts(),
        extra in prop::collection::vec((arb_field_name(), arb_text()), 0..=3),
    ) {
        let doc = with_texts(build(lines, tip), texts, extra);
        let encoded = comprobante::factura::to_xml(&doc).unwrap();
        prop_assert_eq!(&comprobante::factura::to_xml(&doc).unwrap(), &encoded);

        let decoded = comprobante::factura::from_xml(encoded.as_str()).unwrap();
        prop_assert_eq!(&decoded, &doc);
        let again = comprobante::factura::to_xml(&decoded).unwrap();
        prop_assert_eq!(again.xml, encoded.xml);
    }
}
