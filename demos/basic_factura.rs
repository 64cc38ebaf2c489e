use chrono::NaiveDate;
use comprobante::core::*;
use comprobante::factura;
use rust_decimal_macros::dec;
use tracing_subscriber::EnvFilter;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let issuer = Issuer {
        ruc: "1790012345001".into(),
        legal_name: "HOTEL TRONCAL S.A.".into(),
        trade_name: Some("Hotel Troncal".into()),
        head_office_address: "Av. Amazonas N34-120, Quito".into(),
        establishment_address: Some("Calle Sucre 4-56, Cuenca".into()),
        special_taxpayer: None,
        keeps_accounts: true,
        establishment: "002".into(),
        emission_point: "010".into(),
        environment: Environment::Test,
    };

    let guest = Customer {
        id_type: IdentificationType::Cedula,
        identification: "1710034065".into(),
        name: "María Fernanda Pérez".into(),
        address: "Av. 6 de Diciembre y Colón, Quito".into(),
        email: "mfperez@example.com".into(),
        phone: Some("0991234567".into()),
    };

    // Two nights in a suite, breakfast with a courtesy discount, and the
    // zero-rated tourism fee.
    let doc = DocumentBuilder::new(&issuer, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        .sequential("000000042")
        .numeric_code("87654321")
        .customer(guest)
        .add_line(
            LineItemBuilder::new("HAB", "Suite doble", dec!(2), dec!(80))
                .auxiliary_code("SUITE-2")
                .build(),
        )
        .add_line(
            LineItemBuilder::new("DES", "Desayuno buffet", dec!(2), dec!(7.50))
                .discount(dec!(1.50))
                .build(),
        )
        .add_line(
            LineItemBuilder::new("TUR", "Tasa turística", dec!(2), dec!(1))
                .tax_rate(TaxRate::Zero)
                .build(),
        )
        .payment_method(PaymentMethod::CreditCard)
        .additional_field("Reserva", "RSV-2024-0117")
        .build()
        .unwrap();

    println!("Access key:  {}", doc.identity.access_key());
    println!("Number:      {}", doc.identity.document_number());
    for (rate, bucket) in doc.totals.buckets.iter() {
        if !bucket.base.is_zero() {
            println!(
                "IVA {}%: base {} tax {}",
                rate.percentage(),
                factura::format_money(bucket.base),
                factura::format_money(bucket.tax)
            );
        }
    }
    println!("Grand total: {}", factura::format_money(doc.totals.grand_total));

    let errors = validate_arithmetic(&doc);
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("  {e}");
        }
        std::process::exit(1);
    }

    let encoded = factura::to_xml(&doc).unwrap();
    println!("\n{}", encoded.xml);

    let decoded = factura::from_xml(encoded.as_str()).unwrap();
    assert_eq!(decoded, doc);
    println!("Decoded document matches ({} bytes of XML)", encoded.as_bytes().len());
}
