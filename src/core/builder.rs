use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::access_key::{KeyFields, generate_access_key};
use super::error::{ComprobanteError, Result};
use super::totals::aggregate;
use super::types::*;

/// Builder for an invoice document.
///
/// The issuer configuration is borrowed and cloned into the document; the
/// builder never mutates it.
///
/// ```
/// use comprobante::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let issuer = Issuer {
///     ruc: "1790012345001".into(),
///     legal_name: "TRONCALINN S.A.".into(),
///     trade_name: None,
///     head_office_address: "Av. Principal 123, Quito".into(),
///     establishment_address: None,
///     special_taxpayer: None,
///     keeps_accounts: true,
///     establishment: "001".into(),
///     emission_point: "001".into(),
///     environment: Environment::Test,
/// };
///
/// let doc = DocumentBuilder::new(&issuer, NaiveDate::from_ymd_opt(2023, 11, 15).unwrap())
///     .sequential("000000001")
///     .numeric_code("12345678")
///     .customer(Customer::final_consumer())
///     .add_line(LineItemBuilder::new("HAB-001", "Habitación doble", dec!(2), dec!(80)).build())
///     .build()
///     .unwrap();
///
/// assert_eq!(doc.totals.grand_total, dec!(184.00));
/// ```
pub struct DocumentBuilder<'a> {
    issuer: &'a Issuer,
    issue_date: NaiveDate,
    document_type: DocumentType,
    sequential: Option<String>,
    numeric_code: Option<String>,
    customer: Option<Customer>,
    lines: Vec<LineItem>,
    payment_method: PaymentMethod,
    tip: Decimal,
    additional_fields: Vec<AdditionalField>,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(issuer: &'a Issuer, issue_date: NaiveDate) -> Self {
        Self {
            issuer,
            issue_date,
            document_type: DocumentType::Invoice,
            sequential: None,
            numeric_code: None,
            customer: None,
            lines: Vec::new(),
            payment_method: PaymentMethod::FinancialSystem,
            tip: Decimal::ZERO,
            additional_fields: Vec::new(),
        }
    }

    /// 9-digit sequential, already zero-padded by the caller.
    pub fn sequential(mut self, sequential: impl Into<String>) -> Self {
        self.sequential = Some(sequential.into());
        self
    }

    /// 8-digit numeric code.
    pub fn numeric_code(mut self, code: impl Into<String>) -> Self {
        self.numeric_code = Some(code.into());
        self
    }

    pub fn customer(mut self, customer: Customer) -> Self {
        self.customer = Some(customer);
        self
    }

    pub fn add_line(mut self, line: LineItem) -> Self {
        self.lines.push(line);
        self
    }

    pub fn payment_method(mut self, method: PaymentMethod) -> Self {
        self.payment_method = method;
        self
    }

    pub fn tip(mut self, tip: Decimal) -> Self {
        self.tip = tip;
        self
    }

    pub fn additional_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_fields.push(AdditionalField {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Generate the access key, aggregate the totals and freeze the document.
    pub fn build(self) -> Result<Document> {
        let customer = self
            .customer
            .ok_or_else(|| ComprobanteError::Validation("customer is required".into()))?;
        let sequential = self
            .sequential
            .ok_or_else(|| ComprobanteError::Validation("sequential is required".into()))?;
        let numeric_code = self
            .numeric_code
            .ok_or_else(|| ComprobanteError::Validation("numeric code is required".into()))?;

        if self.lines.len() > 10_000 {
            return Err(ComprobanteError::Validation(
                "a document cannot have more than 10,000 line items".into(),
            ));
        }

        let identity = generate_access_key(&KeyFields {
            issue_date: self.issue_date,
            document_type: self.document_type,
            issuer_ruc: self.issuer.ruc.clone(),
            environment: self.issuer.environment,
            establishment: self.issuer.establishment.clone(),
            emission_point: self.issuer.emission_point.clone(),
            sequential,
            numeric_code,
            emission_type: EmissionType::Normal,
        })?;

        let totals = aggregate(&self.lines, self.tip)?;

        Ok(Document {
            identity,
            issuer: self.issuer.clone(),
            customer,
            lines: self.lines,
            totals,
            payment_method: self.payment_method,
            additional_fields: self.additional_fields,
        })
    }
}

/// Builder for a [`LineItem`]. Defaults to the 15 % rate and no discount.
pub struct LineItemBuilder {
    main_code: String,
    auxiliary_code: Option<String>,
    description: String,
    quantity: Decimal,
    unit_price: Decimal,
    discount: Decimal,
    tax_rate: TaxRate,
}

impl LineItemBuilder {
    pub fn new(
        main_code: impl Into<String>,
        description: impl Into<String>,
        quantity: Decimal,
        unit_price: Decimal,
    ) -> Self {
        Self {
            main_code: main_code.into(),
            auxiliary_code: None,
            description: description.into(),
            quantity,
            unit_price,
            discount: Decimal::ZERO,
            tax_rate: TaxRate::Fifteen,
        }
    }

    pub fn auxiliary_code(mut self, code: impl Into<String>) -> Self {
        self.auxiliary_code = Some(code.into());
        self
    }

    pub fn discount(mut self, discount: Decimal) -> Self {
        self.discount = discount;
        self
    }

    pub fn tax_rate(mut self, rate: TaxRate) -> Self {
        self.tax_rate = rate;
        self
    }

    pub fn build(self) -> LineItem {
        LineItem {
            main_code: self.main_code,
            auxiliary_code: self.auxiliary_code,
            description: self.description,
            quantity: self.quantity,
            unit_price: self.unit_price,
            discount: self.discount,
            tax_rate: self.tax_rate,
        }
    }
}
