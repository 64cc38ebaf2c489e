use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::access_key::AccessKey;
use super::error::{ComprobanteError, Result};

/// `ambiente` — target environment of the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Environment {
    /// 1 — Pruebas.
    Test,
    /// 2 — Producción.
    Production,
}

impl Environment {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Test => "1",
            Self::Production => "2",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Self::Test),
            "2" => Some(Self::Production),
            _ => None,
        }
    }
}

/// `codDoc` — document type (Tabla 3 of the SRI technical sheet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentType {
    /// 01 — Factura.
    Invoice,
    /// 04 — Nota de crédito.
    CreditNote,
    /// 05 — Nota de débito.
    DebitNote,
    /// 06 — Guía de remisión.
    DeliveryGuide,
    /// 07 — Comprobante de retención.
    Withholding,
}

impl DocumentType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invoice => "01",
            Self::CreditNote => "04",
            Self::DebitNote => "05",
            Self::DeliveryGuide => "06",
            Self::Withholding => "07",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Invoice),
            "04" => Some(Self::CreditNote),
            "05" => Some(Self::DebitNote),
            "06" => Some(Self::DeliveryGuide),
            "07" => Some(Self::Withholding),
            _ => None,
        }
    }
}

/// `tipoEmision` — emission type. Only normal emission is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmissionType {
    /// 1 — Emisión normal.
    Normal,
}

impl EmissionType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Normal => "1",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(Self::Normal),
            _ => None,
        }
    }
}

/// `tipoIdentificacionComprador` — buyer identification type (Tabla 6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdentificationType {
    /// 04 — RUC.
    Ruc,
    /// 05 — Cédula.
    Cedula,
    /// 06 — Pasaporte.
    Passport,
    /// 07 — Consumidor final.
    FinalConsumer,
    /// 08 — Identificación del exterior.
    Foreign,
}

impl IdentificationType {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Ruc => "04",
            Self::Cedula => "05",
            Self::Passport => "06",
            Self::FinalConsumer => "07",
            Self::Foreign => "08",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "04" => Some(Self::Ruc),
            "05" => Some(Self::Cedula),
            "06" => Some(Self::Passport),
            "07" => Some(Self::FinalConsumer),
            "08" => Some(Self::Foreign),
            _ => None,
        }
    }
}

/// IVA rate identified by its `codigoPorcentaje` (Tabla 17).
///
/// Variants are declared in ascending code order, so the derived `Ord`
/// is the enumeration order the schema requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaxRate {
    /// 0 — 0 %.
    Zero,
    /// 2 — 12 %.
    Twelve,
    /// 3 — 14 %.
    Fourteen,
    /// 4 — 15 %.
    Fifteen,
    /// 5 — 5 %.
    Five,
    /// 6 — No objeto de impuesto.
    NotSubject,
    /// 7 — Exento de IVA.
    Exempt,
    /// 10 — 13 %.
    Thirteen,
}

/// `codigo` of the IVA tax in `impuesto` / `totalImpuesto`.
pub const IVA_TAX_CODE: &str = "2";

impl TaxRate {
    /// Every supported rate, in ascending code order.
    pub const ALL: [TaxRate; 8] = [
        Self::Zero,
        Self::Twelve,
        Self::Fourteen,
        Self::Fifteen,
        Self::Five,
        Self::NotSubject,
        Self::Exempt,
        Self::Thirteen,
    ];

    /// `codigoPorcentaje` value.
    pub fn code(&self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::Twelve => 2,
            Self::Fourteen => 3,
            Self::Fifteen => 4,
            Self::Five => 5,
            Self::NotSubject => 6,
            Self::Exempt => 7,
            Self::Thirteen => 10,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.code() == code)
    }

    /// Rate percentage (`tarifa`), e.g. 15 for 15 %.
    pub fn percentage(&self) -> Decimal {
        match self {
            Self::Zero | Self::NotSubject | Self::Exempt => Decimal::ZERO,
            Self::Twelve => Decimal::from(12),
            Self::Fourteen => Decimal::from(14),
            Self::Fifteen => Decimal::from(15),
            Self::Five => Decimal::from(5),
            Self::Thirteen => Decimal::from(13),
        }
    }
}

/// `formaPago` — payment method (Tabla 24).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentMethod {
    /// 01 — Sin utilización del sistema financiero (cash).
    Cash,
    /// 15 — Compensación de deudas.
    DebtCompensation,
    /// 16 — Tarjeta de débito.
    DebitCard,
    /// 17 — Dinero electrónico.
    ElectronicMoney,
    /// 18 — Tarjeta prepago.
    PrepaidCard,
    /// 19 — Tarjeta de crédito.
    CreditCard,
    /// 20 — Otros con utilización del sistema financiero.
    FinancialSystem,
    /// 21 — Endoso de títulos.
    Endorsement,
}

impl PaymentMethod {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Cash => "01",
            Self::DebtCompensation => "15",
            Self::DebitCard => "16",
            Self::ElectronicMoney => "17",
            Self::PrepaidCard => "18",
            Self::CreditCard => "19",
            Self::FinancialSystem => "20",
            Self::Endorsement => "21",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "01" => Some(Self::Cash),
            "15" => Some(Self::DebtCompensation),
            "16" => Some(Self::DebitCard),
            "17" => Some(Self::ElectronicMoney),
            "18" => Some(Self::PrepaidCard),
            "19" => Some(Self::CreditCard),
            "20" => Some(Self::FinancialSystem),
            "21" => Some(Self::Endorsement),
            _ => None,
        }
    }
}

/// Issuer (emisor) configuration. Supplied by the configuration collaborator
/// and passed by reference into every call; never mutated by the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issuer {
    /// 13-digit RUC.
    pub ruc: String,
    /// `razonSocial`.
    pub legal_name: String,
    /// `nombreComercial`.
    #[serde(default)]
    pub trade_name: Option<String>,
    /// `dirMatriz`.
    pub head_office_address: String,
    /// `dirEstablecimiento`.
    #[serde(default)]
    pub establishment_address: Option<String>,
    /// `contribuyenteEspecial` resolution number.
    #[serde(default)]
    pub special_taxpayer: Option<String>,
    /// `obligadoContabilidad` (SI / NO).
    #[serde(default)]
    pub keeps_accounts: bool,
    /// 3-digit establishment code (`estab`).
    pub establishment: String,
    /// 3-digit emission point code (`ptoEmi`).
    pub emission_point: String,
    pub environment: Environment,
}

/// Buyer (comprador).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id_type: IdentificationType,
    pub identification: String,
    pub name: String,
    pub address: String,
    pub email: String,
    pub phone: Option<String>,
}

/// Identification the authority reserves for anonymous final consumers.
pub const FINAL_CONSUMER_ID: &str = "9999999999999";

impl Customer {
    /// The anonymous "CONSUMIDOR FINAL" buyer.
    pub fn final_consumer() -> Self {
        Self {
            id_type: IdentificationType::FinalConsumer,
            identification: FINAL_CONSUMER_ID.into(),
            name: "CONSUMIDOR FINAL".into(),
            address: String::new(),
            email: String::new(),
            phone: None,
        }
    }
}

/// One invoice line (`detalle`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    /// `codigoPrincipal`.
    pub main_code: String,
    /// `codigoAuxiliar`.
    pub auxiliary_code: Option<String>,
    pub description: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    /// Absolute discount on the line, never more than quantity × unit price.
    pub discount: Decimal,
    pub tax_rate: TaxRate,
}

impl LineItem {
    /// quantity × unit price − discount, unrounded. `None` when the amount
    /// does not fit a `Decimal`.
    pub fn checked_base(&self) -> Option<Decimal> {
        self.quantity
            .checked_mul(self.unit_price)?
            .checked_sub(self.discount)
    }

    /// Unrounded IVA on [`checked_base`](Self::checked_base).
    pub fn checked_tax(&self) -> Option<Decimal> {
        self.checked_base()?
            .checked_mul(self.tax_rate.percentage())?
            .checked_div(Decimal::ONE_HUNDRED)
    }

    /// quantity × unit price − discount, unrounded.
    pub fn base(&self) -> Result<Decimal> {
        self.checked_base().ok_or_else(|| self.overflow())
    }

    /// `precioTotalSinImpuesto`, rounded half-up to cents.
    pub fn net_amount(&self) -> Result<Decimal> {
        self.base().map(round_money)
    }

    /// Line IVA `valor`, rounded half-up to cents.
    pub fn tax_amount(&self) -> Result<Decimal> {
        self.checked_tax()
            .map(round_money)
            .ok_or_else(|| self.overflow())
    }

    fn overflow(&self) -> ComprobanteError {
        ComprobanteError::Validation(format!(
            "line {} amount overflows: {} x {} - {}",
            self.main_code, self.quantity, self.unit_price, self.discount
        ))
    }
}

/// Round a monetary amount to 2 decimal places, half-up.
pub fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, rust_decimal::RoundingStrategy::MidpointAwayFromZero)
}

/// Base and tax accumulated for one rate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketAmounts {
    pub base: Decimal,
    pub tax: Decimal,
}

/// Per-rate subtotals. Every rate in [`TaxRate::ALL`] is always present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxBuckets(BTreeMap<TaxRate, BucketAmounts>);

impl Default for TaxBuckets {
    fn default() -> Self {
        Self(
            TaxRate::ALL
                .into_iter()
                .map(|r| (r, BucketAmounts::default()))
                .collect(),
        )
    }
}

impl TaxBuckets {
    pub fn get(&self, rate: TaxRate) -> BucketAmounts {
        self.0.get(&rate).copied().unwrap_or_default()
    }

    pub(crate) fn entry_mut(&mut self, rate: TaxRate) -> &mut BucketAmounts {
        self.0.entry(rate).or_default()
    }

    /// Iterate buckets in ascending rate-code order.
    pub fn iter(&self) -> impl Iterator<Item = (TaxRate, BucketAmounts)> + '_ {
        self.0.iter().map(|(r, a)| (*r, *a))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Sum of the bucket bases, `None` on overflow.
    pub fn total_base(&self) -> Option<Decimal> {
        self.0
            .values()
            .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.base))
    }

    /// Sum of the bucket taxes, `None` on overflow.
    pub fn total_tax(&self) -> Option<Decimal> {
        self.0
            .values()
            .try_fold(Decimal::ZERO, |acc, b| acc.checked_add(b.tax))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Computed document totals. Produced by [`aggregate`](super::aggregate) and
/// never recomputed afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentTotals {
    pub buckets: TaxBuckets,
    /// `totalDescuento`.
    pub total_discount: Decimal,
    /// `totalSinImpuestos`.
    pub total_without_tax: Decimal,
    pub total_tax: Decimal,
    /// `propina`.
    pub tip: Decimal,
    /// `importeTotal`.
    pub grand_total: Decimal,
}

/// Full identity of a document, including the check digit of its access key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentIdentity {
    pub issue_date: NaiveDate,
    pub document_type: DocumentType,
    pub issuer_ruc: String,
    pub environment: Environment,
    pub establishment: String,
    pub emission_point: String,
    pub sequential: String,
    pub numeric_code: String,
    pub emission_type: EmissionType,
    pub check_digit: u8,
}

impl DocumentIdentity {
    /// The 49-digit access key.
    pub fn access_key(&self) -> AccessKey {
        AccessKey::from_identity(self)
    }

    /// Human document number, e.g. `001-001-000000001`.
    pub fn document_number(&self) -> String {
        format!(
            "{}-{}-{}",
            self.establishment, self.emission_point, self.sequential
        )
    }
}

/// `campoAdicional` entry in `infoAdicional`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdditionalField {
    pub name: String,
    pub value: String,
}

/// A fully computed document, ready for encoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub identity: DocumentIdentity,
    pub issuer: Issuer,
    pub customer: Customer,
    pub lines: Vec<LineItem>,
    pub totals: DocumentTotals,
    pub payment_method: PaymentMethod,
    /// Extra `campoAdicional` entries after Email and Direccion.
    pub additional_fields: Vec<AdditionalField>,
}

impl Document {
    pub fn access_key(&self) -> AccessKey {
        self.identity.access_key()
    }
}
