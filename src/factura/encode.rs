use std::collections::BTreeSet;

use rust_decimal::Decimal;

use super::writer::{XmlWriter, format_rate};
use super::{CURRENCY, EncodedDocument, RESERVED_FIELDS, SCHEMA_VERSION};
use crate::core::error::Result;
use crate::core::*;

/// Encode a document as canonical factura XML.
///
/// Pure: the same document always yields the same bytes. Totals are taken
/// from `document.totals` as computed by [`aggregate`]; nothing is recomputed
/// here except the per-line figures of each `detalle`.
pub fn to_xml(document: &Document) -> Result<EncodedDocument> {
    check_document(document)?;

    let id = &document.identity;
    let issuer = &document.issuer;
    let customer = &document.customer;
    let totals = &document.totals;
    let access_key = id.access_key();

    let mut w = XmlWriter::new()?;
    w.start_element_with_attrs("factura", &[("id", "comprobante"), ("version", SCHEMA_VERSION)])?;

    // --- infoTributaria ---
    w.start_element("infoTributaria")?;
    w.text_element("ambiente", id.environment.code())?;
    w.text_element("tipoEmision", id.emission_type.code())?;
    w.text_element("razonSocial", &issuer.legal_name)?;
    w.optional_element("nombreComercial", &[], issuer.trade_name.as_deref())?;
    w.text_element("ruc", &issuer.ruc)?;
    w.text_element("claveAcceso", access_key.as_str())?;
    w.text_element("codDoc", id.document_type.code())?;
    w.text_element("estab", &id.establishment)?;
    w.text_element("ptoEmi", &id.emission_point)?;
    w.text_element("secuencial", &id.sequential)?;
    w.text_element("dirMatriz", &issuer.head_office_address)?;
    w.end_element("infoTributaria")?;

    // --- infoFactura ---
    w.start_element("infoFactura")?;
    w.text_element("fechaEmision", &id.issue_date.format("%d/%m/%Y").to_string())?;
    w.optional_element("dirEstablecimiento", &[], issuer.establishment_address.as_deref())?;
    w.optional_element("contribuyenteEspecial", &[], issuer.special_taxpayer.as_deref())?;
    w.text_element(
        "obligadoContabilidad",
        if issuer.keeps_accounts { "SI" } else { "NO" },
    )?;
    w.text_element("tipoIdentificacionComprador", customer.id_type.code())?;
    w.text_element("razonSocialComprador", &customer.name)?;
    w.text_element("identificacionComprador", &customer.identification)?;
    w.money_element("totalSinImpuestos", totals.total_without_tax)?;
    w.money_element("totalDescuento", totals.total_discount)?;

    w.start_element("totalConImpuestos")?;
    let used: BTreeSet<TaxRate> = document.lines.iter().map(|l| l.tax_rate).collect();
    for rate in used {
        let bucket = totals.buckets.get(rate);
        w.start_element("totalImpuesto")?;
        w.text_element("codigo", IVA_TAX_CODE)?;
        w.text_element("codigoPorcentaje", &rate.code().to_string())?;
        w.money_element("baseImponible", bucket.base)?;
        w.money_element("valor", bucket.tax)?;
        w.end_element("totalImpuesto")?;
    }
    w.end_element("totalConImpuestos")?;

    w.money_element("propina", totals.tip)?;
    w.money_element("importeTotal", totals.grand_total)?;
    w.text_element("moneda", CURRENCY)?;
    w.start_element("pagos")?;
    w.start_element("pago")?;
    w.text_element("formaPago", document.payment_method.code())?;
    w.money_element("total", totals.grand_total)?;
    w.end_element("pago")?;
    w.end_element("pagos")?;
    w.end_element("infoFactura")?;

    // --- detalles ---
    w.start_element("detalles")?;
    for line in &document.lines {
        write_line(&mut w, line)?;
    }
    w.end_element("detalles")?;

    // --- infoAdicional ---
    w.start_element("infoAdicional")?;
    w.text_element_with_attrs("campoAdicional", &customer.email, &[("nombre", "Email")])?;
    w.text_element_with_attrs("campoAdicional", &customer.address, &[("nombre", "Direccion")])?;
    w.optional_element("campoAdicional", &[("nombre", "Telefono")], customer.phone.as_deref())?;
    for field in &document.additional_fields {
        w.text_element_with_attrs("campoAdicional", &field.value, &[("nombre", &field.name)])?;
    }
    w.end_element("infoAdicional")?;

    w.end_element("factura")?;

    Ok(EncodedDocument {
        access_key,
        xml: w.into_string()?,
    })
}

fn write_line(w: &mut XmlWriter, line: &LineItem) -> Result<()> {
    let net = line.net_amount()?;
    w.start_element("detalle")?;
    w.text_element("codigoPrincipal", &line.main_code)?;
    w.optional_element("codigoAuxiliar", &[], line.auxiliary_code.as_deref())?;
    w.text_element("descripcion", &line.description)?;
    w.precise_element("cantidad", line.quantity)?;
    w.precise_element("precioUnitario", line.unit_price)?;
    w.money_element("descuento", line.discount)?;
    w.money_element("precioTotalSinImpuesto", net)?;
    w.start_element("impuestos")?;
    w.start_element("impuesto")?;
    w.text_element("codigo", IVA_TAX_CODE)?;
    w.text_element("codigoPorcentaje", &line.tax_rate.code().to_string())?;
    w.text_element("tarifa", &format_rate(line.tax_rate.percentage()))?;
    w.money_element("baseImponible", net)?;
    w.money_element("valor", line.tax_amount()?)?;
    w.end_element("impuesto")?;
    w.end_element("impuestos")?;
    w.end_element("detalle")?;
    Ok(())
}

fn encoding_error(msg: impl Into<String>) -> ComprobanteError {
    ComprobanteError::Encoding(msg.into())
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(encoding_error(format!("{field} is required")));
    }
    Ok(())
}

fn require_non_negative(field: &str, value: Decimal) -> Result<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(encoding_error(format!(
            "{field} must not be negative, got {value}"
        )));
    }
    Ok(())
}

/// Reject documents the schema cannot represent. Nothing is coerced.
fn check_document(document: &Document) -> Result<()> {
    let id = &document.identity;
    let issuer = &document.issuer;

    require("issuer.ruc", &issuer.ruc)?;
    require("issuer.legal_name", &issuer.legal_name)?;
    require("issuer.head_office_address", &issuer.head_office_address)?;
    require("customer.identification", &document.customer.identification)?;
    require("customer.name", &document.customer.name)?;

    if id.issuer_ruc != issuer.ruc
        || id.establishment != issuer.establishment
        || id.emission_point != issuer.emission_point
        || id.environment != issuer.environment
    {
        return Err(encoding_error(
            "document identity does not match the issuer configuration",
        ));
    }
    if id.document_type != DocumentType::Invoice {
        return Err(encoding_error(format!(
            "document type {} cannot be encoded as a factura",
            id.document_type.code()
        )));
    }

    if document.lines.is_empty() {
        return Err(encoding_error("at least one detalle is required"));
    }
    for (i, line) in document.lines.iter().enumerate() {
        require(&format!("lines[{i}].main_code"), &line.main_code)?;
        require(&format!("lines[{i}].description"), &line.description)?;
        require_non_negative(&format!("lines[{i}].quantity"), line.quantity)?;
        require_non_negative(&format!("lines[{i}].unit_price"), line.unit_price)?;
        require_non_negative(&format!("lines[{i}].discount"), line.discount)?;
        let base = line
            .checked_base()
            .filter(|_| line.checked_tax().is_some())
            .ok_or_else(|| encoding_error(format!("lines[{i}] amount overflows")))?;
        require_non_negative(&format!("lines[{i}].net_amount"), base)?;
    }

    let totals = &document.totals;
    require_non_negative("totals.total_without_tax", totals.total_without_tax)?;
    require_non_negative("totals.total_discount", totals.total_discount)?;
    require_non_negative("totals.tip", totals.tip)?;
    require_non_negative("totals.grand_total", totals.grand_total)?;
    for (rate, bucket) in totals.buckets.iter() {
        require_non_negative(&format!("totals.buckets[{}].base", rate.code()), bucket.base)?;
        require_non_negative(&format!("totals.buckets[{}].tax", rate.code()), bucket.tax)?;
    }

    for field in &document.additional_fields {
        require("additional_fields.name", &field.name)?;
        if RESERVED_FIELDS
            .iter()
            .any(|r| r.eq_ignore_ascii_case(field.name.trim()))
        {
            return Err(encoding_error(format!(
                "additional field name '{}' is reserved",
                field.name
            )));
        }
    }

    Ok(())
}
