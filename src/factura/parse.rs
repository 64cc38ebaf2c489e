use std::str::FromStr;

use chrono::NaiveDate;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use rust_decimal::Decimal;

use super::{CURRENCY, SCHEMA_VERSION};
use crate::core::error::Result;
use crate::core::*;

fn decoding_error(msg: impl Into<String>) -> ComprobanteError {
    ComprobanteError::Decoding(msg.into())
}

/// Parse canonical factura XML back into a [`Document`].
///
/// The identity is recovered from `claveAcceso` and cross-checked against
/// the `infoTributaria` fields and `fechaEmision`. Totals are read as
/// written and must satisfy [`validate_arithmetic`]. Leaf text is taken
/// verbatim, surrounding whitespace included.
pub fn from_xml(xml: &str) -> Result<Document> {
    let mut reader = Reader::from_str(xml);

    let mut parsed = ParsedFactura::default();
    let mut path: Vec<String> = Vec::new();
    // Text is kept verbatim only when it is the sole content of an element;
    // indentation between elements is dropped.
    let mut text = String::new();
    let mut leaf = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => {
                let name = element_name(e)?;
                parsed.handle_start(&path, &name, e)?;
                path.push(name);
                text.clear();
                leaf = true;
            }
            Ok(Event::Empty(ref e)) => {
                let name = element_name(e)?;
                parsed.handle_start(&path, &name, e)?;
                path.push(name);
                parsed.handle_end(&path);
                path.pop();
                text.clear();
                leaf = false;
            }
            Ok(Event::Text(ref e)) => {
                let unescaped = e
                    .unescape()
                    .map_err(|e| decoding_error(format!("XML text error: {e}")))?;
                if leaf {
                    text.push_str(&unescaped);
                }
            }
            Ok(Event::End(_)) => {
                if leaf && !text.is_empty() {
                    parsed.handle_text(&path, &text);
                }
                text.clear();
                leaf = false;
                parsed.handle_end(&path);
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(decoding_error(format!(
                    "XML parse error at position {}: {e}",
                    reader.buffer_position()
                )));
            }
            _ => {}
        }
    }

    parsed.into_document()
}

fn element_name(e: &BytesStart<'_>) -> Result<String> {
    std::str::from_utf8(e.name().as_ref())
        .map(str::to_string)
        .map_err(|e| decoding_error(format!("element name is not UTF-8: {e}")))
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|e| decoding_error(format!("attribute error: {e}")))?;
        if attr.key.as_ref() == key.as_bytes() {
            let value = attr
                .unescape_value()
                .map_err(|e| decoding_error(format!("attribute error: {e}")))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

#[derive(Default)]
struct ParsedFactura {
    root_seen: bool,

    ambiente: Option<String>,
    tipo_emision: Option<String>,
    razon_social: Option<String>,
    nombre_comercial: Option<String>,
    ruc: Option<String>,
    clave_acceso: Option<String>,
    cod_doc: Option<String>,
    estab: Option<String>,
    pto_emi: Option<String>,
    secuencial: Option<String>,
    dir_matriz: Option<String>,

    fecha_emision: Option<String>,
    dir_establecimiento: Option<String>,
    contribuyente_especial: Option<String>,
    obligado_contabilidad: Option<String>,
    tipo_identificacion: Option<String>,
    razon_social_comprador: Option<String>,
    identificacion_comprador: Option<String>,
    total_sin_impuestos: Option<String>,
    total_descuento: Option<String>,
    propina: Option<String>,
    importe_total: Option<String>,
    moneda: Option<String>,
    forma_pago: Option<String>,

    subtotals: Vec<ParsedSubtotal>,
    current_subtotal: Option<ParsedSubtotal>,
    lines: Vec<ParsedLine>,
    current_line: Option<ParsedLine>,
    extra_fields: Vec<(String, String)>,
    current_field: Option<(String, String)>,
}

#[derive(Default)]
struct ParsedSubtotal {
    codigo: Option<String>,
    codigo_porcentaje: Option<String>,
    base: Option<String>,
    valor: Option<String>,
}

#[derive(Default)]
struct ParsedLine {
    codigo_principal: Option<String>,
    codigo_auxiliar: Option<String>,
    descripcion: Option<String>,
    cantidad: Option<String>,
    precio_unitario: Option<String>,
    descuento: Option<String>,
    codigo: Option<String>,
    codigo_porcentaje: Option<String>,
    tarifa: Option<String>,
}

impl ParsedFactura {
    fn handle_start(&mut self, path: &[String], name: &str, e: &BytesStart<'_>) -> Result<()> {
        if path.is_empty() {
            if name != "factura" {
                return Err(decoding_error(format!(
                    "root element must be 'factura', found '{name}'"
                )));
            }
            let version = attribute(e, "version")?.unwrap_or_default();
            if version != SCHEMA_VERSION {
                return Err(decoding_error(format!(
                    "unsupported factura version '{version}', expected {SCHEMA_VERSION}"
                )));
            }
            self.root_seen = true;
            return Ok(());
        }
        match name {
            "totalImpuesto" => self.current_subtotal = Some(ParsedSubtotal::default()),
            "detalle" => self.current_line = Some(ParsedLine::default()),
            "campoAdicional" => {
                let field = attribute(e, "nombre")?.unwrap_or_default();
                self.current_field = Some((field, String::new()));
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_end(&mut self, path: &[String]) {
        match path.last().map(String::as_str) {
            Some("totalImpuesto") => {
                if let Some(subtotal) = self.current_subtotal.take() {
                    self.subtotals.push(subtotal);
                }
            }
            Some("detalle") => {
                if let Some(line) = self.current_line.take() {
                    self.lines.push(line);
                }
            }
            Some("campoAdicional") => {
                if let Some(field) = self.current_field.take() {
                    self.extra_fields.push(field);
                }
            }
            _ => {}
        }
    }

    fn handle_text(&mut self, path: &[String], text: &str) {
        let leaf = path.last().map(String::as_str).unwrap_or("");
        let parent = if path.len() >= 2 {
            path[path.len() - 2].as_str()
        } else {
            ""
        };
        let value = Some(text.to_string());

        match parent {
            "infoTributaria" => match leaf {
                "ambiente" => self.ambiente = value,
                "tipoEmision" => self.tipo_emision = value,
                "razonSocial" => self.razon_social = value,
                "nombreComercial" => self.nombre_comercial = value,
                "ruc" => self.ruc = value,
                "claveAcceso" => self.clave_acceso = value,
                "codDoc" => self.cod_doc = value,
                "estab" => self.estab = value,
                "ptoEmi" => self.pto_emi = value,
                "secuencial" => self.secuencial = value,
                "dirMatriz" => self.dir_matriz = value,
                _ => {}
            },
            "infoFactura" => match leaf {
                "fechaEmision" => self.fecha_emision = value,
                "dirEstablecimiento" => self.dir_establecimiento = value,
                "contribuyenteEspecial" => self.contribuyente_especial = value,
                "obligadoContabilidad" => self.obligado_contabilidad = value,
                "tipoIdentificacionComprador" => self.tipo_identificacion = value,
                "razonSocialComprador" => self.razon_social_comprador = value,
                "identificacionComprador" => self.identificacion_comprador = value,
                "totalSinImpuestos" => self.total_sin_impuestos = value,
                "totalDescuento" => self.total_descuento = value,
                "propina" => self.propina = value,
                "importeTotal" => self.importe_total = value,
                "moneda" => self.moneda = value,
                _ => {}
            },
            "totalImpuesto" => {
                if let Some(st) = self.current_subtotal.as_mut() {
                    match leaf {
                        "codigo" => st.codigo = value,
                        "codigoPorcentaje" => st.codigo_porcentaje = value,
                        "baseImponible" => st.base = value,
                        "valor" => st.valor = value,
                        _ => {}
                    }
                }
            }
            "pago" if leaf == "formaPago" => self.forma_pago = value,
            "detalle" => {
                if let Some(line) = self.current_line.as_mut() {
                    match leaf {
                        "codigoPrincipal" => line.codigo_principal = value,
                        "codigoAuxiliar" => line.codigo_auxiliar = value,
                        "descripcion" => line.descripcion = value,
                        "cantidad" => line.cantidad = value,
                        "precioUnitario" => line.precio_unitario = value,
                        "descuento" => line.descuento = value,
                        _ => {}
                    }
                }
            }
            "impuesto" => {
                if let Some(line) = self.current_line.as_mut() {
                    match leaf {
                        "codigo" => line.codigo = value,
                        "codigoPorcentaje" => line.codigo_porcentaje = value,
                        "tarifa" => line.tarifa = value,
                        _ => {}
                    }
                }
            }
            "infoAdicional" if leaf == "campoAdicional" => {
                if let Some(field) = self.current_field.as_mut() {
                    field.1 = text.to_string();
                }
            }
            _ => {}
        }
    }

    fn into_document(self) -> Result<Document> {
        if !self.root_seen {
            return Err(decoding_error("missing 'factura' root element"));
        }

        let clave = required(self.clave_acceso, "claveAcceso")?;
        let identity = AccessKey::decompose(&clave)
            .map_err(|e| decoding_error(format!("claveAcceso: {e}")))?;

        let issue_date = parse_date(&required(self.fecha_emision, "fechaEmision")?)?;
        let ruc = required(self.ruc, "ruc")?;
        let cross_checks = [
            ("fechaEmision", issue_date == identity.issue_date),
            ("ruc", ruc == identity.issuer_ruc),
            ("codDoc", self.cod_doc.as_deref() == Some(identity.document_type.code())),
            ("ambiente", self.ambiente.as_deref() == Some(identity.environment.code())),
            ("tipoEmision", self.tipo_emision.as_deref() == Some(identity.emission_type.code())),
            ("estab", self.estab.as_deref() == Some(identity.establishment.as_str())),
            ("ptoEmi", self.pto_emi.as_deref() == Some(identity.emission_point.as_str())),
            ("secuencial", self.secuencial.as_deref() == Some(identity.sequential.as_str())),
        ];
        if let Some((field, _)) = cross_checks.iter().find(|(_, ok)| !ok) {
            return Err(decoding_error(format!(
                "{field} does not match claveAcceso {clave}"
            )));
        }
        if identity.document_type != DocumentType::Invoice {
            return Err(decoding_error(format!(
                "claveAcceso is for document type {}, not a factura",
                identity.document_type.code()
            )));
        }

        let moneda = required(self.moneda, "moneda")?;
        if moneda != CURRENCY {
            return Err(decoding_error(format!("unsupported moneda '{moneda}'")));
        }

        let keeps_accounts = match required(self.obligado_contabilidad, "obligadoContabilidad")?.as_str() {
            "SI" => true,
            "NO" => false,
            other => {
                return Err(decoding_error(format!(
                    "obligadoContabilidad must be SI or NO, got '{other}'"
                )));
            }
        };

        let issuer = Issuer {
            ruc,
            legal_name: required(self.razon_social, "razonSocial")?,
            trade_name: self.nombre_comercial,
            head_office_address: required(self.dir_matriz, "dirMatriz")?,
            establishment_address: self.dir_establecimiento,
            special_taxpayer: self.contribuyente_especial,
            keeps_accounts,
            establishment: identity.establishment.clone(),
            emission_point: identity.emission_point.clone(),
            environment: identity.environment,
        };

        let id_code = required(self.tipo_identificacion, "tipoIdentificacionComprador")?;
        let id_type = IdentificationType::from_code(&id_code).ok_or_else(|| {
            decoding_error(format!("unknown tipoIdentificacionComprador '{id_code}'"))
        })?;

        let mut email = None;
        let mut address = None;
        let mut phone = None;
        let mut additional_fields = Vec::new();
        for (name, value) in self.extra_fields {
            match name.as_str() {
                "Email" => email = Some(value),
                "Direccion" => address = Some(value),
                "Telefono" => phone = Some(value),
                _ => additional_fields.push(AdditionalField { name, value }),
            }
        }

        let customer = Customer {
            id_type,
            identification: required(self.identificacion_comprador, "identificacionComprador")?,
            name: required(self.razon_social_comprador, "razonSocialComprador")?,
            address: address.ok_or_else(|| decoding_error("missing campoAdicional 'Direccion'"))?,
            email: email.ok_or_else(|| decoding_error("missing campoAdicional 'Email'"))?,
            phone,
        };

        let lines = self
            .lines
            .into_iter()
            .enumerate()
            .map(|(i, line)| line.into_line_item(i))
            .collect::<Result<Vec<_>>>()?;
        if lines.is_empty() {
            return Err(decoding_error("factura has no detalle"));
        }

        let mut buckets = TaxBuckets::default();
        for subtotal in self.subtotals {
            if subtotal.codigo.as_deref() != Some(IVA_TAX_CODE) {
                return Err(decoding_error(format!(
                    "totalImpuesto codigo must be {IVA_TAX_CODE}"
                )));
            }
            let rate = parse_rate(subtotal.codigo_porcentaje, "totalImpuesto")?;
            let bucket = buckets.entry_mut(rate);
            bucket.base = parse_decimal(&required(subtotal.base, "totalImpuesto/baseImponible")?)?;
            bucket.tax = parse_decimal(&required(subtotal.valor, "totalImpuesto/valor")?)?;
        }
        let total_tax = buckets
            .total_tax()
            .ok_or_else(|| decoding_error("sum of totalImpuesto valor overflows"))?;

        let totals = DocumentTotals {
            buckets,
            total_discount: parse_decimal(&required(self.total_descuento, "totalDescuento")?)?,
            total_without_tax: parse_decimal(&required(
                self.total_sin_impuestos,
                "totalSinImpuestos",
            )?)?,
            total_tax,
            tip: parse_decimal(&required(self.propina, "propina")?)?,
            grand_total: parse_decimal(&required(self.importe_total, "importeTotal")?)?,
        };

        let forma_pago = required(self.forma_pago, "formaPago")?;
        let payment_method = PaymentMethod::from_code(&forma_pago)
            .ok_or_else(|| decoding_error(format!("unknown formaPago '{forma_pago}'")))?;

        let document = Document {
            identity,
            issuer,
            customer,
            lines,
            totals,
            payment_method,
            additional_fields,
        };

        let findings = validate_arithmetic(&document);
        if !findings.is_empty() {
            let joined = findings
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            return Err(decoding_error(format!("inconsistent totals: {joined}")));
        }

        Ok(document)
    }
}

impl ParsedLine {
    fn into_line_item(self, index: usize) -> Result<LineItem> {
        let ctx = |field: &str| format!("detalle[{index}]/{field}");
        if self.codigo.as_deref() != Some(IVA_TAX_CODE) {
            return Err(decoding_error(format!(
                "{} must be {IVA_TAX_CODE}",
                ctx("impuesto/codigo")
            )));
        }
        let tax_rate = parse_rate(self.codigo_porcentaje, &ctx("impuesto"))?;
        let tarifa = parse_decimal(&required(self.tarifa, &ctx("impuesto/tarifa"))?)?;
        if tarifa != tax_rate.percentage() {
            return Err(decoding_error(format!(
                "{} {tarifa} does not match codigoPorcentaje {}",
                ctx("impuesto/tarifa"),
                tax_rate.code()
            )));
        }

        Ok(LineItem {
            main_code: required(self.codigo_principal, &ctx("codigoPrincipal"))?,
            auxiliary_code: self.codigo_auxiliar,
            description: required(self.descripcion, &ctx("descripcion"))?,
            quantity: parse_decimal(&required(self.cantidad, &ctx("cantidad"))?)?,
            unit_price: parse_decimal(&required(self.precio_unitario, &ctx("precioUnitario"))?)?,
            discount: parse_decimal(&required(self.descuento, &ctx("descuento"))?)?,
            tax_rate,
        })
    }
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    value.ok_or_else(|| decoding_error(format!("missing {field}")))
}

fn parse_decimal(s: &str) -> Result<Decimal> {
    Decimal::from_str(s).map_err(|e| decoding_error(format!("invalid decimal '{s}': {e}")))
}

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .map_err(|e| decoding_error(format!("invalid fechaEmision '{s}': {e}")))
}

fn parse_rate(code: Option<String>, context: &str) -> Result<TaxRate> {
    let code = required(code, &format!("{context}/codigoPorcentaje"))?;
    code.parse::<u8>()
        .ok()
        .and_then(TaxRate::from_code)
        .ok_or_else(|| decoding_error(format!("unknown codigoPorcentaje '{code}' in {context}")))
}
