use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use rust_decimal::{Decimal, RoundingStrategy};
use std::io::Cursor;

use crate::core::ComprobanteError;
use crate::core::error::Result;

fn xml_io(e: std::io::Error) -> ComprobanteError {
    ComprobanteError::Encoding(format!("XML write error: {e}"))
}

pub struct XmlWriter {
    writer: Writer<Cursor<Vec<u8>>>,
}

impl XmlWriter {
    pub fn new() -> Result<Self> {
        let mut writer = Self {
            writer: Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2),
        };
        writer.write(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
        Ok(writer)
    }

    pub fn into_string(self) -> Result<String> {
        let buf = self.writer.into_inner().into_inner();
        String::from_utf8(buf).map_err(|e| ComprobanteError::Encoding(format!("XML UTF-8 error: {e}")))
    }

    fn write(&mut self, event: Event<'_>) -> Result<()> {
        self.writer.write_event(event).map_err(xml_io)
    }

    fn open(name: &str, attrs: &[(&str, &str)]) -> BytesStart<'static> {
        let mut elem = BytesStart::new(name.to_owned());
        for (k, v) in attrs {
            elem.push_attribute((*k, *v));
        }
        elem
    }

    /// `<name attrs>text</name>`, text escaped and written verbatim.
    fn leaf(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) -> Result<&mut Self> {
        self.write(Event::Start(Self::open(name, attrs)))?;
        self.write(Event::Text(BytesText::new(text)))?;
        self.end_element(name)
    }

    pub fn start_element(&mut self, name: &str) -> Result<&mut Self> {
        self.start_element_with_attrs(name, &[])
    }

    pub fn start_element_with_attrs(&mut self, name: &str, attrs: &[(&str, &str)]) -> Result<&mut Self> {
        self.write(Event::Start(Self::open(name, attrs)))?;
        Ok(self)
    }

    pub fn end_element(&mut self, name: &str) -> Result<&mut Self> {
        self.write(Event::End(BytesEnd::new(name)))?;
        Ok(self)
    }

    pub fn text_element(&mut self, name: &str, text: &str) -> Result<&mut Self> {
        self.leaf(name, &[], text)
    }

    pub fn text_element_with_attrs(
        &mut self,
        name: &str,
        text: &str,
        attrs: &[(&str, &str)],
    ) -> Result<&mut Self> {
        self.leaf(name, attrs, text)
    }

    /// Write an optional element. `None` writes nothing; a blank value is
    /// an error since it would decode as absent.
    pub fn optional_element(
        &mut self,
        name: &str,
        attrs: &[(&str, &str)],
        value: Option<&str>,
    ) -> Result<&mut Self> {
        match value {
            None => Ok(self),
            Some(v) if v.trim().is_empty() => Err(ComprobanteError::Encoding(format!(
                "optional {name} must be omitted, not written blank"
            ))),
            Some(v) => self.leaf(name, attrs, v),
        }
    }

    /// Write a monetary amount with exactly 2 fractional digits.
    pub fn money_element(&mut self, name: &str, amount: Decimal) -> Result<&mut Self> {
        self.text_element(name, &format_money(amount))
    }

    /// Write a quantity or unit price with exactly 6 fractional digits.
    pub fn precise_element(&mut self, name: &str, value: Decimal) -> Result<&mut Self> {
        self.text_element(name, &format_precise(value))
    }
}

fn format_fixed(d: Decimal, dp: u32) -> String {
    let mut r = d.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);
    r.rescale(dp);
    if r.is_zero() {
        r.set_sign_positive(true);
    }
    r.to_string()
}

/// Monetary amounts: exactly 2 fractional digits, half-up, no separators.
pub fn format_money(d: Decimal) -> String {
    format_fixed(d, 2)
}

/// Quantities and unit prices: exactly 6 fractional digits.
pub fn format_precise(d: Decimal) -> String {
    format_fixed(d, 6)
}

/// `tarifa`: the percentage without trailing zeros ("15", "0", "12.5").
pub fn format_rate(d: Decimal) -> String {
    d.normalize().to_string()
}
