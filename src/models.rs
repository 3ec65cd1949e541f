use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use serde_json::Value;

// ============ SIGA field-name tables ============
//
// SIGA deployments disagree on field names. Each attribute lists its
// candidate keys in priority order; the first non-empty value wins.

pub const STUDENT_ID_KEYS: &[&str] = &["id", "codigo"];
pub const STUDENT_NAME_KEYS: &[&str] = &["nome", "name"];
pub const STUDENT_PHONE_KEYS: &[&str] = &["telefone", "celular", "phone"];

pub const BOLETO_ID_KEYS: &[&str] = &["id", "codigo"];
pub const BOLETO_DUE_DATE_KEYS: &[&str] = &["dataVencimento", "vencimento"];
pub const BOLETO_AMOUNT_KEYS: &[&str] = &["valor", "valor_boleto", "valorBoleto"];
pub const BOLETO_BARCODE_KEYS: &[&str] = &["codigoBarras", "codigo_barras"];
pub const BOLETO_LINE_DIGIT_KEYS: &[&str] = &["linhaDigitavel", "linha_digitavel"];

/// Keys holding the item list of a student page.
pub const STUDENT_LIST_KEYS: &[&str] = &["items", "data"];
/// Keys holding the item list of a boletos response.
pub const BOLETO_LIST_KEYS: &[&str] = &["items", "data", "boletos"];
/// Keys holding the declared page count of a student page.
pub const TOTAL_PAGES_KEYS: &[&str] = &["totalPages", "pages"];

// ============ Domain Models ============

/// An active student as listed by SIGA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    /// SIGA student id. Records with an empty id are not actionable.
    pub id: String,
    /// Student name, possibly empty.
    pub name: String,
    /// Contact phone used as the MegaZap recipient.
    pub phone: Option<String>,
}

impl Student {
    /// Builds a student from one item of a SIGA student page.
    pub fn from_siga_item(item: &Value) -> Self {
        Self {
            id: first_text(item, STUDENT_ID_KEYS).unwrap_or_default(),
            name: first_text(item, STUDENT_NAME_KEYS).unwrap_or_default(),
            phone: first_text(item, STUDENT_PHONE_KEYS),
        }
    }
}

/// A payable invoice with its payment codes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Boleto {
    pub id: String,
    pub due_date: NaiveDate,
    /// Defaults to 0.0 when SIGA omits the amount.
    pub amount: f64,
    pub barcode: String,
    pub line_digit: String,
}

impl Boleto {
    /// Builds a boleto from one SIGA item.
    ///
    /// Returns `None` when no due date can be parsed; every other field
    /// falls back to an empty/zero value.
    pub fn from_siga_item(item: &Value) -> Option<Self> {
        let due_date = BOLETO_DUE_DATE_KEYS.iter().find_map(|key| {
            item.get(*key)
                .and_then(as_text)
                .and_then(|raw| parse_due_date(&raw))
        })?;

        Some(Self {
            id: first_text(item, BOLETO_ID_KEYS).unwrap_or_default(),
            due_date,
            amount: BOLETO_AMOUNT_KEYS
                .iter()
                .find_map(|key| item.get(*key).and_then(parse_amount))
                .unwrap_or(0.0),
            barcode: first_text(item, BOLETO_BARCODE_KEYS).unwrap_or_default(),
            line_digit: first_text(item, BOLETO_LINE_DIGIT_KEYS).unwrap_or_default(),
        })
    }

    /// True when the due date lies in `[start, end]`.
    pub fn is_due_between(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start <= self.due_date && self.due_date <= end
    }
}

// ============ Extraction helpers ============

/// Renders a scalar as text: strings are trimmed, numbers are coerced.
/// Empty strings, null, booleans and containers yield `None`.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First candidate key whose value renders as non-empty text.
pub fn first_text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| item.get(*key).and_then(as_text))
}

/// First candidate key holding a non-empty array.
pub fn first_list<'a>(body: &'a Value, keys: &[&str]) -> &'a [Value] {
    keys.iter()
        .find_map(|key| {
            body.get(*key)
                .and_then(Value::as_array)
                .filter(|items| !items.is_empty())
        })
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Declared page count, if SIGA sent a positive one.
pub fn total_pages(body: &Value) -> Option<u64> {
    TOTAL_PAGES_KEYS.iter().find_map(|key| {
        let pages: u64 = match body.get(*key)? {
            Value::Number(n) => n.as_u64().or_else(|| n.as_f64().map(|f| f as u64))?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        (pages > 0).then_some(pages)
    })
}

/// Parses a SIGA due date.
///
/// Tries a plain calendar date first, then full timestamps (RFC 3339 or
/// naive), keeping only the date part.
pub fn parse_due_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.date_naive());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|ts| ts.date())
}

/// Parses an amount from a JSON number or numeric string ("50.00", "50,00").
pub fn parse_amount(value: &Value) -> Option<f64> {
    let amount = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<f64>()
                .ok()
                .or_else(|| s.replace(',', ".").parse::<f64>().ok())?
        }
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}
