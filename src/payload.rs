use crate::config::Config;
use crate::models::{Boleto, Student};
use chrono::NaiveDate;
use serde_json::{json, Map, Value};

pub const NAME_PLACEHOLDER: &str = "{nome}";
pub const DUE_DATE_PLACEHOLDER: &str = "{data_vencimento}";

/// Renders the default notification message.
///
/// Only `{nome}` and `{data_vencimento}` are substituted; any other text
/// is kept verbatim.
pub fn render_message(template: &str, name: &str, due_date: NaiveDate) -> String {
    template
        .replace(NAME_PLACEHOLDER, name)
        .replace(DUE_DATE_PLACEHOLDER, &due_date.to_string())
}

/// Builds the MegaZap payload for one boleto.
///
/// Starts from a copy of the configured template and fills each computed
/// field only when the template does not already define that key, so
/// operator-supplied values always win.
pub fn build_payload(config: &Config, student: &Student, boleto: &Boleto) -> Map<String, Value> {
    let mut payload = config.megazap_payload_template.clone();
    let due_date = boleto.due_date.to_string();
    let message = render_message(
        &config.megazap_default_message,
        &student.name,
        boleto.due_date,
    );

    let defaults = [
        ("telefone", json!(student.phone)),
        ("mensagem", json!(message)),
        ("valor", json!(boleto.amount)),
        ("codigoBarras", json!(boleto.barcode)),
        ("linhaDigitavel", json!(boleto.line_digit)),
        ("dataVencimento", json!(due_date)),
    ];
    for (key, value) in defaults {
        payload.entry(key).or_insert(value);
    }

    payload
}
