use crate::diagnostics::redact_value;
use crate::errors::AppError;
use crate::siga_client::auth_value;
use reqwest::header::{HeaderName, HeaderValue};
use chrono::{Days, Local, NaiveDate};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

const DEFAULT_SIGA_BASE_URL: &str = "https://siga04.activesoft.com.br/api";
const DEFAULT_MEGAZAP_BASE_URL: &str = "https://api.megazap.com.br";
const DEFAULT_MESSAGE: &str = "Olá {nome}, seu boleto vence em {data_vencimento}.";

/// Placeholder replaced by the student id in `siga_boletos_endpoint`.
pub const STUDENT_ID_PLACEHOLDER: &str = "{aluno_id}";

/// Connection parameters for SIGA and MegaZap, built once per run.
#[derive(Clone)]
pub struct Config {
    pub siga_base_url: String,
    pub siga_auth_header: String,
    pub siga_auth_token: String,
    pub siga_auth_prefix: String,
    pub siga_students_endpoint: String,
    pub siga_boletos_endpoint: String,
    /// Query parameter carrying the student id on the boletos call, if any.
    pub siga_boletos_student_param: Option<String>,
    pub siga_active_year: i32,
    pub siga_page_size: u32,
    /// Static headers sent on every SIGA request, in configuration order.
    pub siga_extra_headers: Vec<(String, String)>,
    pub megazap_base_url: String,
    pub megazap_auth_header: String,
    pub megazap_auth_token: String,
    pub megazap_auth_prefix: String,
    pub megazap_qrcode_endpoint: String,
    pub megazap_default_message: String,
    pub megazap_payload_template: Map<String, Value>,
    pub http_timeout: Duration,
    pub due_window_days: u64,
}

impl Config {
    /// Loads the configuration from the process environment (and `.env`).
    ///
    /// `require_megazap_token` is false for dry-run and diagnostics
    /// invocations, which never call MegaZap.
    pub fn from_env(require_megazap_token: bool) -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok(), require_megazap_token)
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F, require_megazap_token: bool) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let siga_auth_token = lookup("SIGA_AUTH_TOKEN")
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| AppError::ConfigError("SIGA_AUTH_TOKEN is required".to_string()))?;

        let megazap_auth_token = lookup("MEGAZAP_AUTH_TOKEN").unwrap_or_default();
        if require_megazap_token && megazap_auth_token.trim().is_empty() {
            return Err(AppError::ConfigError(
                "MEGAZAP_AUTH_TOKEN is required".to_string(),
            ));
        }

        let config = Self {
            siga_base_url: parse_base_url("SIGA_BASE_URL", var("SIGA_BASE_URL", DEFAULT_SIGA_BASE_URL))?,
            siga_auth_header: var("SIGA_AUTH_HEADER", "Authorization"),
            siga_auth_token,
            siga_auth_prefix: var("SIGA_AUTH_PREFIX", "Bearer"),
            siga_students_endpoint: var("SIGA_STUDENTS_ENDPOINT", "/alunos"),
            siga_boletos_endpoint: var("SIGA_BOLETOS_ENDPOINT", "/alunos/{aluno_id}/boletos"),
            siga_boletos_student_param: lookup("SIGA_BOLETOS_STUDENT_PARAM")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty()),
            siga_active_year: var("SIGA_ACTIVE_YEAR", "2026").trim().parse().map_err(|_| {
                AppError::ConfigError("SIGA_ACTIVE_YEAR must be a valid year".to_string())
            })?,
            siga_page_size: var("SIGA_PAGE_SIZE", "100")
                .trim()
                .parse()
                .map_err(|_| AppError::ConfigError("SIGA_PAGE_SIZE must be a valid number".to_string()))
                .and_then(|size: u32| {
                    if size == 0 {
                        return Err(AppError::ConfigError(
                            "SIGA_PAGE_SIZE must be greater than zero".to_string(),
                        ));
                    }
                    Ok(size)
                })?,
            siga_extra_headers: parse_extra_headers(&var("SIGA_EXTRA_HEADERS_JSON", "{}"))?,
            megazap_base_url: parse_base_url(
                "MEGAZAP_BASE_URL",
                var("MEGAZAP_BASE_URL", DEFAULT_MEGAZAP_BASE_URL),
            )?,
            megazap_auth_header: var("MEGAZAP_AUTH_HEADER", "Authorization"),
            megazap_auth_token,
            megazap_auth_prefix: var("MEGAZAP_AUTH_PREFIX", "Bearer"),
            megazap_qrcode_endpoint: var("MEGAZAP_QRCODE_ENDPOINT", "/whatsapp/qrcode"),
            megazap_default_message: var("MEGAZAP_DEFAULT_MESSAGE", DEFAULT_MESSAGE),
            megazap_payload_template: parse_json_object(
                "MEGAZAP_PAYLOAD_TEMPLATE_JSON",
                &var("MEGAZAP_PAYLOAD_TEMPLATE_JSON", "{}"),
            )?,
            http_timeout: var("HTTP_TIMEOUT_SECS", "30")
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| AppError::ConfigError("HTTP_TIMEOUT_SECS must be a valid number".to_string()))?,
            due_window_days: var("DUE_WINDOW_DAYS", "5").trim().parse().map_err(|_| {
                AppError::ConfigError("DUE_WINDOW_DAYS must be a valid number".to_string())
            })?,
        };

        validate_header(
            "SIGA_AUTH_HEADER",
            &config.siga_auth_header,
            &auth_value(&config.siga_auth_prefix, &config.siga_auth_token),
        )?;
        validate_header(
            "MEGAZAP_AUTH_HEADER",
            &config.megazap_auth_header,
            &auth_value(&config.megazap_auth_prefix, &config.megazap_auth_token),
        )?;
        for (name, value) in &config.siga_extra_headers {
            validate_header("SIGA_EXTRA_HEADERS_JSON", name, value)?;
        }

        // Log successful configuration load (without sensitive values)
        tracing::debug!("SIGA Base URL: {}", config.siga_base_url);
        tracing::debug!("MegaZap Base URL: {}", config.megazap_base_url);
        tracing::debug!(
            "SIGA active year {} with page size {}",
            config.siga_active_year,
            config.siga_page_size
        );

        Ok(config)
    }

    /// Today's due-date window, reading the clock once.
    pub fn due_window(&self) -> (NaiveDate, NaiveDate) {
        self.due_window_from(Local::now().date_naive())
    }

    /// The due-date window anchored at `today`.
    pub fn due_window_from(&self, today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let end = today
            .checked_add_days(Days::new(self.due_window_days))
            .unwrap_or(NaiveDate::MAX);
        (today, end)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("siga_base_url", &self.siga_base_url)
            .field("siga_auth_header", &self.siga_auth_header)
            .field("siga_auth_token", &redact_value(&self.siga_auth_token, 4))
            .field("siga_students_endpoint", &self.siga_students_endpoint)
            .field("siga_boletos_endpoint", &self.siga_boletos_endpoint)
            .field("siga_active_year", &self.siga_active_year)
            .field("siga_page_size", &self.siga_page_size)
            .field("megazap_base_url", &self.megazap_base_url)
            .field("megazap_auth_header", &self.megazap_auth_header)
            .field("megazap_auth_token", &redact_value(&self.megazap_auth_token, 4))
            .field("megazap_qrcode_endpoint", &self.megazap_qrcode_endpoint)
            .field("http_timeout", &self.http_timeout)
            .field("due_window_days", &self.due_window_days)
            .finish_non_exhaustive()
    }
}

fn parse_base_url(name: &str, url: String) -> Result<String, AppError> {
    let url = url.trim();
    if url.is_empty() {
        return Err(AppError::ConfigError(format!("{} cannot be empty", name)));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(AppError::ConfigError(format!(
            "{} must start with http:// or https://",
            name
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

/// Rejects header names or values reqwest would refuse at send time.
/// Values are not echoed.
fn validate_header(setting: &str, name: &str, value: &str) -> Result<(), AppError> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
        AppError::ConfigError(format!("{} has an invalid header name '{}'", setting, name))
    })?;
    HeaderValue::from_str(value).map_err(|_| {
        AppError::ConfigError(format!(
            "{} has an invalid value for header '{}'",
            setting, name
        ))
    })?;
    Ok(())
}

fn parse_json_object(name: &str, raw: &str) -> Result<Map<String, Value>, AppError> {
    if raw.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::ConfigError(format!(
            "{} must be a JSON object",
            name
        ))),
        Err(e) => Err(AppError::ConfigError(format!(
            "{} must be valid JSON: {}",
            name, e
        ))),
    }
}

fn parse_extra_headers(raw: &str) -> Result<Vec<(String, String)>, AppError> {
    parse_json_object("SIGA_EXTRA_HEADERS_JSON", raw)?
        .into_iter()
        .map(|(name, value)| match value {
            Value::String(s) => Ok((name, s)),
            Value::Number(n) => Ok((name, n.to_string())),
            Value::Bool(b) => Ok((name, b.to_string())),
            _ => Err(AppError::ConfigError(format!(
                "SIGA_EXTRA_HEADERS_JSON header '{}' must be a string, number or boolean",
                name
            ))),
        })
        .collect()
}
