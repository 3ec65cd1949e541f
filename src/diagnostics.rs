//! Troubleshooting helpers for the SIGA connection.
//!
//! Describes the exact "list students" request without sending it and masks
//! credentials so the description can be logged safely.

use crate::config::Config;
use crate::errors::AppError;
use crate::siga_client;

/// Placeholder for an empty credential.
pub const EMPTY_PLACEHOLDER: &str = "<vazio>";
/// Placeholder for credentials too short to partially reveal.
pub const SHORT_PLACEHOLDER: &str = "***";
/// Placeholder for every non-auth header value.
pub const HEADER_PLACEHOLDER: &str = "<redacted>";
/// Default number of trailing characters a long token may reveal.
pub const DEFAULT_VISIBLE: usize = 4;
/// Shortest token that is partially revealed instead of replaced.
pub const MIN_MASKABLE: usize = 6;

/// A fully built outgoing request that has not been sent.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescription {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
}

impl RequestDescription {
    /// Value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The URL with its query string encoded.
    pub fn full_url(&self) -> Result<String, AppError> {
        url::Url::parse_with_params(&self.url, &self.params)
            .map(String::from)
            .map_err(|e| AppError::ConfigError(format!("Invalid request URL {}: {}", self.url, e)))
    }
}

/// Describes the request the roster client issues for one student page.
pub fn describe_students_request(config: &Config, year: i32, page: u32) -> RequestDescription {
    siga_client::students_request(config, year, page)
}

/// Masks a credential.
///
/// Tokens of at most `visible` characters (and anything shorter than
/// `MIN_MASKABLE`) collapse to a fixed placeholder. Longer tokens keep their
/// first two characters and a suffix of at most `visible` characters, capped
/// at a quarter of the token, so the masked form is always shorter than the
/// token and the middle segment is never shown.
pub fn redact_value(value: &str, visible: usize) -> String {
    let chars: Vec<char> = value.chars().collect();
    if chars.is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }
    if chars.len() <= visible || chars.len() < MIN_MASKABLE {
        return SHORT_PLACEHOLDER.to_string();
    }
    let suffix = visible
        .min(chars.len() / 4)
        .min(chars.len() - MIN_MASKABLE);
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - suffix..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Masks an authorization value, keeping the scheme (e.g. `Bearer`) readable.
pub fn redact_authorization(value: &str) -> String {
    if value.is_empty() {
        return EMPTY_PLACEHOLDER.to_string();
    }
    match value.split_once(' ') {
        Some((scheme, token)) => format!("{} {}", scheme, redact_value(token, DEFAULT_VISIBLE)),
        None => redact_value(value, DEFAULT_VISIBLE),
    }
}

/// Redacts a header list: the auth header is masked, all others hidden.
pub fn redact_headers(headers: &[(String, String)], auth_header: &str) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let masked = if name.eq_ignore_ascii_case(auth_header) {
                redact_authorization(value)
            } else {
                HEADER_PLACEHOLDER.to_string()
            };
            (name.clone(), masked)
        })
        .collect()
}

/// Logs the first student-page request for the active year with credentials
/// masked. No network call is made.
pub fn debug_siga(config: &Config) -> Result<RequestDescription, AppError> {
    let request = describe_students_request(config, config.siga_active_year, 1);
    let redacted = RequestDescription {
        headers: redact_headers(&request.headers, &config.siga_auth_header),
        ..request
    };

    tracing::info!("SIGA debug URL: {}", redacted.url);
    tracing::info!("SIGA debug full URL: {}", redacted.full_url()?);
    tracing::info!("SIGA debug params: {:?}", redacted.params);
    tracing::info!("SIGA debug headers: {:?}", redacted.headers);

    Ok(redacted)
}
