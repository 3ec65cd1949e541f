use crate::config::Config;
use crate::errors::AppError;
use crate::siga_client::{auth_value, join_url};
use serde_json::{Map, Value};

/// Client for the MegaZap messaging API.
#[derive(Clone)]
pub struct MegaZapClient<'a> {
    client: reqwest::Client,
    config: &'a Config,
}

impl<'a> MegaZapClient<'a> {
    /// Creates a new `MegaZapClient` with the configured per-call timeout.
    ///
    /// # Arguments
    ///
    /// * `config` - The run configuration, borrowed for the client's lifetime.
    pub fn new(config: &'a Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| {
                AppError::TransportError(format!("Failed to create MegaZap client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    /// Sends one notification payload to the QR-code endpoint.
    ///
    /// Sent once, without retry. The response body is returned as-is:
    /// JSON when it parses, a JSON string otherwise, `null` when empty.
    ///
    /// # Arguments
    ///
    /// * `payload` - The notification payload, posted as the JSON body.
    ///
    /// # Returns
    ///
    /// * `Result<serde_json::Value, AppError>` - The MegaZap response, or a
    ///   `TransportError` on a non-success status.
    pub async fn send_qrcode(&self, payload: &Map<String, Value>) -> Result<Value, AppError> {
        let url = join_url(
            &self.config.megazap_base_url,
            &self.config.megazap_qrcode_endpoint,
        );
        tracing::debug!("Posting notification to MegaZap: {}", url);

        let response = self
            .client
            .post(&url)
            .header(
                self.config.megazap_auth_header.as_str(),
                auth_value(
                    &self.config.megazap_auth_prefix,
                    &self.config.megazap_auth_token,
                ),
            )
            .header("Content-Type", "application/json")
            .json(payload)
            .send()
            .await
            .map_err(|e| AppError::TransportError(format!("MegaZap request failed: {}", e)))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::TransportError(format!("Failed to read MegaZap response: {}", e))
        })?;

        if !status.is_success() {
            tracing::error!("MegaZap returned error {}: {}", status, body);
            return Err(AppError::TransportError(format!(
                "MegaZap send failed {}: {}",
                status, body
            )));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}
