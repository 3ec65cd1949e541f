use crate::config::{Config, STUDENT_ID_PLACEHOLDER};
use crate::diagnostics::RequestDescription;
use crate::errors::AppError;
use crate::models::{self, Boleto, Student, BOLETO_LIST_KEYS, STUDENT_LIST_KEYS};
use chrono::NaiveDate;
use serde_json::Value;
use std::collections::VecDeque;

/// Joins a base URL and an endpoint path, keeping any path on the base
/// (e.g. `https://host/api` + `/alunos` gives `https://host/api/alunos`).
pub fn join_url(base_url: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

/// Builds `"{prefix} {token}"`, trimmed so an empty prefix leaves the bare token.
pub fn auth_value(prefix: &str, token: &str) -> String {
    format!("{} {}", prefix, token).trim().to_string()
}

fn set_header(headers: &mut Vec<(String, String)>, name: &str, value: String) {
    match headers
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        Some(existing) => *existing = (name.to_string(), value),
        None => headers.push((name.to_string(), value)),
    }
}

/// Headers sent on every SIGA request: accept-JSON, the configured extra
/// headers, then the auth header. Later entries win on name clashes.
pub fn siga_headers(config: &Config) -> Vec<(String, String)> {
    let mut headers = Vec::with_capacity(config.siga_extra_headers.len() + 2);
    set_header(&mut headers, "Accept", "application/json".to_string());
    for (name, value) in &config.siga_extra_headers {
        set_header(&mut headers, name, value.clone());
    }
    set_header(
        &mut headers,
        &config.siga_auth_header,
        auth_value(&config.siga_auth_prefix, &config.siga_auth_token),
    );
    headers
}

/// The request for one page of active students.
pub fn students_request(config: &Config, year: i32, page: u32) -> RequestDescription {
    RequestDescription {
        url: join_url(&config.siga_base_url, &config.siga_students_endpoint),
        headers: siga_headers(config),
        params: vec![
            ("ativo".to_string(), "true".to_string()),
            ("ano".to_string(), year.to_string()),
            ("page".to_string(), page.to_string()),
            ("pageSize".to_string(), config.siga_page_size.to_string()),
        ],
    }
}

/// The request for a student's boletos due in `[start, end]`.
pub fn boletos_request(
    config: &Config,
    student_id: &str,
    start: NaiveDate,
    end: NaiveDate,
) -> RequestDescription {
    let endpoint = config
        .siga_boletos_endpoint
        .replace(STUDENT_ID_PLACEHOLDER, student_id);
    let mut params = vec![
        ("dataVencimentoInicio".to_string(), start.to_string()),
        ("dataVencimentoFim".to_string(), end.to_string()),
    ];
    if let Some(ref name) = config.siga_boletos_student_param {
        params.push((name.clone(), student_id.to_string()));
    }

    RequestDescription {
        url: join_url(&config.siga_base_url, &endpoint),
        headers: siga_headers(config),
        params,
    }
}

/// Client for the SIGA roster API.
#[derive(Clone)]
pub struct SigaClient<'a> {
    client: reqwest::Client,
    config: &'a Config,
}

impl<'a> SigaClient<'a> {
    /// Creates a new `SigaClient` with the configured per-call timeout.
    ///
    /// # Arguments
    ///
    /// * `config` - The run configuration, borrowed for the client's lifetime.
    pub fn new(config: &'a Config) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| AppError::TransportError(format!("Failed to create SIGA client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Describes the "list students" request without sending it.
    pub fn build_students_request(&self, year: i32, page: u32) -> RequestDescription {
        students_request(self.config, year, page)
    }

    /// Lazily enumerates active students for `year`, one page per request.
    ///
    /// # Arguments
    ///
    /// * `year` - The school year sent as the `ano` query parameter.
    ///
    /// # Returns
    ///
    /// * `StudentPages` - A single-pass cursor; no request is issued until it is advanced.
    pub fn students(&self, year: i32) -> StudentPages<'_, 'a> {
        StudentPages {
            client: self,
            year,
            page: 1,
            buffer: VecDeque::new(),
            exhausted: false,
            requests: 0,
        }
    }

    /// Fetches the boletos of `student_id` whose due date lies in `[start, end]`.
    ///
    /// Items without a parseable due date, or due outside the window, are
    /// dropped. The response order is preserved.
    ///
    /// # Arguments
    ///
    /// * `student_id` - The SIGA student id substituted into the boletos endpoint.
    /// * `start` - First due date of the window (inclusive).
    /// * `end` - Last due date of the window (inclusive).
    ///
    /// # Returns
    ///
    /// * `Result<Vec<Boleto>, AppError>` - The due boletos, or a `TransportError`.
    pub async fn due_boletos(
        &self,
        student_id: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<Boleto>, AppError> {
        let request = boletos_request(self.config, student_id, start, end);
        tracing::info!("Fetching boletos for student {} from SIGA", student_id);

        let body = self.get_json(&request).await?;
        let items = models::first_list(&body, BOLETO_LIST_KEYS);
        let boletos: Vec<Boleto> = items
            .iter()
            .filter_map(Boleto::from_siga_item)
            .filter(|boleto| boleto.is_due_between(start, end))
            .collect();

        tracing::debug!(
            "Student {}: {} of {} boletos due between {} and {}",
            student_id,
            boletos.len(),
            items.len(),
            start,
            end
        );
        Ok(boletos)
    }

    async fn get_json(&self, request: &RequestDescription) -> Result<Value, AppError> {
        let mut builder = self.client.get(&request.url).query(&request.params);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| AppError::TransportError(format!("SIGA request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::error!("SIGA returned error {}: {}", status, error_text);
            return Err(AppError::TransportError(format!(
                "SIGA returned {} for {}: {}",
                status, request.url, error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::TransportError(format!("Failed to parse SIGA response: {}", e))
        })
    }
}

/// Single-pass cursor over the active students of one year.
///
/// A page is requested only once the previously fetched students have been
/// consumed. Enumeration stops after the page whose number reaches the
/// declared total page count, or after the first empty page.
pub struct StudentPages<'c, 'a> {
    client: &'c SigaClient<'a>,
    year: i32,
    page: u32,
    buffer: VecDeque<Student>,
    exhausted: bool,
    requests: usize,
}

impl StudentPages<'_, '_> {
    /// Next student, fetching the next page when the current one is used up.
    ///
    /// # Returns
    ///
    /// * `Result<Option<Student>, AppError>` - `None` once enumeration has finished.
    pub async fn next(&mut self) -> Result<Option<Student>, AppError> {
        loop {
            if let Some(student) = self.buffer.pop_front() {
                return Ok(Some(student));
            }
            match self.next_page().await? {
                Some(batch) => self.buffer.extend(batch),
                None => return Ok(None),
            }
        }
    }

    /// Fetches the next page as a batch.
    ///
    /// Returns `None` once enumeration has finished. The final page may be
    /// returned as an empty batch.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Student>>, AppError> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self.page;
        let request = self.client.build_students_request(self.year, page);
        tracing::debug!("Fetching SIGA students page {} for year {}", page, self.year);

        self.requests += 1;
        let body = match self.client.get_json(&request).await {
            Ok(body) => body,
            Err(e) => {
                self.exhausted = true;
                return Err(e);
            }
        };

        let students: Vec<Student> = models::first_list(&body, STUDENT_LIST_KEYS)
            .iter()
            .map(Student::from_siga_item)
            .collect();

        match models::total_pages(&body) {
            Some(total) if u64::from(page) >= total => self.exhausted = true,
            _ if students.is_empty() => self.exhausted = true,
            _ => self.page += 1,
        }

        tracing::info!("SIGA students page {}: {} students", page, students.len());
        Ok(Some(students))
    }

    /// Number of page requests issued so far.
    pub fn requests_issued(&self) -> usize {
        self.requests
    }

    /// True once no further page will be requested.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted && self.buffer.is_empty()
    }
}
