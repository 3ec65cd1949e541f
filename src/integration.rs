//! End-to-end SIGA → MegaZap run.
//!
//! Students are processed one at a time, in roster order. Any transport
//! error aborts the whole run; nothing is retried or skipped silently.

use crate::config::Config;
use crate::errors::{AppError, ResultExt};
use crate::megazap_client::MegaZapClient;
use crate::payload::build_payload;
use crate::siga_client::SigaClient;
use chrono::NaiveDate;
use serde::Serialize;
use serde_json::Value;

/// Counters for one completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub students_seen: usize,
    /// Students ignored because SIGA returned no id.
    pub students_skipped: usize,
    pub boletos_due: usize,
    pub notifications_sent: usize,
    /// Payloads logged instead of sent (dry-run).
    pub dry_run_logged: usize,
}

/// Runs the integration for today's due-date window.
pub async fn run(config: &Config, dry_run: bool) -> Result<RunSummary, AppError> {
    let (start, end) = config.due_window();
    run_for_window(config, start, end, dry_run).await
}

/// Runs the integration for boletos due in `[start, end]`.
pub async fn run_for_window(
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
    dry_run: bool,
) -> Result<RunSummary, AppError> {
    let siga_client = SigaClient::new(config)?;
    let megazap_client = MegaZapClient::new(config)?;
    let mut summary = RunSummary::default();

    tracing::info!(
        "Starting SIGA → MegaZap run for year {} (due {} to {}, dry_run={})",
        config.siga_active_year,
        start,
        end,
        dry_run
    );

    let mut students = siga_client.students(config.siga_active_year);
    while let Some(student) = students
        .next()
        .await
        .context("Listing active students from SIGA")?
    {
        summary.students_seen += 1;
        if student.id.is_empty() {
            tracing::warn!(
                "Student without id ignored: {}",
                serde_json::to_value(&student).unwrap_or_default()
            );
            summary.students_skipped += 1;
            continue;
        }

        let boletos = siga_client
            .due_boletos(&student.id, start, end)
            .await
            .with_context(|| format!("Fetching boletos for student {}", student.id))?;
        if boletos.is_empty() {
            continue;
        }
        summary.boletos_due += boletos.len();

        for boleto in &boletos {
            let payload = build_payload(config, &student, boleto);
            if dry_run {
                let payload = Value::Object(payload);
                tracing::info!("Dry-run MegaZap payload: {}", payload);
                summary.dry_run_logged += 1;
                continue;
            }

            let response = megazap_client
                .send_qrcode(&payload)
                .await
                .with_context(|| {
                    format!(
                        "Sending MegaZap notification for student {} boleto {}",
                        student.id, boleto.id
                    )
                })?;
            tracing::info!(
                "MegaZap sent student={} boleto={} response={}",
                student.id,
                boleto.id,
                response
            );
            summary.notifications_sent += 1;
        }
    }

    tracing::info!(
        "Run finished: {}",
        serde_json::to_value(&summary).unwrap_or_default()
    );
    Ok(summary)
}
