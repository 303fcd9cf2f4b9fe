//! Asynchronous CSV client import
//!
//! `start_import` validates the upload, records a pending report and queues a
//! job. `process_import` runs the job: it parses the whole file, maps each
//! row, creates clients one by one, collects per-row errors and finishes the
//! report, then notifies the owner on their private channel.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::broadcaster::{self, Broadcaster};
use super::clients::{ClientService, SaveError};
use super::field_mapper;
use crate::db::Store;
use crate::types::{
    import_notifications_channel, CsvImportAccepted, CsvImportRequest, ImportErrorDetail,
    ImportNotification, ImportReport, ImportSummary, QueuedCsvImportJob, UploadedFile,
};

pub const ACCEPTED_MESSAGE: &str = "Importação iniciada! Você será notificado quando concluída.";
pub const FAILED_MESSAGE: &str = "Erro durante a importação. Tente novamente.";
const INTERNAL_MESSAGE: &str = "Erro interno do servidor";

/// Upload rejected before any report exists
#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ImportError {
    /// HTTP-equivalent status
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 422,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to show the uploader
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => msg.clone(),
            Self::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

/// Where accepted uploads wait for a worker
#[async_trait]
pub trait ImportQueue: Send + Sync {
    async fn enqueue(&self, job: QueuedCsvImportJob) -> Result<()>;
}

/// Outcome of one `process_import` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportRun {
    Completed(ImportSummary),
    Failed(String),
    /// Report was not pending (unknown id or redelivered job)
    Skipped,
}

pub fn completion_message(success_count: i32, error_count: i32) -> String {
    if error_count == 0 {
        format!("{} clientes importados com sucesso!", success_count)
    } else if success_count > 0 {
        format!(
            "{} clientes importados com sucesso. {} linhas com erro.",
            success_count, error_count
        )
    } else {
        format!("Nenhum cliente foi importado. {} linhas com erro.", error_count)
    }
}

fn is_csv(file: &UploadedFile) -> bool {
    let declared_csv = file
        .content_type
        .as_deref()
        .and_then(|ct| ct.split(';').next())
        .is_some_and(|essence| essence.trim().eq_ignore_ascii_case("text/csv"));
    let csv_suffix = file
        .filename
        .as_deref()
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(".csv"));
    declared_csv || csv_suffix
}

/// Decode upload bytes as UTF-8 (lossy) without a byte-order mark
fn decode_content(file: &UploadedFile) -> Result<String, ImportError> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(file.data.trim())
        .map_err(|_| ImportError::Validation("Por favor, envie um arquivo CSV válido".to_string()))?;
    let text = String::from_utf8_lossy(&bytes);
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

/// Non-blank lines minus the header, never negative
pub fn count_data_lines(content: &str) -> i32 {
    let lines = content.split('\n').filter(|l| !l.trim().is_empty()).count() as i32;
    (lines - 1).max(0)
}

pub struct ImportPipeline {
    store: Arc<dyn Store>,
    clients: Arc<ClientService>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl ImportPipeline {
    pub fn new(
        store: Arc<dyn Store>,
        clients: Arc<ClientService>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            store,
            clients,
            broadcaster,
        }
    }

    /// Validate the upload, create a pending report and queue the job
    pub async fn start_import(
        &self,
        user_id: Uuid,
        request: CsvImportRequest,
        queue: &dyn ImportQueue,
    ) -> Result<CsvImportAccepted, ImportError> {
        let file = request
            .csv_file
            .ok_or_else(|| ImportError::Validation("Nenhum arquivo foi enviado".to_string()))?;

        if !is_csv(&file) {
            return Err(ImportError::Validation(
                "Por favor, envie um arquivo CSV válido".to_string(),
            ));
        }

        let content = decode_content(&file)?;
        if content.trim().is_empty() {
            return Err(ImportError::Validation("O arquivo CSV está vazio".to_string()));
        }

        let total_lines = count_data_lines(&content);
        let report = self
            .store
            .create_import_report(user_id, file.filename.as_deref(), total_lines)
            .await?;

        queue
            .enqueue(QueuedCsvImportJob {
                import_report_id: report.id,
                user_id,
                csv_content: content,
                submitted_at: Utc::now(),
            })
            .await?;

        info!(
            "CSV import {} queued for user {} ({} lines)",
            report.id, user_id, total_lines
        );

        Ok(CsvImportAccepted {
            message: ACCEPTED_MESSAGE.to_string(),
            import_report_id: report.id,
            status: "processing".to_string(),
            total_lines,
        })
    }

    /// Run one queued import. Only a pending report is processed; any other
    /// state makes this a no-op so redelivered jobs cannot run twice.
    pub async fn process_import(&self, report_id: Uuid, csv_content: &str) -> Result<ImportRun> {
        let Some(report) = self.store.begin_import_processing(report_id).await? else {
            warn!("Import report {} is not pending, skipping job", report_id);
            return Ok(ImportRun::Skipped);
        };
        info!("Processing CSV import {} for user {}", report.id, report.user_id);

        match self.import_rows(&report, csv_content).await {
            Ok(summary) => {
                info!(
                    "CSV import {} completed: {} created, {} errors",
                    report.id, summary.success_count, summary.error_count
                );
                self.notify(
                    report.user_id,
                    &ImportNotification::ImportCompleted {
                        import_report_id: report.id,
                        success_count: summary.success_count,
                        error_count: summary.error_count,
                        message: completion_message(summary.success_count, summary.error_count),
                    },
                )
                .await;
                Ok(ImportRun::Completed(summary))
            }
            Err(e) => {
                error!("CSV import {} failed: {:#}", report.id, e);
                let details = [ImportErrorDetail::Batch {
                    error: format!("Erro interno: {}", e),
                }];
                if !self.store.fail_import(report.id, &details).await? {
                    warn!("Import report {} left processing before it could fail", report.id);
                }
                self.notify(
                    report.user_id,
                    &ImportNotification::ImportFailed {
                        import_report_id: report.id,
                        message: FAILED_MESSAGE.to_string(),
                    },
                )
                .await;
                Ok(ImportRun::Failed(e.to_string()))
            }
        }
    }

    /// Parse everything up front, then create clients row by row.
    ///
    /// Rows may be shorter or longer than the header: missing cells are
    /// absent and cells past the last header are ignored, so such a row ends
    /// up as an ordinary row error.
    async fn import_rows(&self, report: &ImportReport, csv_content: &str) -> Result<ImportSummary> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_content.as_bytes());

        let headers = reader.headers()?.clone();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let line = record.position().map(|p| p.line()).unwrap_or(0);
            rows.push((line, record));
        }

        let mut summary = ImportSummary {
            total_lines: rows.len() as i32,
            ..Default::default()
        };

        for (line, record) in &rows {
            let attrs = field_mapper::map_row(headers.iter().zip(record.iter()));

            match self.clients.create(report.user_id, &attrs).await {
                Ok(_) => summary.success_count += 1,
                Err(SaveError::Invalid(errors)) => {
                    summary.error_count += 1;
                    summary.error_details.push(ImportErrorDetail::Row {
                        line: *line,
                        name: attrs.name.clone().unwrap_or_else(|| format!("Linha {}", line)),
                        cpf: attrs.cpf.clone(),
                        errors: errors.full_messages(),
                    });
                }
                Err(SaveError::Store(e)) => {
                    warn!("Import {} line {}: {}", report.id, line, e);
                    summary.error_count += 1;
                    summary.error_details.push(ImportErrorDetail::Row {
                        line: *line,
                        name: format!("Linha {}", line),
                        cpf: None,
                        errors: vec![format!("Erro de processamento: {}", e)],
                    });
                }
            }
        }

        if !self.store.complete_import(report.id, &summary).await? {
            anyhow::bail!("report {} is no longer processing", report.id);
        }
        Ok(summary)
    }

    async fn notify(&self, user_id: Uuid, event: &ImportNotification) {
        let channel = import_notifications_channel(user_id);
        if let Err(e) = broadcaster::publish(self.broadcaster.as_ref(), &channel, event).await {
            warn!("Failed to send import notification on {}: {}", channel, e);
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    pub struct RecordingQueue {
        pub jobs: Mutex<Vec<QueuedCsvImportJob>>,
    }

    #[async_trait]
    impl ImportQueue for RecordingQueue {
        async fn enqueue(&self, job: QueuedCsvImportJob) -> Result<()> {
            self.jobs.lock().push(job);
            Ok(())
        }
    }
}
