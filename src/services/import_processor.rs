//! CSV import JetStream processor
//!
//! Accepted uploads are published to a work-queue stream so they survive
//! restarts and are processed one at a time by a durable pull consumer.
//!
//! ## Streams
//! - `PAINEL_CSV_IMPORT_JOBS` - queued CSV client imports

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use async_nats::jetstream::{self, Context as JsContext};
use async_nats::Client;
use async_trait::async_trait;
use futures::StreamExt;
use tracing::{error, info, warn};

use super::csv_import::{ImportPipeline, ImportQueue, ImportRun};
use crate::types::QueuedCsvImportJob;

const STREAM_NAME: &str = "PAINEL_CSV_IMPORT_JOBS";
const CONSUMER_NAME: &str = "csv_import_workers";
const SUBJECT: &str = "painel.jobs.import.csv";

/// JetStream-backed import queue and its consumer loop
pub struct ImportProcessor {
    js: JsContext,
    pipeline: Arc<ImportPipeline>,
}

impl ImportProcessor {
    /// Create the processor, making sure the stream exists
    pub async fn new(client: Client, pipeline: Arc<ImportPipeline>) -> Result<Self> {
        let js = jetstream::new(client);

        let stream_config = jetstream::stream::Config {
            name: STREAM_NAME.to_string(),
            subjects: vec![SUBJECT.to_string()],
            max_messages: 1_000,
            max_bytes: 100 * 1024 * 1024, // 100 MB, uploads travel inline
            retention: jetstream::stream::RetentionPolicy::WorkQueue,
            ..Default::default()
        };
        js.get_or_create_stream(stream_config).await?;
        info!("JetStream import stream '{}' ready", STREAM_NAME);

        Ok(Self { js, pipeline })
    }

    /// Consume queued imports until the subscription ends
    pub async fn start_processing(self: Arc<Self>) -> Result<()> {
        let stream = self.js.get_stream(STREAM_NAME).await?;

        let consumer_config = jetstream::consumer::pull::Config {
            durable_name: Some(CONSUMER_NAME.to_string()),
            ack_policy: jetstream::consumer::AckPolicy::Explicit,
            max_deliver: 3,
            filter_subject: SUBJECT.to_string(),
            ..Default::default()
        };

        let consumer = stream.get_or_create_consumer(CONSUMER_NAME, consumer_config).await?;
        info!("JetStream import consumer '{}' ready", CONSUMER_NAME);

        let mut messages = consumer.messages().await?;

        while let Some(msg) = messages.next().await {
            match msg {
                Ok(msg) => {
                    // Sequential so one large file cannot starve the pool
                    if let Err(e) = self.process_job(msg).await {
                        error!("Failed to process import job: {}", e);
                    }
                }
                Err(e) => {
                    error!("Error receiving import message: {}", e);
                }
            }
        }

        Ok(())
    }

    async fn process_job(&self, msg: jetstream::Message) -> Result<()> {
        let job: QueuedCsvImportJob = match serde_json::from_slice(&msg.payload) {
            Ok(job) => job,
            Err(e) => {
                warn!("Dropping unreadable import job: {}", e);
                if let Err(e) = msg.ack().await {
                    error!("Failed to ack unreadable import job: {:?}", e);
                }
                return Ok(());
            }
        };

        let start_time = Instant::now();
        let report_id = job.import_report_id;
        let waited = chrono::Utc::now() - job.submitted_at;
        info!(
            "Import job {} picked up after {}s",
            report_id,
            waited.num_seconds()
        );

        // Terminal and skipped runs are acked alike: the report already
        // records the outcome and redelivery would be a no-op.
        let outcome = self.pipeline.process_import(report_id, &job.csv_content).await;

        if let Err(e) = msg.ack().await {
            error!("Failed to ack import job {}: {:?}", report_id, e);
        }

        let duration_ms = start_time.elapsed().as_millis() as u64;
        match outcome? {
            ImportRun::Completed(summary) => info!(
                "Import job {} finished in {}ms: {}/{} rows imported",
                report_id, duration_ms, summary.success_count, summary.total_lines
            ),
            ImportRun::Failed(reason) => {
                warn!("Import job {} failed after {}ms: {}", report_id, duration_ms, reason)
            }
            ImportRun::Skipped => {}
        }

        Ok(())
    }
}

#[async_trait]
impl ImportQueue for ImportProcessor {
    async fn enqueue(&self, job: QueuedCsvImportJob) -> Result<()> {
        let report_id = job.import_report_id;
        let payload = serde_json::to_vec(&job)?;
        self.js.publish(SUBJECT, payload.into()).await?.await?;
        info!("Import job {} submitted", report_id);
        Ok(())
    }
}
