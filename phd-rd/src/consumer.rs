//! Asynchronous ingestion of result messages
//!
//! Producers (the `/ingest` endpoint, or anything holding the sender) queue
//! [`IngestMessage`]s; one consumer task applies them through the same
//! services and validation the HTTP handlers use. A message that fails is
//! logged and dropped; there is no retry.

use phd_common::api::{
    feature_stats_from_requests, FeatureStatCreateRequest, ResultDataCreateRequest,
    ResultSetCompleteRequest, ResultSetCreateRequest,
};
use phd_common::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::services::ResultServices;

/// Default queue depth between producers and the consumer
pub const INGEST_QUEUE_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum IngestMessage {
    CreateResultSet {
        #[serde(rename = "resultSet")]
        result_set: ResultSetCreateRequest,
    },
    CompleteResultSet {
        #[serde(rename = "resultSetId")]
        result_set_id: i64,
        completion: ResultSetCompleteRequest,
    },
    CreateResultData {
        #[serde(rename = "resultSetId")]
        result_set_id: i64,
        #[serde(rename = "resultData")]
        result_data: ResultDataCreateRequest,
    },
    CreateFeatureStats {
        #[serde(rename = "resultSetId")]
        result_set_id: i64,
        stats: Vec<FeatureStatCreateRequest>,
    },
}

impl IngestMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            IngestMessage::CreateResultSet { .. } => "CreateResultSet",
            IngestMessage::CompleteResultSet { .. } => "CompleteResultSet",
            IngestMessage::CreateResultData { .. } => "CreateResultData",
            IngestMessage::CreateFeatureStats { .. } => "CreateFeatureStats",
        }
    }
}

/// Apply one message
pub async fn handle_message(services: &ResultServices, message: IngestMessage) -> Result<()> {
    match message {
        IngestMessage::CreateResultSet { result_set } => {
            services
                .lifecycle
                .create(result_set.into_new_result_set()?)
                .await?;
        }
        IngestMessage::CompleteResultSet {
            result_set_id,
            completion,
        } => {
            services
                .lifecycle
                .complete(result_set_id, completion.into_completion()?)
                .await?;
        }
        IngestMessage::CreateResultData {
            result_set_id,
            result_data,
        } => {
            services
                .attachments
                .create_result_data(result_set_id, result_data.into_new_result_data()?)
                .await?;
        }
        IngestMessage::CreateFeatureStats {
            result_set_id,
            stats,
        } => {
            services
                .attachments
                .create_feature_stats(result_set_id, feature_stats_from_requests(stats)?)
                .await?;
        }
    }
    Ok(())
}

/// Spawn the consumer task; it ends when every sender is dropped
pub fn spawn_consumer(
    services: ResultServices,
    mut rx: mpsc::Receiver<IngestMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Ingest consumer started");

        while let Some(message) = rx.recv().await {
            let kind = message.kind();
            match handle_message(&services, message).await {
                Ok(()) => debug!("Ingest message {} applied", kind),
                Err(e) if e.is_internal() => error!("Ingest message {} failed: {}", kind, e),
                Err(e) => warn!("Ingest message {} rejected: {}", kind, e),
            }
        }

        info!("Ingest consumer stopped");
    })
}
