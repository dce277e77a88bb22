//! Job handlers for the mints queue.
//!
//! Each job name maps to one [`JobKind`] variant; [`JobProcessor::process`]
//! parses the payload and dispatches to the matching handler.

pub mod process_batch;
pub mod update_base_url;
pub mod upload_resource;

use std::{path::PathBuf, sync::Arc};

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::{
    chain::EthernautsContract,
    queue::{Job, JobQueue},
    storage::PinningService,
};

pub use process_batch::{BatchRange, BatchSummary, ProcessBatchData, TokenAssignment};
pub use update_base_url::{normalize_base_uri, BaseUrlUpdate};
pub use upload_resource::{UploadResourceData, UploadedResource};

pub const JOB_PROCESS_BATCH: &str = "PROCESS_BATCH";
pub const JOB_UPDATE_BASE_URL: &str = "UPDATE_BASE_URL";
pub const JOB_UPLOAD_RESOURCE: &str = "UPLOAD_RESOURCE";

#[derive(Debug, Error)]
pub enum JobError {
    /// The job name has no handler.
    #[error("Invalid job: {0}")]
    InvalidJob(String),

    #[error("Invalid payload for job {name}: {source}")]
    InvalidPayload {
        name: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A job with its payload decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobKind {
    ProcessBatch(ProcessBatchData),
    UpdateBaseUrl,
    UploadResource(UploadResourceData),
}

impl JobKind {
    pub fn from_job(job: &Job) -> Result<Self, JobError> {
        match job.name.as_str() {
            JOB_PROCESS_BATCH => decode_payload(job).map(JobKind::ProcessBatch),
            JOB_UPDATE_BASE_URL => Ok(JobKind::UpdateBaseUrl),
            JOB_UPLOAD_RESOURCE => decode_payload(job).map(JobKind::UploadResource),
            _ => Err(JobError::InvalidJob(
                serde_json::to_string(job).unwrap_or_else(|_| job.name.clone()),
            )),
        }
    }
}

fn decode_payload<T: DeserializeOwned>(job: &Job) -> Result<T, JobError> {
    serde_json::from_value(job.data.clone()).map_err(|source| JobError::InvalidPayload {
        name: job.name.clone(),
        source,
    })
}

/// Names and locations shared by every handler.
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Queue that child jobs are placed on.
    pub mints_queue_name: String,
    /// Remote folder holding per-token metadata objects.
    pub fleek_metadata_folder: String,
    /// Remote folder holding per-token images.
    pub fleek_assets_folder: String,
    /// Local `<assetId>.json` files.
    pub resources_metadata_folder: PathBuf,
    /// Local `<assetId>.png` files.
    pub resources_assets_folder: PathBuf,
    pub token_name_prefix: String,
    pub external_url_base: String,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            mints_queue_name: "mints".to_string(),
            fleek_metadata_folder: "metadata".to_string(),
            fleek_assets_folder: "assets".to_string(),
            resources_metadata_folder: PathBuf::from("resources/metadata"),
            resources_assets_folder: PathBuf::from("resources/assets"),
            token_name_prefix: "EthernautDAO #".to_string(),
            external_url_base: "https://mint.ethernautdao.io/nft/".to_string(),
        }
    }
}

/// Handles every job receives.
#[derive(Clone)]
pub struct JobContext {
    pub contract: Arc<dyn EthernautsContract>,
    pub queue: Arc<dyn JobQueue>,
    pub storage: Arc<dyn PinningService>,
    pub settings: Arc<JobSettings>,
}

/// Result of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum JobOutput {
    Batch(BatchSummary),
    BaseUrl(BaseUrlUpdate),
    /// `None` when the resource was already uploaded.
    Resource(Option<UploadedResource>),
}

pub struct JobProcessor {
    ctx: JobContext,
}

impl JobProcessor {
    pub fn new(ctx: JobContext) -> Self {
        Self { ctx }
    }

    /// Run `job` to completion. No retries here; the queue owns that.
    pub async fn process(&self, job: &Job) -> Result<JobOutput> {
        let output = match JobKind::from_job(job)? {
            JobKind::ProcessBatch(data) => {
                JobOutput::Batch(process_batch::process_batch(data, &self.ctx).await?)
            }
            JobKind::UpdateBaseUrl => {
                JobOutput::BaseUrl(update_base_url::update_base_url(&self.ctx).await?)
            }
            JobKind::UploadResource(data) => {
                JobOutput::Resource(upload_resource::upload_resource(data, &self.ctx).await?)
            }
        };

        tracing::info!(job = %job.name, result = ?output, "job completed");

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_jobs() {
        let job = Job::new(
            JOB_PROCESS_BATCH,
            "mints",
            serde_json::json!({"batchNumber": 2, "batchSize": 10}),
        );
        assert_eq!(
            JobKind::from_job(&job).unwrap(),
            JobKind::ProcessBatch(ProcessBatchData {
                batch_number: 2,
                batch_size: 10
            })
        );

        let job = Job::new(JOB_UPDATE_BASE_URL, "mints", serde_json::Value::Null);
        assert_eq!(JobKind::from_job(&job).unwrap(), JobKind::UpdateBaseUrl);
    }

    #[test]
    fn unknown_job_name_is_invalid() {
        let job = Job::new("MINT_EVERYTHING", "mints", serde_json::Value::Null);
        let err = JobKind::from_job(&job).unwrap_err();
        assert!(matches!(err, JobError::InvalidJob(ref json) if json.contains("MINT_EVERYTHING")));
        assert!(err.to_string().starts_with("Invalid job: "));
    }

    #[test]
    fn malformed_payload_names_the_job() {
        let job = Job::new(JOB_UPLOAD_RESOURCE, "mints", serde_json::json!({"tokenId": "x"}));
        let err = JobKind::from_job(&job).unwrap_err();
        assert!(matches!(err, JobError::InvalidPayload { ref name, .. } if name == JOB_UPLOAD_RESOURCE));
    }
}
