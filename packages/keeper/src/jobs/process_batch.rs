//! Fan a revealed batch out into per-token upload jobs.
//!
//! Token ids in a batch are mapped onto asset ids by a cyclic shift whose
//! offset comes from the contract's random number for that batch, so the
//! mint order says nothing about which artwork a token receives.

use anyhow::{bail, Context, Result};
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::{JobContext, UploadResourceData, JOB_UPDATE_BASE_URL, JOB_UPLOAD_RESOURCE};
use crate::queue::Job;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessBatchData {
    pub batch_number: u64,
    pub batch_size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub batch_number: u64,
    pub min_token_id_in_batch: u64,
    pub max_token_id_in_batch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenAssignment {
    pub token_id: u64,
    pub asset_id: u64,
}

/// Inclusive token id range `[size * number, size * (number + 1) - 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchRange {
    pub batch_number: u64,
    pub batch_size: u64,
    pub min_token_id: u64,
    pub max_token_id: u64,
}

impl BatchRange {
    pub fn new(batch_number: u64, batch_size: u64) -> Result<Self> {
        if batch_size == 0 {
            bail!("batch size must be greater than zero");
        }
        let min_token_id = batch_size
            .checked_mul(batch_number)
            .context("batch range overflows u64")?;
        let max_token_id = batch_number
            .checked_add(1)
            .and_then(|n| n.checked_mul(batch_size))
            .context("batch range overflows u64")?
            - 1;

        Ok(Self {
            batch_number,
            batch_size,
            min_token_id,
            max_token_id,
        })
    }

    /// Reduce the on-chain random value to an offset in `0..batch_size`.
    pub fn offset(&self, random: &BigUint) -> u64 {
        // The remainder is below batch_size, so it always fits.
        (random % BigUint::from(self.batch_size))
            .to_u64()
            .unwrap_or_default()
    }

    /// Shift every token id by `offset`, wrapping inside the batch.
    pub fn assignments(&self, offset: u64) -> impl Iterator<Item = TokenAssignment> + '_ {
        let offset = offset % self.batch_size;
        (self.min_token_id..=self.max_token_id).map(move |token_id| {
            // token_id + offset, minus batch_size once it passes the end
            let asset_id = if offset > self.max_token_id - token_id {
                token_id - (self.batch_size - offset)
            } else {
                token_id + offset
            };
            TokenAssignment { token_id, asset_id }
        })
    }

    fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_number: self.batch_number,
            min_token_id_in_batch: self.min_token_id,
            max_token_id_in_batch: self.max_token_id,
        }
    }
}

pub async fn process_batch(data: ProcessBatchData, ctx: &JobContext) -> Result<BatchSummary> {
    let range = BatchRange::new(data.batch_number, data.batch_size)?;

    let random = ctx
        .contract
        .get_random_number_for_batch(data.batch_number)
        .await
        .with_context(|| format!("reading random number for batch {}", data.batch_number))?;
    let offset = range.offset(&random);

    tracing::info!(
        batch_number = data.batch_number,
        batch_size = data.batch_size,
        offset = offset,
        "processing batch"
    );

    let queue_name = &ctx.settings.mints_queue_name;
    let children = range
        .assignments(offset)
        .map(|a| -> Result<Job> {
            let payload = UploadResourceData {
                token_id: a.token_id,
                asset_id: a.asset_id,
            };
            Ok(Job::new(
                JOB_UPLOAD_RESOURCE,
                queue_name,
                serde_json::to_value(payload)?,
            ))
        })
        .collect::<Result<Vec<_>>>()?;

    let update = Job::new(JOB_UPDATE_BASE_URL, queue_name, serde_json::Value::Null)
        .with_children(children);
    ctx.queue
        .add(update)
        .await
        .context("enqueueing base url update")?;

    Ok(range.summary())
}
