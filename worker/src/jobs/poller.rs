//! Batch polling pass.
//!
//! Checks every submitted-but-unresolved batch record against the provider.
//! Completed batches with an output file are reconciled and marked resolved;
//! dead batches (failed/expired) are logged and left alone; anything still
//! queued or running waits for the next scheduled run. Failures are isolated
//! per batch so one bad retrieval never aborts the loop.

use sea_orm::DatabaseConnection;

use crate::error::AppResult;
use crate::jobs::reconcile;
use crate::model::batch::BatchCtrl;
use crate::prompt::groq::batch::{Batch, GroqBatchClient};

/// What to do with one pending batch record given the provider's view of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchAction<'a> {
    /// Completed with an output file: reconcile results, then resolve
    Reconcile { output_file_id: &'a str },
    /// Completed but no output file to download; leave the record pending
    CompletedWithoutOutput,
    /// Failed, expired, or cancelled; needs resubmission
    Dead,
    /// Queued or running; check again next scheduled run
    StillRunning,
}

pub fn next_action(batch: &Batch) -> BatchAction<'_> {
    if batch.status.is_completed() {
        match batch.output_file_id.as_deref() {
            Some(output_file_id) => BatchAction::Reconcile { output_file_id },
            None => BatchAction::CompletedWithoutOutput,
        }
    } else if batch.status.is_dead() {
        BatchAction::Dead
    } else {
        BatchAction::StillRunning
    }
}

pub async fn run_poller(conn: &DatabaseConnection, groq: &GroqBatchClient) -> AppResult<()> {
    let pending = BatchCtrl::all_pending(conn).await?;
    if pending.is_empty() {
        tracing::info!("No pending batches, poller pass done");
        return Ok(());
    }

    tracing::info!("Polling {} pending batches", pending.len());

    for record in pending {
        let batch = match groq.get_batch(&record.batch_id).await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Failed to retrieve batch {}: {:?}", record.batch_id, e);
                continue;
            }
        };

        match next_action(&batch) {
            BatchAction::Reconcile { output_file_id } => {
                match reconcile::reconcile_batch(conn, groq, output_file_id).await {
                    Ok(stats) => match BatchCtrl::mark_resolved(conn, &batch.id).await {
                        Ok(resolved) => {
                            tracing::info!(
                                "Batch {} resolved ({} rows): {} lines parsed, {} valid, {} channels matched",
                                batch.id,
                                resolved,
                                stats.parsed,
                                stats.valid,
                                stats.matched
                            );
                        }
                        Err(e) => {
                            tracing::error!("Failed to resolve batch {}: {:?}", batch.id, e);
                        }
                    },
                    Err(e) => {
                        tracing::error!("Failed to reconcile batch {}: {:?}", batch.id, e);
                    }
                }
            }
            BatchAction::CompletedWithoutOutput => {
                tracing::warn!("Batch {} completed without an output file", batch.id);
            }
            BatchAction::Dead => {
                // TODO: re-submit failed/expired batches from the original request file
                tracing::error!("Batch {} is {:?}, skipping", batch.id, batch.status);
            }
            BatchAction::StillRunning => {
                tracing::debug!("Batch {} still {:?}", batch.id, batch.status);
            }
        }
    }

    tracing::info!("Poller pass complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::groq::batch::BatchStatus;

    fn batch(status: BatchStatus, output_file_id: Option<&str>) -> Batch {
        Batch {
            id: "batch_1".to_string(),
            status,
            input_file_id: "file_in".to_string(),
            output_file_id: output_file_id.map(str::to_string),
            error_file_id: None,
            endpoint: None,
            completion_window: None,
        }
    }

    #[test]
    fn completed_with_output_file_reconciles() {
        let batch = batch(BatchStatus::Completed, Some("file_out"));
        assert_eq!(
            next_action(&batch),
            BatchAction::Reconcile {
                output_file_id: "file_out"
            }
        );
    }

    #[test]
    fn completed_without_output_file_stays_pending() {
        let batch = batch(BatchStatus::Completed, None);
        assert_eq!(next_action(&batch), BatchAction::CompletedWithoutOutput);
    }

    #[test]
    fn failed_and_expired_batches_are_dead_not_reconciled() {
        for status in [BatchStatus::Failed, BatchStatus::Expired] {
            let batch = batch(status, Some("file_out"));
            assert_eq!(next_action(&batch), BatchAction::Dead);
        }
    }

    #[test]
    fn running_states_wait_for_next_run() {
        for status in [
            BatchStatus::Validating,
            BatchStatus::InProgress,
            BatchStatus::Finalizing,
        ] {
            let batch = batch(status, None);
            assert_eq!(next_action(&batch), BatchAction::StillRunning);
        }
    }
}
