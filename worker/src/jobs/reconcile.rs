//! Result reconciliation.
//!
//! Downloads a completed batch's result file (single-use on the provider
//! side), validates each record's shape, and persists category assignments
//! in one transaction. Invalid records are discarded; the batch still counts
//! as reconciled.

use sea_orm::DatabaseConnection;

use crate::model::channel::ChannelCtrl;
use crate::prompt::groq::batch::{parse_classification_results, GroqBatchClient};

#[derive(Debug, Clone, Copy)]
pub struct ReconcileStats {
    /// Result lines that parsed as JSON
    pub parsed: usize,
    /// Records that survived shape validation
    pub valid: usize,
    /// Channel rows matched by the bulk update
    pub matched: u64,
}

pub async fn reconcile_batch(
    conn: &DatabaseConnection,
    groq: &GroqBatchClient,
    output_file_id: &str,
) -> anyhow::Result<ReconcileStats> {
    let lines = groq.download_results(output_file_id).await?;
    let parsed = lines.len();

    let answers = parse_classification_results(lines);
    let valid = answers.len();

    if answers.is_empty() {
        tracing::info!("No valid updates in result file {}", output_file_id);
        return Ok(ReconcileStats {
            parsed,
            valid,
            matched: 0,
        });
    }

    let matched = ChannelCtrl::apply_categories(conn, &answers).await?;
    tracing::info!(
        "Applied categories for {} of {} valid results",
        matched,
        valid
    );

    Ok(ReconcileStats {
        parsed,
        valid,
        matched,
    })
}
