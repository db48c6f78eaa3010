//! Evaluate command - scores a trained model against a dataset.

use anyhow::Result;
use tracing::info;

use super::train::load_pair;
use crate::workflow;

/// Runs the evaluate command.
///
/// # Errors
///
/// Returns an error if the model or dataset does not exist or evaluation fails.
pub async fn run(model_id: i64, dataset_id: i64) -> Result<()> {
    let (model, dataset) = load_pair(model_id, dataset_id).await?;

    let evaluation = workflow::evaluate_model(&model, &dataset).await?;
    info!(
        model_id,
        dataset_id,
        accuracy = evaluation.accuracy,
        loss = evaluation.loss,
        "Evaluation complete"
    );

    Ok(())
}
