//! Train command - trains a built model on a dataset from the command line.

use anyhow::{Context, Result};
use config::Config;
use labelnet_structs::{Dataset, Model};
use tracing::info;

use crate::workflow::{self, TrainOptions};

/// Runs the train command.
///
/// # Errors
///
/// Returns an error if the model or dataset does not exist or training fails.
pub async fn run(config: &Config, model_id: i64, dataset_id: i64, options: &TrainOptions) -> Result<()> {
    options.validate(config.max_training_epochs)?;
    let (model, dataset) = load_pair(model_id, dataset_id).await?;

    info!(model_id, dataset_id, epochs = options.epochs, "Starting training");
    let history = workflow::train_model(&model, &dataset, options).await?;

    for (epoch, (accuracy, loss)) in history.accuracy.iter().zip(&history.loss).enumerate() {
        info!(epoch = epoch + 1, accuracy, loss, "Epoch");
    }
    info!(accuracy = ?history.final_accuracy(), "Training complete");

    Ok(())
}

/// Looks up a model and a dataset by id, without ownership checks.
pub(crate) async fn load_pair(model_id: i64, dataset_id: i64) -> Result<(Model, Dataset)> {
    let (model, dataset) = tokio::try_join!(
        database::model::find_model(model_id),
        database::dataset::find_dataset(dataset_id),
    )?;

    let model = model.with_context(|| format!("Model {model_id} not found"))?;
    let dataset = dataset.with_context(|| format!("Dataset {dataset_id} not found"))?;
    Ok((model, dataset))
}
