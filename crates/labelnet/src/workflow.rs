//! Build, train and evaluate a stored model against a stored dataset.
//!
//! The database and object store are read on the async side; decoding and the
//! `burn` work run on the blocking pool.

use bytes::Bytes;
use database::element::list_labeled_elements;
use database::label::list_dataset_labels;
use database::layer::list_model_layers;
use labelnet_structs::{Dataset, DatasetType, LayerSpec, LossKind, Model, ModelType, OptimizerKind};
use ml_model::{
    Evaluation, History, InferenceBackend, LayerSummary, ModelArtifact, ModelManifest, NetworkError,
    Sample, TensorShape, TrainBackend, TrainConfig, build_network, resolve_input_shape,
};
use serde::Deserialize;
use tokio::task::spawn_blocking;
use tracing::{info, warn};

/// Channels assumed when the input size comes from a dataset.
const DATASET_INPUT_CHANNELS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("the model has not been built yet")]
    NotBuilt,

    #[error("only image models can be trained on image datasets")]
    NotImage,

    #[error("the dataset has no labeled elements")]
    NoLabeledElements,

    #[error("epochs must be between 1 and {max}")]
    InvalidEpochs { max: usize },

    #[error("validation split must be at least 0 and below 1")]
    InvalidValidationSplit,

    #[error("batch size must be at least 1")]
    InvalidBatchSize,

    #[error("learning rate must be a positive number")]
    InvalidLearningRate,

    #[error("the model input {0} cannot be filled from images")]
    InputNotImage(TensorShape),

    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    /// Whether the error is caused by the request rather than by the server.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        match self {
            Self::Network(e) => !matches!(e, NetworkError::Record(_)),
            Self::Database(_) | Self::Other(_) => false,
            _ => true,
        }
    }
}

/// Compile settings chosen when a model is built.
#[derive(Debug, Clone, Deserialize)]
pub struct BuildOptions {
    pub optimizer: OptimizerKind,
    pub loss: LossKind,

    #[serde(default)]
    pub learning_rate: Option<f64>,
}

/// Settings of one training run.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub epochs: usize,
    pub batch_size: usize,
    pub validation_split: f64,
    pub learning_rate: Option<f64>,
    pub seed: u64,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            epochs: Self::DEFAULT_EPOCHS,
            batch_size: Self::DEFAULT_BATCH_SIZE,
            validation_split: Self::DEFAULT_VALIDATION_SPLIT,
            learning_rate: None,
            seed: Self::DEFAULT_SEED,
        }
    }
}

impl TrainOptions {
    pub const DEFAULT_EPOCHS: usize = 10;
    pub const DEFAULT_BATCH_SIZE: usize = 32;
    pub const DEFAULT_VALIDATION_SPLIT: f64 = 0.2;
    pub const DEFAULT_SEED: u64 = 0;

    /// # Errors
    ///
    /// Returns an error if a setting is out of range.
    pub fn validate(&self, max_epochs: usize) -> Result<(), WorkflowError> {
        if !(1..=max_epochs).contains(&self.epochs) {
            return Err(WorkflowError::InvalidEpochs { max: max_epochs });
        }
        if !(0.0..1.0).contains(&self.validation_split) {
            return Err(WorkflowError::InvalidValidationSplit);
        }
        if self.batch_size == 0 {
            return Err(WorkflowError::InvalidBatchSize);
        }
        if self.learning_rate.is_some_and(|lr| !(lr.is_finite() && lr > 0.0)) {
            return Err(WorkflowError::InvalidLearningRate);
        }
        Ok(())
    }
}

/// Builds `model` from its stored layers with fresh weights and stores the artifact.
///
/// `dataset` supplies the input size when the first layer has none.
///
/// # Errors
///
/// Returns an error if the layers do not form a valid network or storing fails.
pub async fn build_model(
    model: &Model,
    dataset: Option<&Dataset>,
    options: &BuildOptions,
) -> Result<Vec<LayerSummary>, WorkflowError> {
    if let Some(lr) = options.learning_rate
        && !(lr.is_finite() && lr > 0.0)
    {
        return Err(WorkflowError::InvalidLearningRate);
    }

    let layers: Vec<LayerSpec> = list_model_layers(model.id)
        .await?
        .into_iter()
        .map(|layer| layer.spec)
        .collect();
    let first = layers.first().ok_or(NetworkError::Empty)?;
    let input_shape = resolve_input_shape(first, dataset.and_then(dataset_input_shape))?;

    let manifest = ModelManifest {
        layers,
        input_shape,
        optimizer: options.optimizer,
        loss: options.loss,
        learning_rate: options
            .learning_rate
            .unwrap_or_else(|| options.optimizer.default_learning_rate()),
        class_names: Vec::new(),
        trained: false,
    };

    let (summaries, artifact) = spawn_blocking(move || {
        let network = build_network::<InferenceBackend>(
            &manifest.layers,
            manifest.input_shape,
            &Default::default(),
        )?;
        let summaries = network.layout.summaries().to_vec();
        let artifact = ModelArtifact::from_network(manifest, &network)?;
        Ok::<_, NetworkError>((summaries, artifact))
    })
    .await
    .map_err(anyhow::Error::from)??;

    let weights_path = store_artifact(model.id, &artifact).await?;
    let optimizer = options.optimizer.to_string();
    let loss = options.loss.to_string();
    commit_artifact(
        model,
        &weights_path,
        database::model::set_model_built(model.id, &weights_path, &optimizer, &loss),
    )
    .await?;

    info!(model_id = model.id, layers = summaries.len(), %input_shape, "Model built");

    Ok(summaries)
}

/// Trains a built model on the labeled elements of `dataset` and stores the result.
///
/// # Errors
///
/// Returns an error if the model or dataset cannot be trained together, or storing fails.
pub async fn train_model(
    model: &Model,
    dataset: &Dataset,
    options: &TrainOptions,
) -> Result<History, WorkflowError> {
    check_image_pair(model, dataset)?;
    let artifact = load_artifact(model).await?;

    let first = artifact.manifest.layers.first().ok_or(NetworkError::Empty)?;
    let fallback = dataset_input_shape(dataset).unwrap_or(artifact.manifest.input_shape);
    let input_shape = resolve_input_shape(first, Some(fallback))?;
    let (samples, class_names) = load_samples(dataset, input_shape).await?;

    info!(
        model_id = model.id,
        dataset_id = dataset.id,
        samples = samples.len(),
        classes = class_names.len(),
        epochs = options.epochs,
        "Training model"
    );

    let config = TrainConfig {
        epochs: options.epochs,
        batch_size: options.batch_size,
        validation_split: options.validation_split,
        seed: options.seed,
        learning_rate: options
            .learning_rate
            .unwrap_or(artifact.manifest.learning_rate),
        ..TrainConfig::new(artifact.manifest.optimizer, artifact.manifest.loss, options.epochs)
    };

    let (history, artifact) = spawn_blocking(move || {
        let device = Default::default();
        let num_classes = class_names.len();

        // A first layer without input dimensions takes the size of the dataset it is trained on.
        let network = if input_shape == artifact.manifest.input_shape {
            artifact.load_network::<TrainBackend>(&device)?
        } else {
            info!(from = %artifact.manifest.input_shape, to = %input_shape, "Rebuilding for dataset input");
            build_network::<TrainBackend>(&artifact.manifest.layers, input_shape, &device)?
        };

        let (network, history) = ml_model::fit(network, &samples, num_classes, &config)?;

        let manifest = ModelManifest {
            input_shape,
            class_names,
            trained: true,
            learning_rate: config.learning_rate,
            ..artifact.manifest
        };
        let artifact = ModelArtifact::from_network(manifest, &network)?;
        Ok::<_, NetworkError>((history, artifact))
    })
    .await
    .map_err(anyhow::Error::from)??;

    let weights_path = store_artifact(model.id, &artifact).await?;

    let accuracy = history.final_accuracy().unwrap_or_default();
    commit_artifact(
        model,
        &weights_path,
        database::model::set_model_trained(model.id, dataset.id, accuracy, &weights_path),
    )
    .await?;

    info!(model_id = model.id, dataset_id = dataset.id, accuracy, "Training complete");

    Ok(history)
}

/// Evaluates a built model on the labeled elements of `dataset`.
///
/// # Errors
///
/// Returns an error if the model or dataset cannot be evaluated together.
pub async fn evaluate_model(model: &Model, dataset: &Dataset) -> Result<Evaluation, WorkflowError> {
    check_image_pair(model, dataset)?;
    let artifact = load_artifact(model).await?;

    let input_shape = artifact.manifest.input_shape;
    let (samples, class_names) = load_samples(dataset, input_shape).await?;

    let evaluation = spawn_blocking(move || {
        let network = artifact.load_network::<InferenceBackend>(&Default::default())?;
        ml_model::evaluate(&network, &samples, class_names.len(), artifact.manifest.loss)
    })
    .await
    .map_err(anyhow::Error::from)??;

    database::model::set_model_evaluated(model.id, dataset.id, evaluation.accuracy).await?;

    info!(
        model_id = model.id,
        dataset_id = dataset.id,
        accuracy = evaluation.accuracy,
        loss = evaluation.loss,
        "Evaluation complete"
    );

    Ok(evaluation)
}

/// Input shape implied by the fixed element size of a dataset.
#[must_use]
pub fn dataset_input_shape(dataset: &Dataset) -> Option<TensorShape> {
    let (width, height) = dataset.fixed_size()?;
    Some(TensorShape::Image {
        channels: DATASET_INPUT_CHANNELS,
        height: height as usize,
        width: width as usize,
    })
}

fn check_image_pair(model: &Model, dataset: &Dataset) -> Result<(), WorkflowError> {
    if model.model_type == ModelType::Image && dataset.dataset_type == DatasetType::Image {
        Ok(())
    } else {
        Err(WorkflowError::NotImage)
    }
}

async fn load_artifact(model: &Model) -> Result<ModelArtifact, WorkflowError> {
    let Some(weights_path) = &model.model_file else {
        return Err(WorkflowError::NotBuilt);
    };

    let weights = database::read_object(weights_path).await?;
    let manifest = database::read_object(&database::model_manifest_path(weights_path)).await?;

    Ok(ModelArtifact::from_parts(&manifest, weights.to_vec())?)
}

/// Writes the manifest and weights of a model to a fresh directory, returning the weights path.
///
/// Nothing refers to the new files until the caller records the returned path,
/// so a failed write leaves the current artifact intact.
async fn store_artifact(model_id: i64, artifact: &ModelArtifact) -> Result<String, WorkflowError> {
    let weights_path = database::model_weights_path(model_id);

    for (path, data) in artifact_objects(&weights_path, artifact)? {
        if let Err(e) = database::put_object(&path, data).await {
            discard_artifact(&weights_path).await;
            return Err(e.into());
        }
    }

    Ok(weights_path)
}

/// Objects of an artifact in write order, the weights last.
fn artifact_objects(
    weights_path: &str,
    artifact: &ModelArtifact,
) -> Result<[(String, Bytes); 2], WorkflowError> {
    Ok([
        (
            database::model_manifest_path(weights_path),
            Bytes::from(artifact.manifest_json()?),
        ),
        (weights_path.to_string(), Bytes::from(artifact.weights.clone())),
    ])
}

/// Deletes both files of the artifact at `weights_path`, logging failures.
async fn discard_artifact(weights_path: &str) {
    let manifest_path = database::model_manifest_path(weights_path);
    database::delete_objects_logged([weights_path, manifest_path.as_str()]).await;
}

/// Points `model` at the artifact stored at `weights_path` by running `record`,
/// then drops the artifact it replaces. The new files are dropped instead if `record` fails.
async fn commit_artifact(
    model: &Model,
    weights_path: &str,
    record: impl Future<Output = Result<(), sqlx::Error>>,
) -> Result<(), WorkflowError> {
    if let Err(e) = record.await {
        discard_artifact(weights_path).await;
        return Err(e.into());
    }
    if let Some(previous) = model.model_file.as_deref().filter(|p| *p != weights_path) {
        discard_artifact(previous).await;
    }
    Ok(())
}

/// Channels, height and width that dataset images are decoded to for `input_shape`.
fn network_image_layout(
    input_shape: TensorShape,
    dataset: &Dataset,
) -> Result<(usize, usize, usize), WorkflowError> {
    let dataset_size = dataset
        .fixed_size()
        .map(|(w, h)| (w as usize, h as usize));
    match input_shape.image_layout(dataset_size) {
        Some(layout @ (1 | 3 | 4, _, _)) => Ok(layout),
        _ => Err(WorkflowError::InputNotImage(input_shape)),
    }
}

/// Reads and decodes the labeled elements of a dataset, returning them with the class names.
async fn load_samples(
    dataset: &Dataset,
    input_shape: TensorShape,
) -> Result<(Vec<Sample>, Vec<String>), WorkflowError> {
    let (channels, height, width) = network_image_layout(input_shape, dataset)?;

    let labels = list_dataset_labels(dataset.id).await?;
    let elements = list_labeled_elements(dataset.id).await?;
    if elements.is_empty() {
        return Err(WorkflowError::NoLabeledElements);
    }

    let mut files = Vec::with_capacity(elements.len());
    for element in &elements {
        let Some(label) = element
            .label_id
            .and_then(|id| labels.iter().position(|l| l.id == id))
        else {
            continue;
        };
        files.push((element.id, database::read_object(&element.file).await?, label));
    }

    let samples = spawn_blocking(move || {
        files
            .into_iter()
            .filter_map(|(element_id, bytes, label)| {
                match image_pipeline::decode_for_network(&bytes, channels, height, width) {
                    Ok(input) => Some(Sample { input, label }),
                    Err(e) => {
                        warn!(element_id, error = %e, "Skipping element that cannot be decoded");
                        None
                    }
                }
            })
            .collect::<Vec<_>>()
    })
    .await
    .map_err(anyhow::Error::from)?;

    if samples.is_empty() {
        return Err(WorkflowError::NoLabeledElements);
    }

    Ok((samples, labels.into_iter().map(|l| l.name).collect()))
}
