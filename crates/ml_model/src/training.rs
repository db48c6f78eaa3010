//! Training and evaluation loops for built networks.

use burn::data::dataset::Dataset;
use burn::module::AutodiffModule;
use burn::nn::loss::{CrossEntropyLossConfig, MseLoss, Reduction};
use burn::optim::{
    AdaGradConfig, AdamConfig, AdamWConfig, GradientsParams, Optimizer, RmsPropConfig, SgdConfig,
};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use labelnet_structs::{LossKind, OptimizerKind};
use serde::{Deserialize, Serialize};

use crate::dataset::{SampleBatch, SampleBatcher, SampleDataset, split_indices};
use crate::{Network, NetworkError, NetworkLayout, NetworkModule, Sample, TensorShape};

/// Batch size used for validation and evaluation passes.
const EVAL_BATCH_SIZE: usize = 64;

/// Configuration for a training run.
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub optimizer: OptimizerKind,
    pub loss: LossKind,
    pub learning_rate: f64,
    pub epochs: usize,
    pub batch_size: usize,
    /// Fraction of the samples held out for validation.
    pub validation_split: f64,
    /// Seed for the split and the per-epoch shuffles.
    pub seed: u64,
}

impl TrainConfig {
    /// Defaults for `optimizer` and `loss`: 32 samples per batch, no validation.
    #[must_use]
    pub const fn new(optimizer: OptimizerKind, loss: LossKind, epochs: usize) -> Self {
        Self {
            optimizer,
            loss,
            learning_rate: optimizer.default_learning_rate(),
            epochs,
            batch_size: 32,
            validation_split: 0.0,
            seed: 0,
        }
    }
}

/// Per-epoch metrics, one entry per epoch in each list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct History {
    pub accuracy: Vec<f64>,
    pub loss: Vec<f64>,

    /// Empty when the run had no validation set
    pub val_accuracy: Vec<f64>,
    pub val_loss: Vec<f64>,
}

impl History {
    /// Accuracy after the last epoch: validation accuracy when available.
    #[must_use]
    pub fn final_accuracy(&self) -> Option<f64> {
        self.val_accuracy.last().or_else(|| self.accuracy.last()).copied()
    }
}

/// Outcome of evaluating a network on a set of samples.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub accuracy: f64,
    pub loss: f64,
}

/// Trains `network` on `samples` and returns it with its history.
///
/// # Errors
///
/// Returns an error if there are no samples, a sample does not fit the input
/// shape, or the network output does not match `num_classes`.
pub fn fit<B: AutodiffBackend>(
    network: Network<B>,
    samples: &[Sample],
    num_classes: usize,
    config: &TrainConfig,
) -> Result<(Network<B>, History), NetworkError> {
    check_samples(&network.layout, samples, num_classes)?;

    match config.optimizer {
        OptimizerKind::Adam => fit_with(network, samples, num_classes, config, AdamConfig::new().init()),
        OptimizerKind::AdamW => {
            fit_with(network, samples, num_classes, config, AdamWConfig::new().init())
        }
        OptimizerKind::Sgd => fit_with(network, samples, num_classes, config, SgdConfig::new().init()),
        OptimizerKind::RmsProp => {
            fit_with(network, samples, num_classes, config, RmsPropConfig::new().init())
        }
        OptimizerKind::AdaGrad => {
            fit_with(network, samples, num_classes, config, AdaGradConfig::new().init())
        }
    }
}

fn fit_with<B, O>(
    network: Network<B>,
    samples: &[Sample],
    num_classes: usize,
    config: &TrainConfig,
    mut optimizer: O,
) -> Result<(Network<B>, History), NetworkError>
where
    B: AutodiffBackend,
    O: Optimizer<NetworkModule<B>, B>,
{
    let Network {
        mut module,
        layout,
        device,
    } = network;

    let (train_indices, valid_indices) =
        split_indices(samples.len(), config.validation_split, config.seed);
    let train = SampleDataset::from_indices(samples, &train_indices);
    let valid = SampleDataset::from_indices(samples, &valid_indices);

    let input_len = layout.input_shape().len();
    let batcher = SampleBatcher::<B>::new(device.clone(), input_len);
    let valid_batcher = SampleBatcher::<B::InnerBackend>::new(device.clone(), input_len);
    let batch_size = config.batch_size.max(1);

    let mut history = History::default();

    for epoch in 0..config.epochs {
        let mut indices: Vec<usize> = (0..train.len()).collect();
        dataset_shuffle(&mut indices, config.seed, epoch);

        let mut totals = Totals::default();

        for batch_indices in indices.chunks(batch_size) {
            let items: Vec<_> = batch_indices.iter().filter_map(|&i| train.get(i)).collect();
            if items.is_empty() {
                continue;
            }

            let batch = batcher.batch(items);
            let count = batch.labels.len();
            let (loss, correct) =
                batch_loss(&layout, &module, &batcher, batch, config.loss, num_classes);

            totals.add(scalar(loss.clone()), correct, count);

            let grads = loss.backward();
            let grads = GradientsParams::from_grads(grads, &module);
            module = optimizer.step(config.learning_rate, module, grads);
        }

        history.loss.push(totals.mean_loss());
        history.accuracy.push(totals.accuracy());

        if !valid.is_empty() {
            let evaluation = evaluate_dataset(
                &layout,
                &module.valid(),
                &valid_batcher,
                &valid,
                config.loss,
                num_classes,
            );
            history.val_loss.push(evaluation.loss);
            history.val_accuracy.push(evaluation.accuracy);
        }

        tracing::info!(
            epoch = epoch + 1,
            epochs = config.epochs,
            loss = history.loss.last().copied().unwrap_or_default(),
            accuracy = history.accuracy.last().copied().unwrap_or_default(),
            val_loss = history.val_loss.last().copied(),
            val_accuracy = history.val_accuracy.last().copied(),
            "Epoch finished"
        );
    }

    Ok((
        Network {
            module,
            layout,
            device,
        },
        history,
    ))
}

/// Evaluates `network` on `samples`.
///
/// # Errors
///
/// Returns an error if there are no samples, a sample does not fit the input
/// shape, or the network output does not match `num_classes`.
pub fn evaluate<B: Backend>(
    network: &Network<B>,
    samples: &[Sample],
    num_classes: usize,
    loss: LossKind,
) -> Result<Evaluation, NetworkError> {
    check_samples(&network.layout, samples, num_classes)?;

    let batcher = SampleBatcher::<B>::new(network.device.clone(), network.layout.input_shape().len());
    let dataset = SampleDataset::new(samples.to_vec());

    Ok(evaluate_dataset(
        &network.layout,
        &network.module,
        &batcher,
        &dataset,
        loss,
        num_classes,
    ))
}

fn evaluate_dataset<B: Backend>(
    layout: &NetworkLayout,
    module: &NetworkModule<B>,
    batcher: &SampleBatcher<B>,
    dataset: &SampleDataset,
    loss: LossKind,
    num_classes: usize,
) -> Evaluation {
    let mut totals = Totals::default();

    for start in (0..dataset.len()).step_by(EVAL_BATCH_SIZE) {
        let end = (start + EVAL_BATCH_SIZE).min(dataset.len());
        let items: Vec<_> = (start..end).filter_map(|i| dataset.get(i)).collect();
        if items.is_empty() {
            continue;
        }

        let batch = batcher.batch(items);
        let count = batch.labels.len();
        let (batch_loss, correct) = batch_loss(layout, module, batcher, batch, loss, num_classes);
        totals.add(scalar(batch_loss), correct, count);
    }

    Evaluation {
        accuracy: totals.accuracy(),
        loss: totals.mean_loss(),
    }
}

/// Loss of one batch and the number of correct predictions in it.
fn batch_loss<B: Backend>(
    layout: &NetworkLayout,
    module: &NetworkModule<B>,
    batcher: &SampleBatcher<B>,
    batch: SampleBatch<B>,
    loss_kind: LossKind,
    num_classes: usize,
) -> (Tensor<B, 1>, usize) {
    let device = batch.inputs.device();

    let (loss, predictions) = if loss_kind.is_cross_entropy() {
        let logits = layout.forward_logits(module, batch.inputs);
        let loss = CrossEntropyLossConfig::new()
            .init(&device)
            .forward(logits.clone(), batch.targets);
        (loss, logits)
    } else {
        let probabilities = layout.forward(module, batch.inputs);
        let targets = batcher.one_hot(&batch.labels, num_classes);
        let loss = MseLoss::new().forward(probabilities.clone(), targets, Reduction::Mean);
        (loss, probabilities)
    };

    (loss, count_correct(predictions, &batch.labels))
}

fn count_correct<B: Backend>(predictions: Tensor<B, 2>, labels: &[usize]) -> usize {
    let predicted: Vec<i64> = predictions
        .argmax(1)
        .into_data()
        .convert::<i64>()
        .to_vec()
        .unwrap_or_default();

    predicted
        .iter()
        .zip(labels)
        .filter(|&(&p, &l)| usize::try_from(p).is_ok_and(|p| p == l))
        .count()
}

fn scalar<B: Backend>(tensor: Tensor<B, 1>) -> f64 {
    tensor
        .into_data()
        .convert::<f64>()
        .to_vec::<f64>()
        .ok()
        .and_then(|v| v.first().copied())
        .unwrap_or(f64::NAN)
}

fn dataset_shuffle(indices: &mut [usize], seed: u64, epoch: usize) {
    crate::dataset::shuffle_indices(indices, seed.wrapping_add(epoch as u64 + 1));
}

fn check_samples(layout: &NetworkLayout, samples: &[Sample], num_classes: usize) -> Result<(), NetworkError> {
    if samples.is_empty() {
        return Err(NetworkError::NoSamples);
    }

    let output = layout.output_shape();
    if output != TensorShape::Vector(num_classes) {
        return Err(NetworkError::OutputMismatch {
            classes: num_classes,
            output,
        });
    }

    let expected = layout.input_shape().len();
    if let Some(sample) = samples.iter().find(|s| s.input.len() != expected) {
        return Err(NetworkError::InputMismatch {
            expected,
            actual: sample.input.len(),
        });
    }

    if let Some(sample) = samples.iter().find(|s| s.label >= num_classes) {
        return Err(NetworkError::LabelOutOfRange {
            label: sample.label,
            classes: num_classes,
        });
    }

    Ok(())
}

/// Running sums over the batches of one pass.
#[derive(Debug, Default)]
struct Totals {
    loss_sum: f64,
    batches: usize,
    correct: usize,
    seen: usize,
}

impl Totals {
    fn add(&mut self, loss: f64, correct: usize, seen: usize) {
        self.loss_sum += loss;
        self.batches += 1;
        self.correct += correct;
        self.seen += seen;
    }

    #[allow(clippy::cast_precision_loss)]
    fn mean_loss(&self) -> f64 {
        if self.batches == 0 {
            0.0
        } else {
            self.loss_sum / self.batches as f64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn accuracy(&self) -> f64 {
        if self.seen == 0 {
            0.0
        } else {
            self.correct as f64 / self.seen as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};
    use labelnet_structs::{ActivationFunction, LayerKind, LayerSpec};

    use super::*;
    use crate::build_network;

    type TrainBackend = Autodiff<NdArray>;

    /// Two linearly separable classes: the sign of the first feature.
    fn separable_samples(count: usize) -> Vec<Sample> {
        (0..count)
            .map(|i| {
                let label = i % 2;
                let sign = if label == 0 { -1.0 } else { 1.0 };
                #[allow(clippy::cast_precision_loss)]
                let jitter = (i % 7) as f32 * 0.05;
                Sample {
                    input: vec![sign * (1.0 + jitter), 0.5 - jitter],
                    label,
                }
            })
            .collect()
    }

    fn classifier() -> Vec<LayerSpec> {
        vec![
            LayerSpec::new(LayerKind::Dense { nodes_count: 8 })
                .with_activation(ActivationFunction::Relu)
                .with_input(Some(2), None, None),
            LayerSpec::new(LayerKind::Dense { nodes_count: 2 })
                .with_activation(ActivationFunction::Softmax),
        ]
    }

    fn build() -> Network<TrainBackend> {
        build_network(&classifier(), TensorShape::Vector(2), &Default::default()).unwrap()
    }

    #[test]
    fn test_fit_learns_separable_data() {
        let samples = separable_samples(64);
        let config = TrainConfig {
            learning_rate: 0.05,
            batch_size: 16,
            validation_split: 0.25,
            ..TrainConfig::new(OptimizerKind::Adam, LossKind::SparseCategoricalCrossentropy, 30)
        };

        let (network, history) = fit(build(), &samples, 2, &config).unwrap();

        assert_eq!(history.loss.len(), 30);
        assert_eq!(history.accuracy.len(), 30);
        assert_eq!(history.val_loss.len(), 30);
        assert_eq!(history.val_accuracy.len(), 30);
        assert!(history.loss[29] < history.loss[0], "loss did not decrease: {history:?}");
        assert!(history.final_accuracy().unwrap() > 0.9, "{history:?}");

        let evaluation = evaluate(&network, &samples, 2, LossKind::SparseCategoricalCrossentropy).unwrap();
        assert!(evaluation.accuracy > 0.9);
    }

    #[test]
    fn test_every_optimizer_and_loss_runs() {
        let samples = separable_samples(8);
        for optimizer in [
            OptimizerKind::Adam,
            OptimizerKind::AdamW,
            OptimizerKind::Sgd,
            OptimizerKind::RmsProp,
            OptimizerKind::AdaGrad,
        ] {
            for loss in [
                LossKind::SparseCategoricalCrossentropy,
                LossKind::CategoricalCrossentropy,
                LossKind::MeanSquaredError,
            ] {
                let config = TrainConfig::new(optimizer, loss, 1);
                let (_, history) = fit(build(), &samples, 2, &config).unwrap();
                assert_eq!(history.loss.len(), 1);
                assert!(history.loss[0].is_finite(), "{optimizer} / {loss}");
                assert!(history.val_loss.is_empty());
            }
        }
    }

    #[test]
    fn test_output_must_match_class_count() {
        let samples = separable_samples(4);
        let config = TrainConfig::new(OptimizerKind::Sgd, LossKind::MeanSquaredError, 1);
        assert!(matches!(
            fit(build(), &samples, 3, &config),
            Err(NetworkError::OutputMismatch { classes: 3, .. })
        ));
    }

    #[test]
    fn test_rejects_bad_samples() {
        let config = TrainConfig::new(OptimizerKind::Sgd, LossKind::MeanSquaredError, 1);
        assert!(matches!(fit(build(), &[], 2, &config), Err(NetworkError::NoSamples)));

        let short = vec![Sample {
            input: vec![1.0],
            label: 0,
        }];
        assert!(matches!(
            fit(build(), &short, 2, &config),
            Err(NetworkError::InputMismatch { expected: 2, actual: 1 })
        ));

        let unknown_label = vec![Sample {
            input: vec![1.0, 1.0],
            label: 5,
        }];
        assert!(matches!(
            fit(build(), &unknown_label, 2, &config),
            Err(NetworkError::LabelOutOfRange { label: 5, .. })
        ));
    }

    #[test]
    fn test_final_accuracy_prefers_validation() {
        let history = History {
            accuracy: vec![0.5, 0.7],
            loss: vec![1.0, 0.5],
            val_accuracy: vec![0.4, 0.6],
            val_loss: vec![1.1, 0.8],
        };
        assert_eq!(history.final_accuracy(), Some(0.6));

        let no_validation = History {
            val_accuracy: vec![],
            val_loss: vec![],
            ..history
        };
        assert_eq!(no_validation.final_accuracy(), Some(0.7));
        assert_eq!(History::default().final_accuracy(), None);
    }
}
