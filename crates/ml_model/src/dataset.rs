//! Samples and batching for training and evaluation.

use burn::prelude::*;

/// One decoded, labeled input.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Flattened input values, `CHW` for images
    pub input: Vec<f32>,

    /// Class index
    pub label: usize,
}

/// In-memory dataset of samples.
#[derive(Debug, Clone, Default)]
pub struct SampleDataset {
    items: Vec<Sample>,
}

impl SampleDataset {
    #[must_use]
    pub const fn new(items: Vec<Sample>) -> Self {
        Self { items }
    }

    /// Creates a dataset from the samples at `indices`.
    #[must_use]
    pub fn from_indices(samples: &[Sample], indices: &[usize]) -> Self {
        let items = indices.iter().filter_map(|&i| samples.get(i).cloned()).collect();
        Self { items }
    }
}

impl burn::data::dataset::Dataset<Sample> for SampleDataset {
    fn get(&self, index: usize) -> Option<Sample> {
        self.items.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A batch of samples.
#[derive(Debug, Clone)]
pub struct SampleBatch<B: Backend> {
    /// Inputs of shape `[batch_size, input_len]`.
    pub inputs: Tensor<B, 2>,
    /// Class indices of shape `[batch_size]`.
    pub targets: Tensor<B, 1, Int>,
    /// Class indices, kept on the host for accuracy.
    pub labels: Vec<usize>,
}

/// Batcher for creating batches of samples.
#[derive(Debug, Clone)]
pub struct SampleBatcher<B: Backend> {
    device: B::Device,
    input_len: usize,
}

impl<B: Backend> SampleBatcher<B> {
    #[must_use]
    pub const fn new(device: B::Device, input_len: usize) -> Self {
        Self { device, input_len }
    }

    /// Creates a batch from a vector of items. Every item must hold `input_len` values.
    pub fn batch(&self, items: Vec<Sample>) -> SampleBatch<B> {
        let batch_size = items.len();

        let mut inputs_data = Vec::with_capacity(batch_size * self.input_len);
        let mut labels = Vec::with_capacity(batch_size);

        for item in items {
            inputs_data.extend_from_slice(&item.input);
            labels.push(item.label);
        }

        let inputs = Tensor::<B, 1>::from_floats(inputs_data.as_slice(), &self.device)
            .reshape([batch_size, self.input_len]);

        let targets_data: Vec<i64> = labels
            .iter()
            .map(|&l| i64::try_from(l).unwrap_or(i64::MAX))
            .collect();
        let targets = Tensor::<B, 1, Int>::from_data(
            TensorData::new(targets_data, [batch_size]),
            &self.device,
        );

        SampleBatch {
            inputs,
            targets,
            labels,
        }
    }

    /// One-hot float targets of shape `[batch_size, num_classes]`.
    pub fn one_hot(&self, labels: &[usize], num_classes: usize) -> Tensor<B, 2> {
        let mut data = vec![0.0_f32; labels.len() * num_classes];
        for (row, &label) in labels.iter().enumerate() {
            if label < num_classes {
                data[row * num_classes + label] = 1.0;
            }
        }
        Tensor::<B, 1>::from_floats(data.as_slice(), &self.device).reshape([labels.len(), num_classes])
    }
}

/// Shuffles indices using a simple LCG-based shuffle.
pub fn shuffle_indices(indices: &mut [usize], seed: u64) {
    // Simple Fisher-Yates shuffle with LCG random
    let mut rng_state = seed.wrapping_add(12345);

    for i in (1..indices.len()).rev() {
        // LCG: state = (a * state + c) mod m
        rng_state = rng_state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        #[allow(clippy::cast_possible_truncation)]
        let j = ((rng_state >> 33) as usize) % (i + 1);
        indices.swap(i, j);
    }
}

/// Splits sample indices into training and validation sets.
///
/// The indices are shuffled with `seed` first; the last `validation_split`
/// fraction becomes the validation set. A non-empty validation set always
/// leaves at least one training sample.
#[must_use]
pub fn split_indices(len: usize, validation_split: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..len).collect();
    shuffle_indices(&mut indices, seed);

    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let validation_len = ((len as f64) * validation_split.clamp(0.0, 1.0)).round() as usize;
    let validation_len = validation_len.min(len.saturating_sub(1));

    let validation = indices.split_off(len - validation_len);
    (indices, validation)
}

#[cfg(test)]
mod tests {
    use burn::backend::NdArray;
    use burn::data::dataset::Dataset;

    use super::*;

    type TestBackend = NdArray;

    fn sample(value: f32, label: usize) -> Sample {
        Sample {
            input: vec![value; 4],
            label,
        }
    }

    #[test]
    fn test_dataset() {
        let samples = vec![sample(0.0, 0), sample(1.0, 1), sample(2.0, 0)];
        let dataset = SampleDataset::from_indices(&samples, &[2, 0]);
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.get(0), Some(sample(2.0, 0)));
        assert!(dataset.get(2).is_none());
    }

    #[test]
    fn test_batcher() {
        let device = Default::default();
        let batcher = SampleBatcher::<TestBackend>::new(device, 4);

        let batch = batcher.batch(vec![sample(0.0, 1), sample(1.0, 2)]);
        assert_eq!(batch.inputs.dims(), [2, 4]);
        assert_eq!(batch.targets.dims(), [2]);
        assert_eq!(batch.labels, vec![1, 2]);

        let targets: Vec<i64> = batch.targets.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(targets, vec![1, 2]);
    }

    #[test]
    fn test_one_hot() {
        let batcher = SampleBatcher::<TestBackend>::new(Default::default(), 1);
        let one_hot: Vec<f32> = batcher
            .one_hot(&[2, 0], 3)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        assert_eq!(one_hot, vec![0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_shuffle_indices() {
        let mut indices: Vec<usize> = (0..10).collect();
        let original = indices.clone();

        shuffle_indices(&mut indices, 42);

        // Should be permuted (very unlikely to be the same)
        assert_ne!(indices, original, "Shuffle should change order");

        // Should contain the same elements
        indices.sort_unstable();
        assert_eq!(indices, original, "Shuffle should preserve elements");
    }

    #[test]
    fn test_split_indices() {
        let (train, validation) = split_indices(10, 0.2, 7);
        assert_eq!(train.len(), 8);
        assert_eq!(validation.len(), 2);

        let mut all: Vec<usize> = train.iter().chain(&validation).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..10).collect::<Vec<_>>());

        assert_eq!(split_indices(10, 0.2, 7), (train, validation));
    }

    #[test]
    fn test_split_keeps_a_training_sample() {
        let (train, validation) = split_indices(1, 0.5, 0);
        assert_eq!((train.len(), validation.len()), (1, 0));

        let (train, validation) = split_indices(4, 1.0, 0);
        assert_eq!((train.len(), validation.len()), (1, 3));

        let (train, validation) = split_indices(5, 0.0, 0);
        assert_eq!((train.len(), validation.len()), (5, 0));
    }
}
