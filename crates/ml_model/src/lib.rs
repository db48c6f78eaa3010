//! Neural networks built from user-defined layer lists.
//!
//! This crate uses the Burn deep learning framework to turn an ordered list of
//! layers into a network, train it on labeled samples, evaluate it, and store
//! it as a manifest plus weights.

mod dataset;
mod network;
mod persist;
mod shape;
mod training;

pub use dataset::{Sample, SampleBatch, SampleBatcher, SampleDataset, shuffle_indices, split_indices};
pub use network::{LayerSummary, Network, NetworkLayout, NetworkModule, build_network};
pub use persist::{ModelArtifact, ModelManifest};
pub use shape::{TensorShape, infer_shapes, resolve_input_shape};
pub use training::{Evaluation, History, TrainConfig, evaluate, fit};

use labelnet_structs::{LayerError, LayerType, SequenceWarning};

/// Backend used for training.
pub type TrainBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// Backend used for evaluation and inference.
pub type InferenceBackend = burn::backend::NdArray;

/// Errors raised while building, training or storing a network.
#[derive(Debug, thiserror::Error)]
pub enum NetworkError {
    #[error("the model has no layers")]
    Empty,

    #[error("{}", sequence_message(.0))]
    Sequence(Vec<SequenceWarning>),

    #[error("the first layer needs input dimensions")]
    MissingInputShape,

    #[error("layer {} ({}) {reason}", .position + 1, .layer_type.display_name())]
    Shape {
        position: usize,
        layer_type: LayerType,
        reason: String,
    },

    #[error("layer {} is invalid: {source}", .position + 1)]
    InvalidLayer {
        position: usize,
        #[source]
        source: LayerError,
    },

    #[error("the model outputs {output} but the dataset has {classes} labels")]
    OutputMismatch { classes: usize, output: TensorShape },

    #[error("samples hold {actual} values but the model expects {expected}")]
    InputMismatch { expected: usize, actual: usize },

    #[error("label index {label} is outside the {classes} classes")]
    LabelOutOfRange { label: usize, classes: usize },

    #[error("there are no labeled samples")]
    NoSamples,

    #[error("model file error: {0}")]
    Record(String),
}

fn sequence_message(warnings: &[SequenceWarning]) -> String {
    warnings.first().map_or_else(String::new, |w| {
        format!("layer {} ({}): {}", w.position + 1, w.layer_type.display_name(), w.message)
    })
}

#[cfg(test)]
mod tests {
    use labelnet_structs::validate_sequence;

    use super::*;

    #[test]
    fn test_sequence_error_reports_first_warning() {
        let warnings = validate_sequence(&[LayerType::Dense, LayerType::MaxPool2d]);
        let message = NetworkError::Sequence(warnings).to_string();
        assert!(message.starts_with("layer 2 (MaxPool2D):"), "{message}");
    }

    #[test]
    fn test_shape_error_is_one_based() {
        let error = NetworkError::Shape {
            position: 0,
            layer_type: LayerType::Flatten,
            reason: "expects image input".to_string(),
        };
        assert!(error.to_string().starts_with("layer 1 "));
    }
}
