use serde::{Deserialize, Serialize};

/// Optimizers a model can be built with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum OptimizerKind {
    Adam,
    AdamW,
    Sgd,
    RmsProp,
    AdaGrad,
}

impl OptimizerKind {
    /// Learning rate used when a training request does not give one.
    #[must_use]
    pub const fn default_learning_rate(self) -> f64 {
        match self {
            Self::Sgd => 0.01,
            Self::Adam | Self::AdamW | Self::RmsProp | Self::AdaGrad => 0.001,
        }
    }
}

/// Loss functions a model can be built with.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum LossKind {
    SparseCategoricalCrossentropy,
    CategoricalCrossentropy,
    #[strum(to_string = "mean_squared_error", serialize = "mse")]
    #[serde(alias = "mse")]
    MeanSquaredError,
}

impl LossKind {
    /// Whether the loss is computed from logits rather than probabilities.
    #[must_use]
    pub const fn is_cross_entropy(self) -> bool {
        matches!(
            self,
            Self::SparseCategoricalCrossentropy | Self::CategoricalCrossentropy
        )
    }
}

#[cfg(test)]
mod tests {
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn test_optimizer_round_trips_through_strings() {
        for kind in OptimizerKind::iter() {
            assert_eq!(kind.to_string().parse::<OptimizerKind>().ok(), Some(kind));
        }
        assert_eq!("Adam".parse::<OptimizerKind>().ok(), Some(OptimizerKind::Adam));
        assert_eq!("rmsprop".parse::<OptimizerKind>().ok(), Some(OptimizerKind::RmsProp));
        assert!("lbfgs".parse::<OptimizerKind>().is_err());
    }

    #[test]
    fn test_default_learning_rates() {
        assert!((OptimizerKind::Sgd.default_learning_rate() - 0.01).abs() < f64::EPSILON);
        assert!((OptimizerKind::Adam.default_learning_rate() - 0.001).abs() < f64::EPSILON);
    }

    #[test]
    fn test_loss_aliases() {
        assert_eq!("mse".parse::<LossKind>().ok(), Some(LossKind::MeanSquaredError));
        assert_eq!(
            "mean_squared_error".parse::<LossKind>().ok(),
            Some(LossKind::MeanSquaredError)
        );
        assert_eq!(LossKind::MeanSquaredError.to_string(), "mean_squared_error");
        assert_eq!(
            "sparse_categorical_crossentropy".parse::<LossKind>().ok(),
            Some(LossKind::SparseCategoricalCrossentropy)
        );
        assert!(LossKind::CategoricalCrossentropy.is_cross_entropy());
        assert!(!LossKind::MeanSquaredError.is_cross_entropy());
    }
}
