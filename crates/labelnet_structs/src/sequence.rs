//! Rules about which layer may follow which.

use serde::Serialize;

use crate::LayerType;

/// A layer whose predecessor is not allowed for its type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SequenceWarning {
    /// Zero-based position of the offending layer
    pub position: usize,
    pub layer_type: LayerType,
    pub message: &'static str,
}

/// Layer types allowed directly before `layer_type`. `None` means "first layer".
#[must_use]
pub const fn allowed_predecessors(layer_type: LayerType) -> &'static [Option<LayerType>] {
    use LayerType::{Conv2d, Dense, Dropout, Flatten, MaxPool2d, RandomFlip, Rescaling, Resizing};

    match layer_type {
        Dense => &[None, Some(Dense), Some(Flatten), Some(Dropout)],
        Conv2d => &[
            None,
            Some(Conv2d),
            Some(MaxPool2d),
            Some(Rescaling),
            Some(RandomFlip),
            Some(Resizing),
        ],
        MaxPool2d => &[Some(Conv2d), Some(MaxPool2d)],
        Dropout => &[Some(Dense), Some(Dropout), Some(Flatten)],
        Flatten => &[
            None,
            Some(Dense),
            Some(Dropout),
            Some(Flatten),
            Some(Conv2d),
            Some(MaxPool2d),
            Some(Rescaling),
            Some(RandomFlip),
            Some(Resizing),
        ],
        Rescaling | RandomFlip | Resizing => &[None, Some(Rescaling), Some(RandomFlip), Some(Resizing)],
    }
}

const fn warning_message(layer_type: LayerType) -> &'static str {
    match layer_type {
        LayerType::Dense => {
            "A Dense layer must be the first one, else follow another Dense layer, a Flatten layer, or a Dropout layer."
        }
        LayerType::Conv2d => {
            "A Conv2D layer must be the first one, else follow another Conv2D layer, a MaxPool2D layer, or a preprocessing layer."
        }
        LayerType::MaxPool2d => "A MaxPool2D layer must follow a Conv2D layer or another MaxPool2D layer.",
        LayerType::Dropout => {
            "A Dropout layer must follow a Dense layer, a Flatten layer, or another Dropout layer."
        }
        LayerType::Flatten => "Invalid previous layer.",
        LayerType::Rescaling | LayerType::RandomFlip | LayerType::Resizing => {
            "Preprocessing layers must come first, optionally after other preprocessing layers."
        }
    }
}

/// Checks every layer against its predecessor.
#[must_use]
pub fn validate_sequence(layer_types: &[LayerType]) -> Vec<SequenceWarning> {
    layer_types
        .iter()
        .enumerate()
        .filter_map(|(position, &layer_type)| {
            let previous = position.checked_sub(1).map(|i| layer_types[i]);
            (!allowed_predecessors(layer_type).contains(&previous)).then_some(SequenceWarning {
                position,
                layer_type,
                message: warning_message(layer_type),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use LayerType::*;

    #[test]
    fn test_valid_image_classifier() {
        let layers = [
            Rescaling, RandomFlip, Conv2d, MaxPool2d, Conv2d, MaxPool2d, Flatten, Dense, Dropout, Dense,
        ];
        assert!(validate_sequence(&layers).is_empty());
    }

    #[test]
    fn test_valid_dense_only() {
        assert!(validate_sequence(&[Dense, Dense]).is_empty());
        assert!(validate_sequence(&[Flatten, Dense]).is_empty());
        assert!(validate_sequence(&[]).is_empty());
    }

    #[test]
    fn test_first_layer_rules() {
        let warnings = validate_sequence(&[MaxPool2d, Conv2d]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].position, 0);
        assert_eq!(warnings[0].layer_type, MaxPool2d);

        let warnings = validate_sequence(&[MaxPool2d, Dense]);
        let positions: Vec<_> = warnings.iter().map(|w| w.position).collect();
        assert_eq!(positions, vec![0, 1]);

        let warnings = validate_sequence(&[Dropout]);
        assert_eq!(warnings[0].position, 0);
    }

    #[test]
    fn test_conv_after_dense_is_flagged() {
        let warnings = validate_sequence(&[Dense, Conv2d, Flatten]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].position, 1);
        assert!(warnings[0].message.starts_with("A Conv2D layer"));
    }

    #[test]
    fn test_preprocessing_after_conv_is_flagged() {
        let warnings = validate_sequence(&[Conv2d, Rescaling, Conv2d]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].layer_type, Rescaling);
    }

    #[test]
    fn test_every_type_has_a_rule() {
        use strum::IntoEnumIterator;

        for layer_type in LayerType::iter() {
            assert!(!allowed_predecessors(layer_type).is_empty());
            assert!(!warning_message(layer_type).is_empty());
        }
    }
}
