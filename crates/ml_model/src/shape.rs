//! Shape inference over a layer list.

use core::fmt;

use labelnet_structs::{DEFAULT_POOL_SIZE, LayerKind, LayerSpec, LayerType};
use serde::{Deserialize, Serialize};

use crate::NetworkError;

/// Shape of one sample flowing through a network, without the batch dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TensorShape {
    Image {
        channels: usize,
        height: usize,
        width: usize,
    },
    Vector(usize),
}

impl TensorShape {
    /// Number of values in one sample.
    #[must_use]
    pub const fn len(self) -> usize {
        match self {
            Self::Image {
                channels,
                height,
                width,
            } => channels * height * width,
            Self::Vector(len) => len,
        }
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.len() == 0
    }

    /// The `(channels, height, width)` an image must be decoded to for this input.
    ///
    /// Vector inputs are matched against the dataset size `(width, height)`, as
    /// grayscale first and RGB second, then against square grayscale and RGB images.
    #[must_use]
    pub fn image_layout(self, dataset_size: Option<(usize, usize)>) -> Option<(usize, usize, usize)> {
        let len = match self {
            Self::Image {
                channels,
                height,
                width,
            } => return Some((channels, height, width)),
            Self::Vector(len) => len,
        };

        if let Some((width, height)) = dataset_size {
            if width * height == len {
                return Some((1, height, width));
            }
            if 3 * width * height == len {
                return Some((3, height, width));
            }
        }

        [1, 3].into_iter().find_map(|channels| {
            if len % channels != 0 {
                return None;
            }
            let side = (len / channels).isqrt();
            (side > 0 && side * side * channels == len).then_some((channels, side, side))
        })
    }
}

impl fmt::Display for TensorShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image {
                channels,
                height,
                width,
            } => write!(f, "({height}, {width}, {channels})"),
            Self::Vector(len) => write!(f, "({len})"),
        }
    }
}

/// Network input shape from the first layer's input dimensions, or `fallback`.
///
/// `input_x` is the width and `input_y` the height.
///
/// # Errors
///
/// Returns an error if the first layer gives no dimensions and there is no fallback.
pub fn resolve_input_shape(
    first_layer: &LayerSpec,
    fallback: Option<TensorShape>,
) -> Result<TensorShape, NetworkError> {
    let dims = (first_layer.input_x, first_layer.input_y, first_layer.input_z);
    let to_usize = |v: u32| usize::try_from(v).unwrap_or(usize::MAX);

    let declared = match (first_layer.layer_type(), dims) {
        (LayerType::Dense, (Some(x), _, _)) => Some(TensorShape::Vector(to_usize(x))),
        (LayerType::Flatten, (Some(x), Some(y), _)) => Some(TensorShape::Image {
            channels: 1,
            height: to_usize(y),
            width: to_usize(x),
        }),
        (
            LayerType::Conv2d | LayerType::Rescaling | LayerType::RandomFlip | LayerType::Resizing,
            (Some(x), Some(y), Some(z)),
        ) => Some(TensorShape::Image {
            channels: to_usize(z),
            height: to_usize(y),
            width: to_usize(x),
        }),
        _ => None,
    };

    declared.or(fallback).ok_or(NetworkError::MissingInputShape)
}

/// Output shape of every layer, in order.
///
/// # Errors
///
/// Returns an error naming the first layer that cannot accept its input.
pub fn infer_shapes(input: TensorShape, specs: &[LayerSpec]) -> Result<Vec<TensorShape>, NetworkError> {
    let mut shapes = Vec::with_capacity(specs.len());
    let mut current = input;

    for (position, spec) in specs.iter().enumerate() {
        let fail = |reason: String| NetworkError::Shape {
            position,
            layer_type: spec.layer_type(),
            reason,
        };

        current = match (&spec.kind, current) {
            (LayerKind::Dense { nodes_count }, TensorShape::Vector(_)) => {
                TensorShape::Vector(*nodes_count as usize)
            }
            (LayerKind::Dense { .. }, TensorShape::Image { .. }) => {
                return Err(fail(format!(
                    "expects flat input but receives {current}, add a Flatten layer before it"
                )));
            }
            (
                LayerKind::Conv2d { filters, kernel_size },
                TensorShape::Image { height, width, .. },
            ) => {
                let k = *kernel_size as usize;
                if k > height || k > width {
                    return Err(fail(format!(
                        "kernel size {k} is larger than its {height}x{width} input"
                    )));
                }
                TensorShape::Image {
                    channels: *filters as usize,
                    height: height - k + 1,
                    width: width - k + 1,
                }
            }
            (
                LayerKind::MaxPool2d { pool_size },
                TensorShape::Image {
                    channels,
                    height,
                    width,
                },
            ) => {
                let p = pool_size.unwrap_or(DEFAULT_POOL_SIZE) as usize;
                if p > height || p > width {
                    return Err(fail(format!(
                        "pool size {p} is larger than its {height}x{width} input"
                    )));
                }
                TensorShape::Image {
                    channels,
                    height: height / p,
                    width: width / p,
                }
            }
            (
                LayerKind::Resizing { output_x, output_y },
                TensorShape::Image { channels, .. },
            ) => TensorShape::Image {
                channels,
                height: *output_y as usize,
                width: *output_x as usize,
            },
            (LayerKind::RandomFlip { .. }, shape @ TensorShape::Image { .. }) => shape,
            (
                LayerKind::Conv2d { .. }
                | LayerKind::MaxPool2d { .. }
                | LayerKind::Resizing { .. }
                | LayerKind::RandomFlip { .. },
                TensorShape::Vector(_),
            ) => {
                return Err(fail(format!("expects image input but receives {current}")));
            }
            (LayerKind::Flatten, shape) => TensorShape::Vector(shape.len()),
            (LayerKind::Dropout { .. } | LayerKind::Rescaling { .. }, shape) => shape,
        };

        shapes.push(current);
    }

    Ok(shapes)
}
