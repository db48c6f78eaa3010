//! Layer records: the ordered building blocks of a model.
//!
//! A layer is stored as one flat row (`LayerRow`) with a `layer_type` column and
//! nullable per-type columns. In memory it is a `LayerSpec`: the common input
//! dimensions and activation plus a typed `LayerKind` payload.

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::scale::{self, ScaleError};

pub const MAX_DENSE_NODES: u32 = 512;
pub const MAX_CONV_FILTERS: u32 = 100;
pub const MAX_KERNEL_SIZE: u32 = 100;
pub const MAX_POOL_SIZE: u32 = 100;
pub const MAX_INPUT_SIDE: u32 = 512;
pub const MAX_INPUT_CHANNELS: u32 = 32;
pub const MAX_RESIZE_SIDE: u32 = 1024;
pub const DEFAULT_POOL_SIZE: u32 = 2;
pub const DEFAULT_KERNEL_SIZE: u32 = 3;

/// Layer palette.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[sqlx(type_name = "layer_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LayerType {
    Dense,
    Conv2d,
    MaxPool2d,
    Flatten,
    Dropout,
    Rescaling,
    RandomFlip,
    Resizing,
}

impl LayerType {
    /// Human-readable name, as shown in messages.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Dense => "Dense",
            Self::Conv2d => "Conv2D",
            Self::MaxPool2d => "MaxPool2D",
            Self::Flatten => "Flatten",
            Self::Dropout => "Dropout",
            Self::Rescaling => "Rescaling",
            Self::RandomFlip => "RandomFlip",
            Self::Resizing => "Resizing",
        }
    }

    #[must_use]
    pub const fn accepts_activation(self) -> bool {
        matches!(self, Self::Dense | Self::Conv2d)
    }

    /// Layers that only transform images before the trainable part of a network.
    #[must_use]
    pub const fn is_preprocessing(self) -> bool {
        matches!(self, Self::Rescaling | Self::RandomFlip | Self::Resizing)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
)]
#[sqlx(type_name = "activation_function", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ActivationFunction {
    Relu,
    Softmax,
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
    strum::Display,
    strum::EnumString,
)]
#[sqlx(type_name = "random_flip_mode", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum RandomFlipMode {
    #[default]
    HorizontalAndVertical,
    Horizontal,
    Vertical,
}

impl RandomFlipMode {
    #[must_use]
    pub const fn flips_horizontally(self) -> bool {
        matches!(self, Self::HorizontalAndVertical | Self::Horizontal)
    }

    #[must_use]
    pub const fn flips_vertically(self) -> bool {
        matches!(self, Self::HorizontalAndVertical | Self::Vertical)
    }
}

/// Per-type payload of a layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "layer_type", rename_all = "lowercase")]
pub enum LayerKind {
    Dense { nodes_count: u32 },
    Conv2d { filters: u32, kernel_size: u32 },
    MaxPool2d { pool_size: Option<u32> },
    Flatten,
    Dropout { rate: f64 },
    Rescaling { scale: String, offset: f64 },
    RandomFlip { mode: RandomFlipMode },
    Resizing { output_x: u32, output_y: u32 },
}

impl LayerKind {
    #[must_use]
    pub const fn layer_type(&self) -> LayerType {
        match self {
            Self::Dense { .. } => LayerType::Dense,
            Self::Conv2d { .. } => LayerType::Conv2d,
            Self::MaxPool2d { .. } => LayerType::MaxPool2d,
            Self::Flatten => LayerType::Flatten,
            Self::Dropout { .. } => LayerType::Dropout,
            Self::Rescaling { .. } => LayerType::Rescaling,
            Self::RandomFlip { .. } => LayerType::RandomFlip,
            Self::Resizing { .. } => LayerType::Resizing,
        }
    }

    /// Builds the payload of a `layer_type` layer, applying defaults for absent fields.
    ///
    /// # Errors
    ///
    /// Returns an error if a required field is missing or a value is out of range.
    pub fn from_params(layer_type: LayerType, params: &LayerParams) -> Result<Self, LayerError> {
        let kind = match layer_type {
            LayerType::Dense => Self::Dense {
                nodes_count: check_range("nodes_count", params.nodes_count.unwrap_or(1), 1, MAX_DENSE_NODES)?,
            },
            LayerType::Conv2d => Self::Conv2d {
                filters: check_range("filters", params.filters.unwrap_or(1), 1, MAX_CONV_FILTERS)?,
                kernel_size: check_range(
                    "kernel_size",
                    params.kernel_size.unwrap_or(DEFAULT_KERNEL_SIZE),
                    1,
                    MAX_KERNEL_SIZE,
                )?,
            },
            LayerType::MaxPool2d => Self::MaxPool2d {
                pool_size: params
                    .pool_size
                    .map(|p| check_range("pool_size", p, 1, MAX_POOL_SIZE))
                    .transpose()?,
            },
            LayerType::Flatten => Self::Flatten,
            LayerType::Dropout => {
                let rate = params.rate.ok_or(LayerError::MissingField {
                    layer_type,
                    field: "rate",
                })?;
                if !(0.0..=1.0).contains(&rate) {
                    return Err(LayerError::OutOfRange {
                        field: "rate",
                        value: rate,
                        min: 0.0,
                        max: 1.0,
                    });
                }
                Self::Dropout { rate }
            }
            LayerType::Rescaling => {
                let scale = params
                    .scale
                    .as_deref()
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .ok_or(LayerError::MissingField {
                        layer_type,
                        field: "scale",
                    })?;
                scale::evaluate(scale)?;

                let offset = params.offset.unwrap_or(0.0);
                if !offset.is_finite() {
                    return Err(LayerError::NotFinite { field: "offset" });
                }

                Self::Rescaling {
                    scale: scale.to_string(),
                    offset,
                }
            }
            LayerType::RandomFlip => Self::RandomFlip {
                mode: params.mode.unwrap_or_default(),
            },
            LayerType::Resizing => {
                let output_x = params.output_x.ok_or(LayerError::MissingField {
                    layer_type,
                    field: "output_x",
                })?;
                let output_y = params.output_y.ok_or(LayerError::MissingField {
                    layer_type,
                    field: "output_y",
                })?;
                Self::Resizing {
                    output_x: check_range("output_x", output_x, 1, MAX_RESIZE_SIDE)?,
                    output_y: check_range("output_y", output_y, 1, MAX_RESIZE_SIDE)?,
                }
            }
        };

        Ok(kind)
    }
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<u32, LayerError> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(LayerError::OutOfRange {
            field,
            value: f64::from(value),
            min: f64::from(min),
            max: f64::from(max),
        })
    }
}

/// Raw, untyped layer fields as they arrive from a request or a database row.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerParams {
    pub activation_function: Option<ActivationFunction>,
    pub input_x: Option<u32>,
    pub input_y: Option<u32>,
    pub input_z: Option<u32>,
    pub nodes_count: Option<u32>,
    pub filters: Option<u32>,
    pub kernel_size: Option<u32>,
    pub pool_size: Option<u32>,
    pub rate: Option<f64>,
    pub scale: Option<String>,
    pub offset: Option<f64>,
    pub mode: Option<RandomFlipMode>,
    pub output_x: Option<u32>,
    pub output_y: Option<u32>,
}

/// A layer without its identity: everything a network is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    #[serde(flatten)]
    pub kind: LayerKind,

    #[serde(default, with = "activation_string")]
    pub activation_function: Option<ActivationFunction>,

    #[serde(default)]
    pub input_x: Option<u32>,

    #[serde(default)]
    pub input_y: Option<u32>,

    #[serde(default)]
    pub input_z: Option<u32>,
}

impl LayerSpec {
    /// Builds and validates a layer of `layer_type` from raw fields.
    ///
    /// An activation given for a type that does not take one is dropped.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload or the input dimensions are invalid.
    pub fn from_params(layer_type: LayerType, params: &LayerParams) -> Result<Self, LayerError> {
        let spec = Self {
            kind: LayerKind::from_params(layer_type, params)?,
            activation_function: params
                .activation_function
                .filter(|_| layer_type.accepts_activation()),
            input_x: params.input_x,
            input_y: params.input_y,
            input_z: params.input_z,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// A layer of the given kind with no input dimensions or activation.
    #[must_use]
    pub const fn new(kind: LayerKind) -> Self {
        Self {
            kind,
            activation_function: None,
            input_x: None,
            input_y: None,
            input_z: None,
        }
    }

    #[must_use]
    pub const fn with_activation(mut self, activation: ActivationFunction) -> Self {
        self.activation_function = Some(activation);
        self
    }

    #[must_use]
    pub const fn with_input(mut self, x: Option<u32>, y: Option<u32>, z: Option<u32>) -> Self {
        self.input_x = x;
        self.input_y = y;
        self.input_z = z;
        self
    }

    #[must_use]
    pub const fn layer_type(&self) -> LayerType {
        self.kind.layer_type()
    }

    /// Checks the activation and the input dimensions against the layer type.
    ///
    /// # Errors
    ///
    /// Returns an error describing the first violated rule.
    pub fn validate(&self) -> Result<(), LayerError> {
        let layer_type = self.layer_type();

        if self.activation_function.is_some() && !layer_type.accepts_activation() {
            return Err(LayerError::ActivationNotAllowed(layer_type));
        }

        let (x, y, z) = (self.input_x, self.input_y, self.input_z);
        let all_or_none = matches!((x, y, z), (Some(_), Some(_), Some(_)) | (None, None, None));
        let allowed = match layer_type {
            LayerType::Dense => y.is_none() && z.is_none(),
            LayerType::Flatten => z.is_none() && x.is_some() == y.is_some(),
            LayerType::Conv2d | LayerType::Rescaling | LayerType::RandomFlip | LayerType::Resizing => {
                all_or_none
            }
            LayerType::MaxPool2d | LayerType::Dropout => x.is_none() && y.is_none() && z.is_none(),
        };
        if !allowed {
            return Err(LayerError::InvalidDimensions {
                layer_type,
                expected: expected_dimensions(layer_type),
            });
        }

        for (field, value, max) in [
            ("input_x", x, MAX_INPUT_SIDE),
            ("input_y", y, MAX_INPUT_SIDE),
            ("input_z", z, MAX_INPUT_CHANNELS),
        ] {
            if let Some(value) = value {
                check_range(field, value, 1, max)?;
            }
        }

        Ok(())
    }

    /// Whether the layer fixes the network input shape.
    #[must_use]
    pub const fn has_input_dimensions(&self) -> bool {
        self.input_x.is_some()
    }

    /// Flattens the layer into per-column values for storage.
    #[must_use]
    pub fn columns(&self) -> LayerColumns {
        let mut columns = LayerColumns {
            layer_type: self.layer_type(),
            activation_function: self.activation_function,
            input_x: self.input_x.map(to_column),
            input_y: self.input_y.map(to_column),
            input_z: self.input_z.map(to_column),
            ..LayerColumns::default()
        };

        match &self.kind {
            LayerKind::Dense { nodes_count } => columns.nodes_count = Some(to_column(*nodes_count)),
            LayerKind::Conv2d { filters, kernel_size } => {
                columns.filters = Some(to_column(*filters));
                columns.kernel_size = Some(to_column(*kernel_size));
            }
            LayerKind::MaxPool2d { pool_size } => columns.pool_size = pool_size.map(to_column),
            LayerKind::Flatten => {}
            LayerKind::Dropout { rate } => columns.rate = Some(*rate),
            LayerKind::Rescaling { scale, offset } => {
                columns.scale = Some(scale.clone());
                columns.offset = Some(*offset);
            }
            LayerKind::RandomFlip { mode } => columns.mode = Some(*mode),
            LayerKind::Resizing { output_x, output_y } => {
                columns.output_x = Some(to_column(*output_x));
                columns.output_y = Some(to_column(*output_y));
            }
        }

        columns
    }
}

impl fmt::Display for LayerSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.layer_type().display_name();
        match &self.kind {
            LayerKind::Dense { nodes_count } => write!(f, "{name} ({nodes_count})"),
            LayerKind::Conv2d { filters, kernel_size } => write!(f, "{name} ({filters}, {kernel_size})"),
            LayerKind::MaxPool2d { pool_size } => {
                write!(f, "{name} ({})", pool_size.unwrap_or(DEFAULT_POOL_SIZE))
            }
            LayerKind::Flatten => match (self.input_x, self.input_y) {
                (Some(x), Some(y)) => write!(f, "{name} ({x}, {y})"),
                _ => f.write_str(name),
            },
            LayerKind::Dropout { rate } => write!(f, "{name} ({rate})"),
            LayerKind::Rescaling { scale, offset } => write!(f, "{name} ({scale}, {offset})"),
            LayerKind::RandomFlip { mode } => write!(f, "{name} ({mode})"),
            LayerKind::Resizing { output_x, output_y } => write!(f, "{name} ({output_x}, {output_y})"),
        }
    }
}

const fn expected_dimensions(layer_type: LayerType) -> &'static str {
    match layer_type {
        LayerType::Dense => "input_x only",
        LayerType::Flatten => "input_x and input_y together, or none",
        LayerType::Conv2d | LayerType::Rescaling | LayerType::RandomFlip | LayerType::Resizing => {
            "input_x, input_y and input_z together, or none"
        }
        LayerType::MaxPool2d | LayerType::Dropout => "none",
    }
}

// Values are range-checked before they reach storage, so they always fit.
fn to_column(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// A stored layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Layer {
    pub id: i64,
    pub model_id: i64,
    pub index: i32,

    #[serde(flatten)]
    pub spec: LayerSpec,
}

/// Column values of a layer, as bound in inserts and updates.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerColumns {
    pub layer_type: LayerType,
    pub activation_function: Option<ActivationFunction>,
    pub input_x: Option<i32>,
    pub input_y: Option<i32>,
    pub input_z: Option<i32>,
    pub nodes_count: Option<i32>,
    pub filters: Option<i32>,
    pub kernel_size: Option<i32>,
    pub pool_size: Option<i32>,
    pub rate: Option<f64>,
    pub scale: Option<String>,
    pub offset: Option<f64>,
    pub mode: Option<RandomFlipMode>,
    pub output_x: Option<i32>,
    pub output_y: Option<i32>,
}

impl Default for LayerColumns {
    fn default() -> Self {
        Self {
            layer_type: LayerType::Dense,
            activation_function: None,
            input_x: None,
            input_y: None,
            input_z: None,
            nodes_count: None,
            filters: None,
            kernel_size: None,
            pool_size: None,
            rate: None,
            scale: None,
            offset: None,
            mode: None,
            output_x: None,
            output_y: None,
        }
    }
}

/// A row of the `layers` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct LayerRow {
    pub id: i64,
    pub model_id: i64,
    pub index: i32,
    pub layer_type: LayerType,
    pub activation_function: Option<ActivationFunction>,
    pub input_x: Option<i32>,
    pub input_y: Option<i32>,
    pub input_z: Option<i32>,
    pub nodes_count: Option<i32>,
    pub filters: Option<i32>,
    pub kernel_size: Option<i32>,
    pub pool_size: Option<i32>,
    pub rate: Option<f64>,
    pub scale: Option<String>,
    pub offset: Option<f64>,
    pub mode: Option<RandomFlipMode>,
    pub output_x: Option<i32>,
    pub output_y: Option<i32>,
}

impl TryFrom<LayerRow> for Layer {
    type Error = LayerError;

    fn try_from(row: LayerRow) -> Result<Self, Self::Error> {
        let unsigned = |field: &'static str, value: Option<i32>| {
            value
                .map(|v| u32::try_from(v).map_err(|_| LayerError::Negative { field }))
                .transpose()
        };

        let params = LayerParams {
            activation_function: row.activation_function,
            input_x: unsigned("input_x", row.input_x)?,
            input_y: unsigned("input_y", row.input_y)?,
            input_z: unsigned("input_z", row.input_z)?,
            nodes_count: unsigned("nodes_count", row.nodes_count)?,
            filters: unsigned("filters", row.filters)?,
            kernel_size: unsigned("kernel_size", row.kernel_size)?,
            pool_size: unsigned("pool_size", row.pool_size)?,
            rate: row.rate,
            scale: row.scale,
            offset: row.offset,
            mode: row.mode,
            output_x: unsigned("output_x", row.output_x)?,
            output_y: unsigned("output_y", row.output_y)?,
        };

        Ok(Self {
            id: row.id,
            model_id: row.model_id,
            index: row.index,
            spec: LayerSpec::from_params(row.layer_type, &params)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LayerError {
    #[error("{} layers require {field}", .layer_type.display_name())]
    MissingField {
        layer_type: LayerType,
        field: &'static str,
    },

    #[error("{field} must be between {min} and {max}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{field} must not be negative")]
    Negative { field: &'static str },

    #[error("a dropout rate of {0} drops every unit and cannot be trained")]
    DropsEverything(f64),

    #[error("{field} must be a finite number")]
    NotFinite { field: &'static str },

    #[error("{} layers do not take an activation function", .0.display_name())]
    ActivationNotAllowed(LayerType),

    #[error("{} layers take input dimensions: {expected}", .layer_type.display_name())]
    InvalidDimensions {
        layer_type: LayerType,
        expected: &'static str,
    },

    #[error("invalid scale: {0}")]
    InvalidScale(#[from] ScaleError),
}

/// Serializes an absent activation as `""`, the way clients send it.
mod activation_string {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::ActivationFunction;

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        value: &Option<ActivationFunction>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(activation) => serializer.collect_str(activation),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<ActivationFunction>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> LayerParams {
        LayerParams::default()
    }

    #[test]
    fn test_dense_defaults() {
        let spec = LayerSpec::from_params(LayerType::Dense, &params()).unwrap();
        assert_eq!(spec.kind, LayerKind::Dense { nodes_count: 1 });
        assert_eq!(spec.activation_function, None);
    }

    #[test]
    fn test_conv_defaults() {
        let spec = LayerSpec::from_params(LayerType::Conv2d, &params()).unwrap();
        assert_eq!(
            spec.kind,
            LayerKind::Conv2d {
                filters: 1,
                kernel_size: 3
            }
        );
    }

    #[test]
    fn test_dense_range() {
        let too_many = LayerParams {
            nodes_count: Some(513),
            ..params()
        };
        assert!(matches!(
            LayerSpec::from_params(LayerType::Dense, &too_many),
            Err(LayerError::OutOfRange {
                field: "nodes_count",
                ..
            })
        ));

        let zero = LayerParams {
            nodes_count: Some(0),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Dense, &zero).is_err());
    }

    #[test]
    fn test_dropout_requires_rate_in_unit_interval() {
        assert!(matches!(
            LayerSpec::from_params(LayerType::Dropout, &params()),
            Err(LayerError::MissingField { field: "rate", .. })
        ));

        let bad = LayerParams {
            rate: Some(1.5),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Dropout, &bad).is_err());

        let good = LayerParams {
            rate: Some(0.25),
            ..params()
        };
        assert_eq!(
            LayerSpec::from_params(LayerType::Dropout, &good).unwrap().kind,
            LayerKind::Dropout { rate: 0.25 }
        );
    }

    #[test]
    fn test_rescaling_checks_scale_expression() {
        let good = LayerParams {
            scale: Some("1/255".to_string()),
            ..params()
        };
        let spec = LayerSpec::from_params(LayerType::Rescaling, &good).unwrap();
        assert_eq!(
            spec.kind,
            LayerKind::Rescaling {
                scale: "1/255".to_string(),
                offset: 0.0
            }
        );

        let bad = LayerParams {
            scale: Some("1/0".to_string()),
            ..params()
        };
        assert!(matches!(
            LayerSpec::from_params(LayerType::Rescaling, &bad),
            Err(LayerError::InvalidScale(ScaleError::DivisionByZero))
        ));

        assert!(matches!(
            LayerSpec::from_params(LayerType::Rescaling, &params()),
            Err(LayerError::MissingField { field: "scale", .. })
        ));
    }

    #[test]
    fn test_resizing_requires_output_size() {
        let missing = LayerParams {
            output_x: Some(32),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Resizing, &missing).is_err());

        let both = LayerParams {
            output_x: Some(32),
            output_y: Some(16),
            ..params()
        };
        assert_eq!(
            LayerSpec::from_params(LayerType::Resizing, &both).unwrap().kind,
            LayerKind::Resizing {
                output_x: 32,
                output_y: 16
            }
        );
    }

    #[test]
    fn test_activation_dropped_for_layers_without_one() {
        let with_activation = LayerParams {
            activation_function: Some(ActivationFunction::Relu),
            ..params()
        };
        let spec = LayerSpec::from_params(LayerType::Flatten, &with_activation).unwrap();
        assert_eq!(spec.activation_function, None);

        let spec = LayerSpec::from_params(LayerType::Dense, &with_activation).unwrap();
        assert_eq!(spec.activation_function, Some(ActivationFunction::Relu));

        let forced = LayerSpec::new(LayerKind::Flatten).with_activation(ActivationFunction::Relu);
        assert_eq!(
            forced.validate(),
            Err(LayerError::ActivationNotAllowed(LayerType::Flatten))
        );
    }

    #[test]
    fn test_conv_dimensions_all_or_none() {
        let partial = LayerParams {
            input_x: Some(28),
            input_y: Some(28),
            ..params()
        };
        assert!(matches!(
            LayerSpec::from_params(LayerType::Conv2d, &partial),
            Err(LayerError::InvalidDimensions { .. })
        ));

        let full = LayerParams {
            input_z: Some(1),
            ..partial
        };
        assert!(LayerSpec::from_params(LayerType::Conv2d, &full).is_ok());
    }

    #[test]
    fn test_flatten_dimensions() {
        let xy = LayerParams {
            input_x: Some(28),
            input_y: Some(28),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Flatten, &xy).is_ok());

        let xyz = LayerParams {
            input_z: Some(3),
            ..xy.clone()
        };
        assert!(LayerSpec::from_params(LayerType::Flatten, &xyz).is_err());

        let x_only = LayerParams {
            input_x: Some(28),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Flatten, &x_only).is_err());
    }

    #[test]
    fn test_dense_accepts_only_x() {
        let x = LayerParams {
            input_x: Some(10),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Dense, &x).is_ok());

        let xy = LayerParams {
            input_y: Some(10),
            ..x
        };
        assert!(LayerSpec::from_params(LayerType::Dense, &xy).is_err());
    }

    #[test]
    fn test_input_dimension_ranges() {
        let wide = LayerParams {
            input_x: Some(1000),
            input_y: Some(28),
            input_z: Some(1),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Conv2d, &wide).is_err());

        let deep = LayerParams {
            input_x: Some(28),
            input_y: Some(28),
            input_z: Some(64),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::Conv2d, &deep).is_err());
    }

    #[test]
    fn test_pool_layers_take_no_dimensions() {
        let dims = LayerParams {
            input_x: Some(2),
            ..params()
        };
        assert!(LayerSpec::from_params(LayerType::MaxPool2d, &dims).is_err());
        assert!(LayerSpec::from_params(LayerType::Dropout, &LayerParams { rate: Some(0.1), ..dims }).is_err());
    }

    #[test]
    fn test_columns_and_row_agree() {
        let spec = LayerSpec::new(LayerKind::Conv2d {
            filters: 8,
            kernel_size: 5,
        })
        .with_activation(ActivationFunction::Relu)
        .with_input(Some(32), Some(24), Some(3));

        let columns = spec.columns();
        assert_eq!(columns.layer_type, LayerType::Conv2d);
        assert_eq!(columns.filters, Some(8));
        assert_eq!(columns.kernel_size, Some(5));
        assert_eq!(columns.nodes_count, None);

        let row = LayerRow {
            id: 7,
            model_id: 3,
            index: 0,
            layer_type: columns.layer_type,
            activation_function: columns.activation_function,
            input_x: columns.input_x,
            input_y: columns.input_y,
            input_z: columns.input_z,
            nodes_count: columns.nodes_count,
            filters: columns.filters,
            kernel_size: columns.kernel_size,
            pool_size: columns.pool_size,
            rate: columns.rate,
            scale: columns.scale,
            offset: columns.offset,
            mode: columns.mode,
            output_x: columns.output_x,
            output_y: columns.output_y,
        };
        let layer = Layer::try_from(row).unwrap();
        assert_eq!(layer.spec, spec);
    }

    #[test]
    fn test_json_shape() {
        let spec = LayerSpec::new(LayerKind::Dense { nodes_count: 10 })
            .with_activation(ActivationFunction::Softmax);
        let json = serde_json::to_value(&spec).unwrap();
        assert_eq!(json["layer_type"], "dense");
        assert_eq!(json["nodes_count"], 10);
        assert_eq!(json["activation_function"], "softmax");

        let flatten = serde_json::to_value(LayerSpec::new(LayerKind::Flatten)).unwrap();
        assert_eq!(flatten["layer_type"], "flatten");
        assert_eq!(flatten["activation_function"], "");

        let parsed: LayerSpec = serde_json::from_value(flatten).unwrap();
        assert_eq!(parsed, LayerSpec::new(LayerKind::Flatten));

        let flip: LayerSpec =
            serde_json::from_str(r#"{"layer_type": "randomflip", "mode": "vertical"}"#).unwrap();
        assert_eq!(
            flip.kind,
            LayerKind::RandomFlip {
                mode: RandomFlipMode::Vertical
            }
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(
            LayerSpec::new(LayerKind::Conv2d {
                filters: 32,
                kernel_size: 3
            })
            .to_string(),
            "Conv2D (32, 3)"
        );
        assert_eq!(
            LayerSpec::new(LayerKind::MaxPool2d { pool_size: None }).to_string(),
            "MaxPool2D (2)"
        );
    }
}
