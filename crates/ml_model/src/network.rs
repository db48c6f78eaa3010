//! Turns an ordered layer list into an executable `burn` network.
//!
//! Trainable layers live in `NetworkModule`, grouped by kind so the module can
//! derive `Module`. The order in which they run is kept separately in a plan of
//! steps, together with the parameter-free layers.

use burn::nn::conv::{Conv2d, Conv2dConfig};
use burn::nn::pool::{MaxPool2d, MaxPool2dConfig};
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::Distribution;
use burn::tensor::activation::{relu, softmax};
use burn::tensor::module::interpolate;
use burn::tensor::ops::{InterpolateMode, InterpolateOptions};
use labelnet_structs::{
    ActivationFunction, DEFAULT_POOL_SIZE, LayerError, LayerKind, LayerSpec, LayerType, RandomFlipMode,
    scale, validate_sequence,
};
use serde::Serialize;

use crate::{NetworkError, TensorShape, infer_shapes};

/// Trainable parameters of a network.
#[derive(Module, Debug)]
pub struct NetworkModule<B: Backend> {
    dense: Vec<Linear<B>>,
    conv: Vec<Conv2d<B>>,
    pools: Vec<MaxPool2d>,
    dropouts: Vec<Dropout>,
}

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Dense {
        slot: usize,
        activation: Option<ActivationFunction>,
    },
    Conv2d {
        slot: usize,
        activation: Option<ActivationFunction>,
    },
    MaxPool2d {
        slot: usize,
    },
    Dropout {
        slot: usize,
    },
    Flatten,
    Rescaling {
        scale: f32,
        offset: f32,
    },
    RandomFlip {
        mode: RandomFlipMode,
    },
    Resizing {
        height: usize,
        width: usize,
    },
}

/// What one layer became.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayerSummary {
    pub position: usize,
    pub layer_type: LayerType,
    pub description: String,
    pub output_shape: TensorShape,
    pub params: usize,
}

/// Backend-independent part of a network: the execution plan and its shapes.
#[derive(Debug, Clone)]
pub struct NetworkLayout {
    plan: Vec<Step>,

    /// Step whose softmax is left out when computing logits
    logits_step: Option<usize>,

    input_shape: TensorShape,
    output_shape: TensorShape,
    summaries: Vec<LayerSummary>,
}

/// A built network.
#[derive(Debug)]
pub struct Network<B: Backend> {
    pub module: NetworkModule<B>,
    pub layout: NetworkLayout,
    pub device: B::Device,
}

enum Activations<B: Backend> {
    Spatial(Tensor<B, 4>),
    Flat(Tensor<B, 2>),
}

/// Builds a freshly initialized network from `specs`.
///
/// # Errors
///
/// Returns an error if the list is empty, violates the ordering rules, holds an
/// invalid layer or does not fit the input shape.
pub fn build_network<B: Backend>(
    specs: &[LayerSpec],
    input_shape: TensorShape,
    device: &B::Device,
) -> Result<Network<B>, NetworkError> {
    if specs.is_empty() {
        return Err(NetworkError::Empty);
    }

    let layer_types: Vec<LayerType> = specs.iter().map(LayerSpec::layer_type).collect();
    let warnings = validate_sequence(&layer_types);
    if !warnings.is_empty() {
        return Err(NetworkError::Sequence(warnings));
    }

    for (position, spec) in specs.iter().enumerate() {
        spec.validate()
            .map_err(|source| NetworkError::InvalidLayer { position, source })?;
    }

    let shapes = infer_shapes(input_shape, specs)?;

    let mut module = NetworkModule {
        dense: Vec::new(),
        conv: Vec::new(),
        pools: Vec::new(),
        dropouts: Vec::new(),
    };
    let mut plan = Vec::with_capacity(specs.len());
    let mut summaries = Vec::with_capacity(specs.len());
    let mut previous = input_shape;

    for (position, (spec, &output_shape)) in specs.iter().zip(&shapes).enumerate() {
        let activation = spec.activation_function;
        let (step, params) = match &spec.kind {
            LayerKind::Dense { nodes_count } => {
                let linear = LinearConfig::new(previous.len(), *nodes_count as usize).init(device);
                let params = linear.num_params();
                module.dense.push(linear);
                (
                    Step::Dense {
                        slot: module.dense.len() - 1,
                        activation,
                    },
                    params,
                )
            }
            LayerKind::Conv2d { filters, kernel_size } => {
                let TensorShape::Image { channels, .. } = previous else {
                    return Err(NetworkError::Shape {
                        position,
                        layer_type: LayerType::Conv2d,
                        reason: format!("expects image input but receives {previous}"),
                    });
                };
                let k = *kernel_size as usize;
                let conv = Conv2dConfig::new([channels, *filters as usize], [k, k]).init(device);
                let params = conv.num_params();
                module.conv.push(conv);
                (
                    Step::Conv2d {
                        slot: module.conv.len() - 1,
                        activation,
                    },
                    params,
                )
            }
            LayerKind::MaxPool2d { pool_size } => {
                let p = pool_size.unwrap_or(DEFAULT_POOL_SIZE) as usize;
                module.pools.push(MaxPool2dConfig::new([p, p]).with_strides([p, p]).init());
                (
                    Step::MaxPool2d {
                        slot: module.pools.len() - 1,
                    },
                    0,
                )
            }
            LayerKind::Dropout { rate } => {
                if *rate >= 1.0 {
                    return Err(NetworkError::InvalidLayer {
                        position,
                        source: LayerError::DropsEverything(*rate),
                    });
                }
                module.dropouts.push(DropoutConfig::new(*rate).init());
                (
                    Step::Dropout {
                        slot: module.dropouts.len() - 1,
                    },
                    0,
                )
            }
            LayerKind::Flatten => (Step::Flatten, 0),
            LayerKind::Rescaling { scale: expr, offset } => {
                let value = scale::evaluate(expr).map_err(|e| NetworkError::InvalidLayer {
                    position,
                    source: e.into(),
                })?;
                #[allow(clippy::cast_possible_truncation)]
                let step = Step::Rescaling {
                    scale: value as f32,
                    offset: *offset as f32,
                };
                (step, 0)
            }
            LayerKind::RandomFlip { mode } => (Step::RandomFlip { mode: *mode }, 0),
            LayerKind::Resizing { output_x, output_y } => (
                Step::Resizing {
                    height: *output_y as usize,
                    width: *output_x as usize,
                },
                0,
            ),
        };

        summaries.push(LayerSummary {
            position,
            layer_type: spec.layer_type(),
            description: spec.to_string(),
            output_shape,
            params,
        });
        plan.push(step);
        previous = output_shape;
    }

    let logits_step = find_logits_step(&plan);

    Ok(Network {
        module,
        layout: NetworkLayout {
            plan,
            logits_step,
            input_shape,
            output_shape: previous,
            summaries,
        },
        device: device.clone(),
    })
}

/// The last trainable step, if it ends in a softmax that only shape-neutral steps follow.
fn find_logits_step(plan: &[Step]) -> Option<usize> {
    let position = plan
        .iter()
        .rposition(|step| matches!(step, Step::Dense { .. } | Step::Conv2d { .. }))?;

    let tail_is_neutral = plan[position + 1..]
        .iter()
        .all(|step| matches!(step, Step::Dropout { .. } | Step::Flatten));

    let ends_in_softmax = matches!(
        plan[position],
        Step::Dense {
            activation: Some(ActivationFunction::Softmax),
            ..
        } | Step::Conv2d {
            activation: Some(ActivationFunction::Softmax),
            ..
        }
    );

    (tail_is_neutral && ends_in_softmax).then_some(position)
}

impl NetworkLayout {
    #[must_use]
    pub const fn input_shape(&self) -> TensorShape {
        self.input_shape
    }

    #[must_use]
    pub const fn output_shape(&self) -> TensorShape {
        self.output_shape
    }

    #[must_use]
    pub fn summaries(&self) -> &[LayerSummary] {
        &self.summaries
    }

    /// Runs the network on `[batch, input_len]` input and returns `[batch, output_len]`.
    pub fn forward<B: Backend>(&self, module: &NetworkModule<B>, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.run(module, input, None)
    }

    /// Like `forward`, without the final softmax.
    pub fn forward_logits<B: Backend>(
        &self,
        module: &NetworkModule<B>,
        input: Tensor<B, 2>,
    ) -> Tensor<B, 2> {
        self.run(module, input, self.logits_step)
    }

    fn run<B: Backend>(
        &self,
        module: &NetworkModule<B>,
        input: Tensor<B, 2>,
        skip_softmax_at: Option<usize>,
    ) -> Tensor<B, 2> {
        let [batch, _] = input.dims();
        let mut x = match self.input_shape {
            TensorShape::Image {
                channels,
                height,
                width,
            } => Activations::Spatial(input.reshape([batch, channels, height, width])),
            TensorShape::Vector(_) => Activations::Flat(input),
        };

        for (i, step) in self.plan.iter().enumerate() {
            let skip_softmax = skip_softmax_at == Some(i);

            x = match (step, x) {
                (Step::Dense { slot, activation }, Activations::Flat(t)) => Activations::Flat(
                    activate(module.dense[*slot].forward(t), *activation, skip_softmax),
                ),
                (Step::Conv2d { slot, activation }, Activations::Spatial(t)) => Activations::Spatial(
                    activate(module.conv[*slot].forward(t), *activation, skip_softmax),
                ),
                (Step::MaxPool2d { slot }, Activations::Spatial(t)) => {
                    Activations::Spatial(module.pools[*slot].forward(t))
                }
                (Step::Dropout { slot }, Activations::Spatial(t)) => {
                    Activations::Spatial(module.dropouts[*slot].forward(t))
                }
                (Step::Dropout { slot }, Activations::Flat(t)) => {
                    Activations::Flat(module.dropouts[*slot].forward(t))
                }
                (Step::Flatten, Activations::Spatial(t)) => Activations::Flat(t.flatten(1, 3)),
                (Step::Rescaling { scale, offset }, Activations::Spatial(t)) => {
                    Activations::Spatial(t.mul_scalar(*scale).add_scalar(*offset))
                }
                (Step::Rescaling { scale, offset }, Activations::Flat(t)) => {
                    Activations::Flat(t.mul_scalar(*scale).add_scalar(*offset))
                }
                (Step::RandomFlip { mode }, Activations::Spatial(t)) => {
                    Activations::Spatial(random_flip(t, *mode))
                }
                (Step::Resizing { height, width }, Activations::Spatial(t)) => Activations::Spatial(
                    interpolate(
                        t,
                        [*height, *width],
                        InterpolateOptions::new(InterpolateMode::Bilinear),
                    ),
                ),
                // Shape inference rules out every other pairing.
                (_, x) => x,
            };
        }

        match x {
            Activations::Flat(t) => t,
            Activations::Spatial(t) => t.flatten(1, 3),
        }
    }
}

impl<B: Backend> Network<B> {
    /// Runs inference: `[batch, input_len]` in, `[batch, output_len]` out.
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layout.forward(&self.module, input)
    }

    /// Like `forward`, without the final softmax.
    pub fn forward_logits(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        self.layout.forward_logits(&self.module, input)
    }

    #[must_use]
    pub fn num_params(&self) -> usize {
        self.module.num_params()
    }
}

fn activate<B: Backend, const D: usize>(
    x: Tensor<B, D>,
    activation: Option<ActivationFunction>,
    skip_softmax: bool,
) -> Tensor<B, D> {
    match activation {
        Some(ActivationFunction::Relu) => relu(x),
        Some(ActivationFunction::Softmax) if !skip_softmax => softmax(x, 1),
        Some(ActivationFunction::Softmax) | None => x,
    }
}

/// Flips each image of the batch with probability one half, only while training.
fn random_flip<B: Backend>(input: Tensor<B, 4>, mode: RandomFlipMode) -> Tensor<B, 4> {
    if !B::ad_enabled() {
        return input;
    }

    let mut x = input;
    for (flip, axis) in [
        (mode.flips_horizontally(), 3),
        (mode.flips_vertically(), 2),
    ] {
        if !flip {
            continue;
        }
        let [batch, ..] = x.dims();
        let mask = Tensor::<B, 4>::random([batch, 1, 1, 1], Distribution::Bernoulli(0.5), &x.device());
        let keep = mask.clone().neg().add_scalar(1.0);
        x = x.clone().flip([axis]).mul(mask).add(x.mul(keep));
    }
    x
}

#[cfg(test)]
mod tests {
    use burn::backend::{Autodiff, NdArray};

    use super::*;

    type TestBackend = NdArray;

    fn cnn() -> Vec<LayerSpec> {
        vec![
            LayerSpec::new(LayerKind::Rescaling {
                scale: "1/255".into(),
                offset: 0.0,
            }),
            LayerSpec::new(LayerKind::Conv2d {
                filters: 4,
                kernel_size: 3,
            })
            .with_activation(ActivationFunction::Relu),
            LayerSpec::new(LayerKind::MaxPool2d { pool_size: None }),
            LayerSpec::new(LayerKind::Flatten),
            LayerSpec::new(LayerKind::Dropout { rate: 0.5 }),
            LayerSpec::new(LayerKind::Dense { nodes_count: 3 })
                .with_activation(ActivationFunction::Softmax),
        ]
    }

    fn image(channels: usize, height: usize, width: usize) -> TensorShape {
        TensorShape::Image {
            channels,
            height,
            width,
        }
    }

    #[test]
    fn test_build_cnn() {
        let device = Default::default();
        let network = build_network::<TestBackend>(&cnn(), image(1, 8, 8), &device).unwrap();

        assert_eq!(network.layout.output_shape(), TensorShape::Vector(3));
        let summaries = network.layout.summaries();
        assert_eq!(summaries.len(), 6);
        // 1 input channel, 4 filters, 3x3 kernel, plus biases.
        assert_eq!(summaries[1].params, 4 * 9 + 4);
        assert_eq!(summaries[2].output_shape, image(4, 3, 3));
        assert_eq!(summaries[5].params, 36 * 3 + 3);
        assert_eq!(
            network.num_params(),
            summaries.iter().map(|s| s.params).sum::<usize>()
        );
        assert_eq!(network.layout.logits_step, Some(5));
    }

    #[test]
    fn test_forward_produces_probabilities() {
        let device = Default::default();
        let network = build_network::<TestBackend>(&cnn(), image(1, 8, 8), &device).unwrap();

        let input = Tensor::<TestBackend, 2>::random([2, 64], Distribution::Uniform(0.0, 255.0), &device);
        let output = network.forward(input.clone());
        assert_eq!(output.dims(), [2, 3]);

        let sums: Vec<f32> = output.sum_dim(1).into_data().convert::<f32>().to_vec().unwrap();
        for sum in sums {
            assert!((sum - 1.0).abs() < 1e-4, "row sums to {sum}");
        }

        let logits = network.forward_logits(input);
        assert_eq!(logits.dims(), [2, 3]);
    }

    #[test]
    fn test_inference_ignores_dropout_and_flip() {
        let device = Default::default();
        let specs = vec![
            LayerSpec::new(LayerKind::RandomFlip {
                mode: RandomFlipMode::HorizontalAndVertical,
            }),
            LayerSpec::new(LayerKind::Flatten),
            LayerSpec::new(LayerKind::Dropout { rate: 0.9 }),
        ];
        let network = build_network::<TestBackend>(&specs, image(1, 2, 2), &device).unwrap();

        let input = Tensor::<TestBackend, 2>::from_floats([[1.0, 2.0, 3.0, 4.0]], &device);
        let output: Vec<f32> = network.forward(input).into_data().convert::<f32>().to_vec().unwrap();
        assert_eq!(output, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_resizing_changes_spatial_size() {
        let device = Default::default();
        let specs = vec![
            LayerSpec::new(LayerKind::Resizing {
                output_x: 6,
                output_y: 4,
            }),
            LayerSpec::new(LayerKind::Flatten),
        ];
        let network = build_network::<TestBackend>(&specs, image(3, 8, 8), &device).unwrap();
        let input = Tensor::<TestBackend, 2>::ones([1, 3 * 8 * 8], &device);
        assert_eq!(network.forward(input).dims(), [1, 3 * 4 * 6]);
    }

    #[test]
    fn test_training_backend_flips() {
        let device = Default::default();
        let specs = vec![
            LayerSpec::new(LayerKind::RandomFlip {
                mode: RandomFlipMode::Horizontal,
            }),
            LayerSpec::new(LayerKind::Flatten),
        ];
        let network = build_network::<Autodiff<TestBackend>>(&specs, image(1, 1, 2), &device).unwrap();

        let input = Tensor::<Autodiff<TestBackend>, 2>::from_floats([[1.0, 2.0]; 64], &device);
        let output: Vec<f32> = network.forward(input).into_data().convert::<f32>().to_vec().unwrap();

        // Every row is either kept or mirrored.
        for row in output.chunks(2) {
            assert!(row == [1.0, 2.0] || row == [2.0, 1.0], "unexpected row {row:?}");
        }
    }

    #[test]
    fn test_rejects_bad_sequences() {
        let device = Default::default();
        assert!(matches!(
            build_network::<TestBackend>(&[], image(1, 4, 4), &device),
            Err(NetworkError::Empty)
        ));

        let specs = vec![
            LayerSpec::new(LayerKind::Dense { nodes_count: 4 }),
            LayerSpec::new(LayerKind::Conv2d {
                filters: 1,
                kernel_size: 1,
            }),
        ];
        assert!(matches!(
            build_network::<TestBackend>(&specs, TensorShape::Vector(4), &device),
            Err(NetworkError::Sequence(_))
        ));
    }

    #[test]
    fn test_rejects_dropout_of_every_unit() {
        let specs = vec![
            LayerSpec::new(LayerKind::Dense { nodes_count: 4 })
                .with_activation(ActivationFunction::Relu),
            LayerSpec::new(LayerKind::Dropout { rate: 1.0 }),
            LayerSpec::new(LayerKind::Dense { nodes_count: 2 })
                .with_activation(ActivationFunction::Softmax),
        ];
        let device = Default::default();
        let result = build_network::<Autodiff<TestBackend>>(&specs, TensorShape::Vector(3), &device);
        assert!(matches!(
            result,
            Err(NetworkError::InvalidLayer {
                position: 1,
                source: LayerError::DropsEverything(_)
            })
        ));

        let mut specs = specs;
        specs[1] = LayerSpec::new(LayerKind::Dropout { rate: 0.99 });
        assert!(build_network::<Autodiff<TestBackend>>(&specs, TensorShape::Vector(3), &device).is_ok());
    }

    #[test]
    fn test_logits_step_only_for_trailing_softmax() {
        let relu_head = vec![
            LayerSpec::new(LayerKind::Dense { nodes_count: 2 })
                .with_activation(ActivationFunction::Softmax),
            LayerSpec::new(LayerKind::Dense { nodes_count: 2 })
                .with_activation(ActivationFunction::Relu),
        ];
        let device = Default::default();
        let network =
            build_network::<TestBackend>(&relu_head, TensorShape::Vector(3), &device).unwrap();
        assert_eq!(network.layout.logits_step, None);
    }
}
