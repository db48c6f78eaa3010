//! Stored form of a built network: a JSON manifest plus binary weights.

use burn::module::Module;
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkBytesRecorder, Recorder};
use labelnet_structs::{LayerSpec, LossKind, OptimizerKind};
use serde::{Deserialize, Serialize};

use crate::{Network, NetworkError, TensorShape, build_network};

/// Everything needed to rebuild a network before its weights are loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub layers: Vec<LayerSpec>,
    pub input_shape: TensorShape,
    pub optimizer: OptimizerKind,
    pub loss: LossKind,
    pub learning_rate: f64,

    /// Label names in output order, set once the network has been trained
    #[serde(default)]
    pub class_names: Vec<String>,

    #[serde(default)]
    pub trained: bool,
}

/// A manifest together with the serialized weights of its network.
#[derive(Debug, Clone)]
pub struct ModelArtifact {
    pub manifest: ModelManifest,
    pub weights: Vec<u8>,
}

impl ModelArtifact {
    /// Captures the weights of `network`.
    ///
    /// # Errors
    ///
    /// Returns an error if the weights cannot be serialized.
    pub fn from_network<B: Backend>(
        manifest: ModelManifest,
        network: &Network<B>,
    ) -> Result<Self, NetworkError> {
        let weights = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .record(network.module.clone().into_record(), ())
            .map_err(|e| NetworkError::Record(e.to_string()))?;

        Ok(Self { manifest, weights })
    }

    /// Rebuilds the network described by the manifest and loads the weights into it.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest no longer builds or the weights do not
    /// match its architecture.
    pub fn load_network<B: Backend>(&self, device: &B::Device) -> Result<Network<B>, NetworkError> {
        let network =
            build_network::<B>(&self.manifest.layers, self.manifest.input_shape, device)?;

        let record = NamedMpkBytesRecorder::<FullPrecisionSettings>::default()
            .load(self.weights.clone(), device)
            .map_err(|e| NetworkError::Record(e.to_string()))?;

        Ok(Network {
            module: network.module.load_record(record),
            ..network
        })
    }

    /// # Errors
    ///
    /// Returns an error if the manifest cannot be serialized.
    pub fn manifest_json(&self) -> Result<Vec<u8>, NetworkError> {
        serde_json::to_vec_pretty(&self.manifest).map_err(|e| NetworkError::Record(e.to_string()))
    }

    /// Reassembles an artifact from its stored parts.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest is not valid JSON.
    pub fn from_parts(manifest_json: &[u8], weights: Vec<u8>) -> Result<Self, NetworkError> {
        let manifest =
            serde_json::from_slice(manifest_json).map_err(|e| NetworkError::Record(e.to_string()))?;
        Ok(Self { manifest, weights })
    }
}
