use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Visibility;

pub const MODEL_NAME_MAX_LEN: usize = 100;

/// Kind of input a model is meant for.
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
#[sqlx(type_name = "model_type", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum ModelType {
    #[default]
    Image,
    Text,
}

/// A user-authored network and the outcome of its last training run.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub owner_id: i64,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub image: Option<String>,
    pub image_small: Option<String>,
    pub verified: bool,
    pub model_type: ModelType,

    /// Dataset the model was last trained on
    pub trained_on: Option<i64>,
    pub trained_accuracy: Option<f64>,

    /// Dataset the model was last evaluated on
    pub evaluated_on: Option<i64>,
    pub evaluated_accuracy: Option<f64>,

    pub visibility: Visibility,

    /// Object path of the built weights, set once the model has been built
    pub model_file: Option<String>,
    pub optimizer: Option<String>,
    pub loss_function: Option<String>,

    pub download_count: i64,
}

impl Model {
    /// Whether `profile_id` may read this model.
    #[must_use]
    pub fn is_visible_to(&self, profile_id: Option<i64>) -> bool {
        self.visibility.is_public() || profile_id == Some(self.owner_id)
    }
}

/// Fields needed to create a model.
#[derive(Debug, Clone, Default)]
pub struct NewModel {
    pub name: String,
    pub description: String,
    pub visibility: Visibility,
    pub model_type: ModelType,
}
