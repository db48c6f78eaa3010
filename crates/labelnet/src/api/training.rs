use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use labelnet_structs::{LossKind, OptimizerKind};
use ml_model::{Evaluation, History, LayerSummary};
use serde::Deserialize;

use super::access::{owned_model, visible_dataset};
use super::forms::lenient;
use super::{ApiError, AppState, CurrentUser};
use crate::workflow::{self, BuildOptions, TrainOptions};

#[derive(Debug, Deserialize)]
pub struct BuildModelBody {
    id: i64,

    #[serde(default, deserialize_with = "lenient")]
    optimizer: Option<OptimizerKind>,

    #[serde(default, deserialize_with = "lenient")]
    loss: Option<LossKind>,

    #[serde(default, deserialize_with = "lenient")]
    learning_rate: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    dataset: Option<i64>,
}

impl BuildModelBody {
    fn options(&self) -> Result<BuildOptions, ApiError> {
        let required = |field: &str| ApiError::BadRequest(format!("{field} is required"));
        Ok(BuildOptions {
            optimizer: self.optimizer.ok_or_else(|| required("optimizer"))?,
            loss: self.loss.ok_or_else(|| required("loss"))?,
            learning_rate: self.learning_rate,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct TrainModelBody {
    model: i64,
    dataset: i64,

    #[serde(default, deserialize_with = "lenient")]
    epochs: Option<usize>,

    #[serde(default, deserialize_with = "lenient")]
    validation_split: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    batch_size: Option<usize>,

    #[serde(default, deserialize_with = "lenient")]
    learning_rate: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    seed: Option<u64>,
}

impl TrainModelBody {
    fn options(&self) -> TrainOptions {
        let defaults = TrainOptions::default();
        TrainOptions {
            epochs: self.epochs.unwrap_or(defaults.epochs),
            batch_size: self.batch_size.unwrap_or(defaults.batch_size),
            validation_split: self.validation_split.unwrap_or(defaults.validation_split),
            learning_rate: self.learning_rate,
            seed: self.seed.unwrap_or(defaults.seed),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EvaluateModelBody {
    model: i64,
    dataset: i64,
}

/// Builds a model with fresh weights and returns the shape of every layer.
#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn build_model_handler(
    user: CurrentUser,
    Json(body): Json<BuildModelBody>,
) -> Result<Json<Vec<LayerSummary>>, ApiError> {
    let options = body.options()?;
    let model = owned_model(body.id, &user.0).await?;
    let dataset = match body.dataset {
        Some(id) => Some(visible_dataset(id, Some(user.0.id)).await?),
        None => None,
    };

    let summaries = workflow::build_model(&model, dataset.as_ref(), &options).await?;
    Ok(Json(summaries))
}

/// Trains a built model on an own or public dataset and returns the per-epoch history.
#[tracing::instrument(skip(user, state), fields(user_id = user.0.id))]
pub async fn train_model_handler(
    State(state): State<AppState>,
    user: CurrentUser,
    Json(body): Json<TrainModelBody>,
) -> Result<Json<History>, ApiError> {
    let options = body.options();
    options.validate(state.max_training_epochs)?;

    let model = owned_model(body.model, &user.0).await?;
    let dataset = visible_dataset(body.dataset, Some(user.0.id)).await?;

    let history = workflow::train_model(&model, &dataset, &options).await?;
    Ok(Json(history))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn evaluate_model_handler(
    user: CurrentUser,
    Json(body): Json<EvaluateModelBody>,
) -> Result<Json<Evaluation>, ApiError> {
    let model = owned_model(body.model, &user.0).await?;
    let dataset = visible_dataset(body.dataset, Some(user.0.id)).await?;

    Ok(Json(workflow::evaluate_model(&model, &dataset).await?))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/build-model/", post(build_model_handler))
        .route("/train-model/", post(train_model_handler))
        .route("/evaluate-model/", post(evaluate_model_handler))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_body_parses_form_strings() {
        let body: BuildModelBody = serde_json::from_str(
            r#"{"id": 4, "optimizer": "Adam", "loss": "sparse_categorical_crossentropy", "dataset": ""}"#,
        )
        .unwrap();

        let options = body.options().unwrap();
        assert_eq!(options.optimizer, OptimizerKind::Adam);
        assert_eq!(options.loss, LossKind::SparseCategoricalCrossentropy);
        assert_eq!(options.learning_rate, None);
        assert_eq!(body.dataset, None);
    }

    #[test]
    fn test_build_body_requires_optimizer() {
        let body: BuildModelBody = serde_json::from_str(r#"{"id": 4, "loss": "mse"}"#).unwrap();
        assert!(matches!(body.options(), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn test_train_body_fills_defaults() {
        let body: TrainModelBody =
            serde_json::from_str(r#"{"model": 1, "dataset": 2, "epochs": "5", "validation_split": ""}"#)
                .unwrap();

        let options = body.options();
        assert_eq!(options.epochs, 5);
        assert_eq!(options.batch_size, 32);
        assert!((options.validation_split - TrainOptions::DEFAULT_VALIDATION_SPLIT).abs() < f64::EPSILON);
        assert!(options.validate(100).is_ok());
        assert!(options.validate(4).is_err());
    }
}
