use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use labelnet_structs::{ActivationFunction, Layer, LayerParams, LayerSpec, LayerType, RandomFlipMode};
use serde::Deserialize;

use super::access::{owned_layer, owned_model};
use super::elements::ReorderBody;
use super::forms::{lenient, parse_order};
use super::{ApiError, AppState, CurrentUser};

/// Layer fields as sent by the model editor. Empty strings count as absent.
#[derive(Debug, Default, Deserialize)]
pub struct LayerFields {
    #[serde(default, deserialize_with = "lenient")]
    activation_function: Option<ActivationFunction>,

    #[serde(default, deserialize_with = "lenient")]
    input_x: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    input_y: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    input_z: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    nodes_count: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    filters: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    kernel_size: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    pool_size: Option<u32>,

    #[serde(default, alias = "probability", deserialize_with = "lenient")]
    rate: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    scale: Option<String>,

    #[serde(default, deserialize_with = "lenient")]
    offset: Option<f64>,

    #[serde(default, deserialize_with = "lenient")]
    mode: Option<RandomFlipMode>,

    #[serde(default, deserialize_with = "lenient")]
    output_x: Option<u32>,

    #[serde(default, deserialize_with = "lenient")]
    output_y: Option<u32>,
}

impl LayerFields {
    fn params(self) -> LayerParams {
        LayerParams {
            activation_function: self.activation_function,
            input_x: self.input_x,
            input_y: self.input_y,
            input_z: self.input_z,
            nodes_count: self.nodes_count,
            filters: self.filters,
            kernel_size: self.kernel_size,
            pool_size: self.pool_size,
            rate: self.rate,
            scale: self.scale,
            offset: self.offset,
            mode: self.mode,
            output_x: self.output_x,
            output_y: self.output_y,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateLayerBody {
    model: i64,

    #[serde(default, deserialize_with = "lenient")]
    index: Option<i32>,

    #[serde(rename = "type")]
    layer_type: LayerType,

    #[serde(flatten)]
    fields: LayerFields,
}

#[derive(Debug, Deserialize)]
pub struct EditLayerBody {
    id: i64,

    #[serde(flatten)]
    fields: LayerFields,
}

#[derive(Debug, Deserialize)]
pub struct DeleteLayerBody {
    layer: i64,
}

/// Adds a layer to a model, at `index` or at the end.
#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn create_layer_handler(
    user: CurrentUser,
    Json(body): Json<CreateLayerBody>,
) -> Result<Json<Layer>, ApiError> {
    let model = owned_model(body.model, &user.0).await?;
    let spec = LayerSpec::from_params(body.layer_type, &body.fields.params())?;

    let layer = database::layer::insert_layer(model.id, body.index, &spec).await?;
    tracing::debug!(model_id = model.id, layer_id = layer.id, %spec, "Layer created");
    Ok(Json(layer))
}

/// Replaces every field of a layer. The layer type stays the same.
#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn edit_layer_handler(
    user: CurrentUser,
    Json(body): Json<EditLayerBody>,
) -> Result<Json<Layer>, ApiError> {
    let (layer, _) = owned_layer(body.id, &user.0).await?;
    let spec = LayerSpec::from_params(layer.spec.layer_type(), &body.fields.params())?;

    Ok(Json(database::layer::update_layer(layer.id, &spec).await?))
}

/// Deletes a layer and closes the gap in the indices of the rest.
#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn delete_layer_handler(
    user: CurrentUser,
    Json(body): Json<DeleteLayerBody>,
) -> Result<StatusCode, ApiError> {
    let (layer, _) = owned_layer(body.layer, &user.0).await?;
    database::layer::delete_layer(layer.id).await?;
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn reorder_layers_handler(
    user: CurrentUser,
    Json(body): Json<ReorderBody>,
) -> Result<StatusCode, ApiError> {
    let model = owned_model(body.id, &user.0).await?;
    database::layer::reorder_layers(model.id, &parse_order(&body.order)?).await?;
    Ok(StatusCode::OK)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create-layer/", post(create_layer_handler))
        .route("/edit-layer/", post(edit_layer_handler))
        .route("/delete-layer/", post(delete_layer_handler))
        .route("/reorder-model-layers/", post(reorder_layers_handler))
}

#[cfg(test)]
mod tests {
    use labelnet_structs::LayerKind;

    use super::*;

    #[test]
    fn test_create_body_from_editor_payload() {
        let body: CreateLayerBody = serde_json::from_str(
            r#"{
                "model": 3,
                "index": "",
                "type": "conv2d",
                "activation_function": "relu",
                "filters": "16",
                "kernel_size": 3,
                "input_x": 64,
                "input_y": 64,
                "input_z": 3,
                "nodes_count": "",
                "rate": ""
            }"#,
        )
        .unwrap();

        assert_eq!(body.model, 3);
        assert_eq!(body.index, None);
        let spec = LayerSpec::from_params(body.layer_type, &body.fields.params()).unwrap();
        assert_eq!(
            spec.kind,
            LayerKind::Conv2d {
                filters: 16,
                kernel_size: 3
            }
        );
        assert_eq!(spec.activation_function, Some(ActivationFunction::Relu));
        assert_eq!((spec.input_x, spec.input_y, spec.input_z), (Some(64), Some(64), Some(3)));
    }

    #[test]
    fn test_dropout_accepts_probability_alias() {
        let body: EditLayerBody = serde_json::from_str(r#"{"id": 1, "probability": "0.3"}"#).unwrap();
        let spec = LayerSpec::from_params(LayerType::Dropout, &body.fields.params()).unwrap();
        assert_eq!(spec.kind, LayerKind::Dropout { rate: 0.3 });
    }

    #[test]
    fn test_missing_required_field_is_rejected() {
        let body: CreateLayerBody =
            serde_json::from_str(r#"{"model": 1, "type": "resizing", "output_x": "32"}"#).unwrap();
        assert!(LayerSpec::from_params(body.layer_type, &body.fields.params()).is_err());
    }
}
