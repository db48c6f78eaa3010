use axum::extract::{Multipart, Path, Query};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use database::model::ModelUpdate;
use labelnet_structs::{
    Layer, MODEL_NAME_MAX_LEN, Model, NewModel, SequenceWarning, check_name,
    validate_sequence,
};
use serde::Serialize;

use super::access::{owned_model, store_cover_image, visible_model};
use super::datasets::{IdBody, SearchQuery};
use super::forms::Form;
use super::{ApiError, AppState, CurrentUser, MaybeUser};

/// A model with its layers and the ordering problems among them.
#[derive(Debug, Serialize)]
pub struct ModelDetails {
    #[serde(flatten)]
    model: Model,
    ownername: String,
    layers: Vec<Layer>,
    warnings: Vec<SequenceWarning>,
}

#[tracing::instrument]
pub async fn list_public_models_handler(
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Model>>, ApiError> {
    Ok(Json(database::model::list_public_models(query.term()).await?))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn list_my_models_handler(
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<Model>>, ApiError> {
    Ok(Json(
        database::model::list_owned_models(user.0.id, query.term()).await?,
    ))
}

#[tracing::instrument(skip(user))]
pub async fn get_model_handler(
    user: MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<ModelDetails>, ApiError> {
    let model = visible_model(id, user.id()).await?;

    let (owner, layers) = tokio::try_join!(
        database::profile::find_profile(model.owner_id),
        database::layer::list_model_layers(model.id),
    )?;
    let layer_types: Vec<_> = layers.iter().map(|l| l.spec.layer_type()).collect();

    Ok(Json(ModelDetails {
        ownername: owner.map(|p| p.name).unwrap_or_default(),
        warnings: validate_sequence(&layer_types),
        model,
        layers,
    }))
}

#[tracing::instrument(skip_all, fields(user_id = user.0.id))]
pub async fn create_model_handler(
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Model>, ApiError> {
    let mut form = Form::read(multipart).await?;

    let new_model = NewModel {
        name: form.required("name")?.to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        visibility: form.parse("visibility")?.unwrap_or_default(),
        model_type: form.parse("model_type")?.unwrap_or_default(),
    };
    check_name("name", &new_model.name, MODEL_NAME_MAX_LEN)?;

    let model = database::model::insert_model(user.0.id, &new_model).await?;
    tracing::info!(model_id = model.id, "Model created");

    let Some(image) = form.take_file("image") else {
        return Ok(Json(model));
    };
    let (image, small) = store_cover_image(image).await?;
    database::model::set_model_images(model.id, &image, &small).await?;

    let model = database::model::find_model(model.id)
        .await?
        .ok_or_else(|| ApiError::not_found("model", model.id))?;
    Ok(Json(model))
}

/// Updates the fields present in the form and optionally replaces the cover image.
#[tracing::instrument(skip_all, fields(user_id = user.0.id))]
pub async fn edit_model_handler(
    user: CurrentUser,
    multipart: Multipart,
) -> Result<Json<Model>, ApiError> {
    let mut form = Form::read(multipart).await?;
    let id: i64 = form
        .parse("id")?
        .ok_or_else(|| ApiError::BadRequest("id is required".to_string()))?;
    let model = owned_model(id, &user.0).await?;

    let update = ModelUpdate {
        name: form.text("name").map(ToString::to_string),
        description: form.text("description").map(ToString::to_string),
        visibility: form.parse("visibility")?,
        model_type: form.parse("model_type")?,
    };
    if let Some(name) = &update.name {
        check_name("name", name, MODEL_NAME_MAX_LEN)?;
    }
    database::model::update_model(model.id, &update).await?;

    if let Some(image) = form.take_file("image") {
        let (image, small) = store_cover_image(image).await?;
        let previous = database::model::set_model_images(model.id, &image, &small).await?;
        database::delete_objects_logged(previous.iter().map(String::as_str)).await;
    }

    let model = database::model::find_model(model.id)
        .await?
        .ok_or_else(|| ApiError::not_found("model", model.id))?;
    Ok(Json(model))
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn delete_model_handler(
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    let model = owned_model(id, &user.0).await?;

    let mut files = database::model::delete_model(model.id).await?;
    if let Some(weights_path) = &model.model_file {
        files.push(database::model_manifest_path(weights_path));
    }
    database::delete_objects_logged(files.iter().map(String::as_str)).await;

    tracing::info!(model_id = model.id, "Model deleted");
    Ok(StatusCode::OK)
}

#[tracing::instrument(skip(user), fields(user_id = user.0.id))]
pub async fn download_model_handler(
    user: CurrentUser,
    Json(body): Json<IdBody>,
) -> Result<StatusCode, ApiError> {
    let model = visible_model(body.id, Some(user.0.id)).await?;
    database::model::record_model_download(model.id, user.0.id).await?;
    Ok(StatusCode::OK)
}

/// Serves the weights of a built model the caller may see.
#[tracing::instrument(skip(user))]
pub async fn model_file_handler(
    user: MaybeUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let model = visible_model(id, user.id()).await?;
    let Some(path) = &model.model_file else {
        return Err(ApiError::NotFound(format!("model {id} has not been built")));
    };

    let bytes = database::read_object(path).await?;
    let disposition = format!("attachment; filename=\"model-{id}.bin\"");
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/models/public/", get(list_public_models_handler))
        .route("/my-models/", get(list_my_models_handler))
        .route("/models/{id}", get(get_model_handler))
        .route("/models/{id}/file", get(model_file_handler))
        .route("/create-model/", post(create_model_handler))
        .route("/edit-model/", post(edit_model_handler))
        .route("/models/delete/{id}/", post(delete_model_handler))
        .route("/download-model/", post(download_model_handler))
}
