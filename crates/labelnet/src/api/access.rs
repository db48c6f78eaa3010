//! Lookups with visibility and ownership checks, shared by the handlers.

use bytes::Bytes;
use labelnet_structs::{Dataset, Element, Label, Layer, Model, Profile, file_extension};

use super::ApiError;
use super::forms::UploadedFile;

pub async fn visible_dataset(id: i64, viewer: Option<i64>) -> Result<Dataset, ApiError> {
    database::dataset::find_dataset(id)
        .await?
        .filter(|d| d.is_visible_to(viewer))
        .ok_or_else(|| ApiError::not_found("dataset", id))
}

pub async fn owned_dataset(id: i64, user: &Profile) -> Result<Dataset, ApiError> {
    let dataset = database::dataset::find_dataset(id)
        .await?
        .ok_or_else(|| ApiError::not_found("dataset", id))?;

    if dataset.owner_id == user.id {
        Ok(dataset)
    } else {
        Err(ApiError::NotOwner("you can only change your own datasets"))
    }
}

pub async fn owned_element(id: i64, user: &Profile) -> Result<Element, ApiError> {
    let element = database::element::find_element(id)
        .await?
        .ok_or_else(|| ApiError::not_found("element", id))?;

    if element.owner_id == user.id {
        Ok(element)
    } else {
        Err(ApiError::NotOwner("you can only change your own elements"))
    }
}

pub async fn owned_label(id: i64, user: &Profile) -> Result<Label, ApiError> {
    let label = database::label::find_label(id)
        .await?
        .ok_or_else(|| ApiError::not_found("label", id))?;

    if label.owner_id == user.id {
        Ok(label)
    } else {
        Err(ApiError::NotOwner("you can only change your own labels"))
    }
}

pub async fn visible_model(id: i64, viewer: Option<i64>) -> Result<Model, ApiError> {
    database::model::find_model(id)
        .await?
        .filter(|m| m.is_visible_to(viewer))
        .ok_or_else(|| ApiError::not_found("model", id))
}

pub async fn owned_model(id: i64, user: &Profile) -> Result<Model, ApiError> {
    let model = database::model::find_model(id)
        .await?
        .ok_or_else(|| ApiError::not_found("model", id))?;

    if model.owner_id == user.id {
        Ok(model)
    } else {
        Err(ApiError::NotOwner("you can only change your own models"))
    }
}

/// Finds a layer whose model `user` owns.
pub async fn owned_layer(id: i64, user: &Profile) -> Result<(Layer, Model), ApiError> {
    let layer = database::layer::find_layer(id)
        .await?
        .ok_or_else(|| ApiError::not_found("layer", id))?;
    let model = owned_model(layer.model_id, user).await?;
    Ok((layer, model))
}

/// Stores a cover image and its thumbnail, returning both paths.
pub async fn store_cover_image(file: UploadedFile) -> Result<(String, String), ApiError> {
    let extension = file_extension(&file.file_name)
        .filter(|e| labelnet_structs::ALLOWED_IMAGE_FILE_EXTENSIONS.contains(&e.as_str()))
        .ok_or_else(|| ApiError::BadRequest(format!("{:?} is not an image", file.file_name)))?;

    let bytes = Bytes::from(file.bytes);
    let thumbnail = {
        let bytes = bytes.clone();
        tokio::task::spawn_blocking(move || image_pipeline::make_thumbnail(&bytes))
            .await
            .map_err(anyhow::Error::from)??
    };

    let image_path = database::image_path(&extension);
    let small_path = database::image_path("png");
    database::put_object(&image_path, bytes).await?;
    database::put_object(&small_path, Bytes::from(thumbnail)).await?;

    Ok((image_path, small_path))
}
